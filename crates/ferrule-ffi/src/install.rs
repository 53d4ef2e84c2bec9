//! Per-thread installation of the active bridge
//!
//! Generated glue has no way to carry a `&mut Bridge` through native
//! frames, so each thread has at most one installed bridge that the C entry
//! points reach through [`with_bridge`].
//!
//! While the bridge runs a native method it is mutably borrowed. If that
//! native code calls back into the bridge (a virtual call on another
//! object, say), the callback must reuse the borrow instead of taking a
//! second one: [`lend`] publishes the borrowed bridge for the duration of
//! the native call.

use ferrule_engine::{Bridge, DestroyNotifier, ExceptionRegistry, SharedRefcounts};
use ferrule_sdk::{BridgeError, BridgeResult};
use std::cell::{Cell, RefCell};
use std::ptr;
use std::rc::Rc;

struct Installed {
    bridge: Rc<RefCell<Bridge>>,
    notifier: DestroyNotifier,
    handles: SharedRefcounts,
    exceptions: Rc<ExceptionRegistry>,
}

thread_local! {
    static INSTALLED: RefCell<Option<Installed>> = const { RefCell::new(None) };
    static LENT: Cell<*mut Bridge> = const { Cell::new(ptr::null_mut()) };
}

/// Install `bridge` as this thread's bridge
///
/// Fails with `BridgeBusy` if one is installed already.
pub fn install(bridge: Bridge) -> BridgeResult<()> {
    INSTALLED.with(|slot| {
        let mut slot = slot.borrow_mut();
        if slot.is_some() {
            return Err(BridgeError::BridgeBusy);
        }
        *slot = Some(Installed {
            notifier: bridge.notifier(),
            handles: bridge.handles(),
            exceptions: bridge.exceptions(),
            bridge: Rc::new(RefCell::new(bridge)),
        });
        tracing::debug!("bridge installed");
        Ok(())
    })
}

/// Remove this thread's bridge and dispose of it
///
/// Returns false if no bridge was installed.
pub fn uninstall() -> bool {
    let Some(installed) = INSTALLED.with(|slot| slot.borrow_mut().take()) else {
        return false;
    };
    match Rc::try_unwrap(installed.bridge) {
        Ok(cell) => cell.into_inner().dispose(),
        Err(_) => tracing::warn!("bridge still borrowed at uninstall, disposal deferred"),
    }
    tracing::debug!("bridge uninstalled");
    true
}

/// Is a bridge installed on this thread?
pub fn is_installed() -> bool {
    INSTALLED.with(|slot| slot.borrow().is_some())
}

/// Run `f` on this thread's bridge
///
/// Inside a native call made by the bridge, `f` gets the lent bridge.
pub fn with_bridge<R>(f: impl FnOnce(&mut Bridge) -> BridgeResult<R>) -> BridgeResult<R> {
    let lent = LENT.with(|l| l.get());
    if !lent.is_null() {
        // SAFETY: `lend` only publishes the pointer while the `&mut Bridge`
        // it came from is parked in a native call on this thread, and
        // restores the previous value before that borrow is used again.
        return f(unsafe { &mut *lent });
    }
    let bridge = INSTALLED
        .with(|slot| slot.borrow().as_ref().map(|i| Rc::clone(&i.bridge)))
        .ok_or(BridgeError::NotInstalled)?;
    let mut guard = bridge.try_borrow_mut().map_err(|_| BridgeError::BridgeBusy)?;
    f(&mut guard)
}

/// Publish `bridge` to re-entrant C calls while `f` runs
pub fn lend<R>(bridge: &mut Bridge, f: impl FnOnce() -> R) -> R {
    struct Restore(*mut Bridge);

    impl Drop for Restore {
        fn drop(&mut self) {
            LENT.with(|l| l.set(self.0));
        }
    }

    let previous = LENT.with(|l| l.replace(bridge as *mut Bridge));
    let _restore = Restore(previous);
    f()
}

/// Destruction notices go straight to the queue, so native destructors can
/// report while the bridge is busy finalizing
pub(crate) fn notifier() -> Option<DestroyNotifier> {
    INSTALLED.with(|slot| slot.borrow().as_ref().map(|i| i.notifier.clone()))
}

pub(crate) fn handles() -> Option<SharedRefcounts> {
    INSTALLED.with(|slot| slot.borrow().as_ref().map(|i| Rc::clone(&i.handles)))
}

pub(crate) fn exceptions() -> Option<Rc<ExceptionRegistry>> {
    INSTALLED.with(|slot| slot.borrow().as_ref().map(|i| Rc::clone(&i.exceptions)))
}

/// Drain queued destruction notices if the bridge is idle
pub(crate) fn drain_if_idle() {
    if !LENT.with(|l| l.get()).is_null() {
        return;
    }
    let Some(bridge) = INSTALLED.with(|slot| slot.borrow().as_ref().map(|i| Rc::clone(&i.bridge))) else {
        return;
    };
    if let Ok(mut bridge) = bridge.try_borrow_mut() {
        bridge.drain_notifications();
    };
}
