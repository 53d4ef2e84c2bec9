//! C entry points for ferrule glue code
//!
//! Generated glue calls these from native code:
//! - lifetime: `ferrule_notify_destroyed` from every wrapped destructor
//! - handles: `ferrule_adjust_refcount` when native code keeps or drops a
//!   host object handle
//! - dispatch: `ferrule_fill_vtable` at load time, then `ferrule_dispatch`
//!   from every overridable slot (after `ferrule_override_active` says the
//!   host wants the call)
//! - errors: `ferrule_set_exception` to report a C++ exception,
//!   `ferrule_last_error` to read why a call returned non-zero
//!
//! The API follows these principles:
//! - ABI-stable (uses only C-compatible types)
//! - One bridge per thread, installed with `ferrule_bridge_install`
//! - Status codes (0 / -1) plus a thread-local last-error message
//! - Values cross as NaN-boxed `u64` words (see `ferrule_sdk::NativeValue`)

#![warn(missing_docs)]

mod install;
mod native;

pub use install::{install, is_installed, lend, uninstall, with_bridge};
pub use native::{
    c_native_method, c_native_ops, FerruleDestroyFn, FerruleNativeFn, FerruleSyncFlagsFn,
    FerruleTypeNameFn,
};

use ferrule_engine::Bridge;
use ferrule_sdk::{panic_message, BridgeError, BridgeResult, ClassId, NativePtr, NativeValue};
use libc::{c_char, c_int, c_long, c_void, size_t};
use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;

/// Signature of `ferrule_dispatch`, as stored by `ferrule_fill_vtable`
pub type FerruleDispatchFn = unsafe extern "C" fn(
    class: c_long,
    this: *mut c_void,
    slot: size_t,
    args: *const u64,
    nargs: size_t,
    out: *mut u64,
) -> c_int;

// ============================================================================
// Helper Functions
// ============================================================================

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(error: &BridgeError) {
    let message = format!("{}: {}", error.host_kind(), error);
    // Interior NULs cannot cross; keep what precedes the first one
    let message = match CString::new(message) {
        Ok(m) => m,
        Err(e) => {
            let end = e.nul_position();
            let mut bytes = e.into_vec();
            bytes.truncate(end);
            CString::new(bytes).unwrap_or_default()
        }
    };
    LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(message));
}

fn status<T>(result: BridgeResult<T>) -> c_int {
    match result {
        Ok(_) => 0,
        Err(e) => {
            tracing::debug!(error = %e, "C entry point failed");
            set_last_error(&e);
            -1
        }
    }
}

/// Borrow a C string; null and invalid UTF-8 read as `None`
unsafe fn opt_str<'a>(s: *const c_char) -> Option<&'a str> {
    if s.is_null() {
        None
    } else {
        CStr::from_ptr(s).to_str().ok()
    }
}

fn class_token(bridge: &Bridge, token: c_long) -> BridgeResult<ClassId> {
    let id = usize::try_from(token).map_err(|_| BridgeError::UnknownClass(token.to_string()))?;
    let class = ClassId(id);
    bridge.class(class)?;
    Ok(class)
}

// ============================================================================
// Installation
// ============================================================================

/// Install a bridge with default options on the calling thread
///
/// # Returns
/// * 0 on success
/// * -1 if a bridge is already installed (see `ferrule_last_error`)
///
/// # Safety
/// Always safe to call; `unsafe` only for ABI uniformity.
#[no_mangle]
pub unsafe extern "C" fn ferrule_bridge_install() -> c_int {
    status(install(Bridge::new()))
}

/// Dispose of the calling thread's bridge
///
/// Host-owned native objects still alive are destroyed. Idempotent.
///
/// # Safety
/// Must not be called from inside a native method the bridge is running.
#[no_mangle]
pub unsafe extern "C" fn ferrule_bridge_uninstall() {
    uninstall();
}

/// Collect unreachable proxies
///
/// # Returns
/// * Number of proxies freed, or -1 on failure
///
/// # Safety
/// Must not be called from inside a native destructor.
#[no_mangle]
pub unsafe extern "C" fn ferrule_collect() -> c_long {
    match with_bridge(|b| Ok(b.collect().last_freed_count)) {
        Ok(freed) => c_long::try_from(freed).unwrap_or(c_long::MAX),
        Err(e) => {
            set_last_error(&e);
            -1
        }
    }
}

// ============================================================================
// Lifetime
// ============================================================================

/// Report that the native object at `this` is being destroyed
///
/// Safe to call from destructors the bridge itself triggered; the notice
/// is queued and processed as soon as the bridge is idle.
///
/// # Safety
/// `this` is only used as an address and never dereferenced.
#[no_mangle]
pub unsafe extern "C" fn ferrule_notify_destroyed(this: *mut c_void) {
    let Some(ptr) = NativePtr::from_raw(this) else {
        return;
    };
    let Some(notifier) = install::notifier() else {
        return;
    };
    notifier.notify(ptr);
    install::drain_if_idle();
}

/// Adjust the count of a refcounted handle
///
/// # Arguments
/// * `handle` - Handle token received from the bridge
/// * `delta` - Amount to add (negative to release)
/// * `remaining` - Optional out-parameter for the new count
///
/// # Returns
/// * 0 on success; the handle is invalid once the count reaches zero
/// * -1 for an unknown handle (see `ferrule_last_error`)
///
/// # Safety
/// `remaining` must be null or valid for a write.
#[no_mangle]
pub unsafe extern "C" fn ferrule_adjust_refcount(handle: size_t, delta: i64, remaining: *mut i64) -> c_int {
    let result = install::handles()
        .ok_or(BridgeError::NotInstalled)
        .and_then(|table| {
            let mut table = table.try_borrow_mut().map_err(|_| BridgeError::BridgeBusy)?;
            table.adjust_refcount(handle, delta)
        });
    match result {
        Ok(count) => {
            if !remaining.is_null() {
                *remaining = count;
            }
            0
        }
        Err(e) => status::<()>(Err(e)),
    }
}

// ============================================================================
// Virtual Dispatch
// ============================================================================

/// Prepare the dispatch table of a native class
///
/// Writes `ferrule_dispatch` into the first `len` entries of `table`
/// (at most one per virtual slot of the class).
///
/// # Returns
/// * The class token to pass to `ferrule_dispatch`
/// * -1 if no wrapper class is bound to `cpp_name`
///
/// # Safety
/// - `cpp_name` must be a valid null-terminated string
/// - `table` must be null or valid for `len` writes
#[no_mangle]
pub unsafe extern "C" fn ferrule_fill_vtable(
    cpp_name: *const c_char,
    table: *mut Option<FerruleDispatchFn>,
    len: size_t,
) -> c_long {
    let name = opt_str(cpp_name);
    let found = with_bridge(|b| {
        let name = name.ok_or(BridgeError::NullPointer)?;
        let class = b
            .classes()
            .class_from_cpp_name(name)
            .ok_or_else(|| BridgeError::UnknownClass(name.to_string()))?;
        Ok((class, b.class(class)?.vtable().len()))
    });
    let (class, slots) = match found {
        Ok(found) => found,
        Err(e) => {
            set_last_error(&e);
            return -1;
        }
    };
    if !table.is_null() {
        for i in 0..len.min(slots) {
            *table.add(i) = Some(ferrule_dispatch as FerruleDispatchFn);
        }
    }
    class.0 as c_long
}

/// Should the slot be routed to the host for `this`?
///
/// # Returns
/// * 1 if a host override is active, 0 otherwise (including errors)
///
/// # Safety
/// `this` is only used as an address and never dereferenced.
#[no_mangle]
pub unsafe extern "C" fn ferrule_override_active(this: *mut c_void, slot: size_t) -> c_int {
    let Some(ptr) = NativePtr::from_raw(this) else {
        return 0;
    };
    with_bridge(|b| Ok(b.override_active(ptr, slot))).unwrap_or(false) as c_int
}

/// The generic virtual-dispatch trampoline
///
/// # Arguments
/// * `class` - Token from `ferrule_fill_vtable` for the glue's class
/// * `this` - The receiving native object
/// * `slot` - Virtual slot index
/// * `args`, `nargs` - NaN-boxed arguments
/// * `out` - Out-parameter for the NaN-boxed result
///
/// # Returns
/// * 0 on success
/// * -1 on failure (see `ferrule_last_error`); `out` is left untouched
///
/// # Safety
/// - `args` must be valid for `nargs` reads (or null with `nargs == 0`)
/// - `out` must be null or valid for a write
#[no_mangle]
pub unsafe extern "C" fn ferrule_dispatch(
    class: c_long,
    this: *mut c_void,
    slot: size_t,
    args: *const u64,
    nargs: size_t,
    out: *mut u64,
) -> c_int {
    let words: Vec<NativeValue> = if nargs == 0 || args.is_null() {
        Vec::new()
    } else {
        std::slice::from_raw_parts(args, nargs)
            .iter()
            .map(|&bits| NativeValue::from_bits(bits))
            .collect()
    };
    // Nothing may unwind into the caller's frames
    let result = catch_unwind(AssertUnwindSafe(|| {
        with_bridge(|b| {
            let class = class_token(b, class)?;
            let ptr = NativePtr::from_raw(this).ok_or(BridgeError::NullPointer)?;
            b.dispatch_virtual(class, ptr, slot, &words)
        })
    }))
    .unwrap_or_else(|payload| Err(BridgeError::Panic(panic_message(&*payload))));
    match result {
        Ok(word) => {
            if !out.is_null() {
                *out = word.to_bits();
            }
            0
        }
        Err(e) => status::<()>(Err(e)),
    }
}

// ============================================================================
// Error Handling Functions
// ============================================================================

/// Report a C++ exception caught by glue code
///
/// The bridge raises it when the current native call returns. A name
/// without a message is discarded with a warning.
///
/// # Safety
/// `name` and `message` must each be null or a valid null-terminated
/// string.
#[no_mangle]
pub unsafe extern "C" fn ferrule_set_exception(name: *const c_char, message: *const c_char) {
    match install::exceptions() {
        Some(exceptions) => exceptions.set_pending(opt_str(name), opt_str(message)),
        None => tracing::warn!("exception reported with no bridge installed"),
    }
}

/// Message of the last failed call on this thread
///
/// # Returns
/// * Null-terminated message, or NULL if nothing failed
///
/// # Safety
/// The string is valid until the next failing call or
/// `ferrule_clear_error` on this thread. Do not free it.
#[no_mangle]
pub unsafe extern "C" fn ferrule_last_error() -> *const c_char {
    LAST_ERROR.with(|slot| slot.borrow().as_ref().map_or(ptr::null(), |m| m.as_ptr()))
}

/// Forget the last error message
///
/// # Safety
/// Invalidates the pointer returned by `ferrule_last_error`.
#[no_mangle]
pub unsafe extern "C" fn ferrule_clear_error() {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = None);
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the ferrule version string
///
/// # Safety
/// The returned string is static and must not be freed.
#[no_mangle]
pub unsafe extern "C" fn ferrule_version() -> *const c_char {
    static VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "\0");
    VERSION.as_ptr() as *const c_char
}

// ============================================================================
// Tests
// ============================================================================
