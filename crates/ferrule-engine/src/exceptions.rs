//! Exceptions raised by native code
//!
//! Native code cannot unwind into the host. Instead it records a pending
//! exception (a class name and a message) and returns normally; the bridge
//! checks for a pending exception after each native call and turns it into
//! [`BridgeError::Native`].

use crate::defaults::FALLBACK_EXCEPTION;
use ferrule_sdk::{BridgeError, BridgeResult};
use once_cell::sync::Lazy;
use rustc_hash::FxHashSet;
use std::cell::RefCell;

/// Host exception classes every embedding understands
static BUILTIN_EXCEPTIONS: Lazy<FxHashSet<&'static str>> = Lazy::new(|| {
    [
        "ArithmeticError",
        "AssertionError",
        "AttributeError",
        "Exception",
        "IndexError",
        "KeyError",
        "LookupError",
        "MemoryError",
        "NotImplementedError",
        "OSError",
        "OverflowError",
        "RuntimeError",
        "TypeError",
        "ValueError",
        "ZeroDivisionError",
    ]
    .into_iter()
    .collect()
});

#[derive(Debug, Clone, Default)]
struct Pending {
    name: Option<String>,
    message: Option<String>,
}

/// Registered exception names plus the pending-exception slot
#[derive(Default)]
pub struct ExceptionRegistry {
    registered: RefCell<FxHashSet<String>>,
    pending: RefCell<Pending>,
}

impl ExceptionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `name` surface under its own name instead of the fallback
    pub fn register_exception(&self, name: impl Into<String>) {
        self.registered.borrow_mut().insert(name.into());
    }

    /// Record a pending exception; a later call replaces an earlier one
    pub fn set_pending(&self, name: Option<&str>, message: Option<&str>) {
        *self.pending.borrow_mut() = Pending {
            name: name.map(str::to_string),
            message: message.map(str::to_string),
        };
    }

    /// Is an exception waiting to be raised?
    pub fn has_pending(&self) -> bool {
        self.pending.borrow().name.is_some()
    }

    /// Raise the pending exception, if any, and clear the slot
    ///
    /// A name without a message is dropped with a warning.
    pub fn check(&self) -> BridgeResult<()> {
        let pending = std::mem::take(&mut *self.pending.borrow_mut());
        let Some(name) = pending.name else {
            return Ok(());
        };
        let Some(message) = pending.message else {
            tracing::warn!(exception = %name, "exception name is set, but exception string is unset");
            return Ok(());
        };
        Err(BridgeError::Native {
            kind: self.resolve_kind(&name),
            message,
        })
    }

    fn resolve_kind(&self, name: &str) -> String {
        if self.registered.borrow().contains(name) || BUILTIN_EXCEPTIONS.contains(name) {
            name.to_string()
        } else {
            FALLBACK_EXCEPTION.to_string()
        }
    }
}
