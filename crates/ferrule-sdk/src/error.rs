//! Error types for the bridge

use crate::ids::ProxyId;

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Bridge error types
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BridgeError {
    /// No overload accepted the arguments; one reason per candidate
    #[error("arguments did not match any overloaded call: {}", format_reasons(.reasons))]
    NoMatchingOverload {
        /// Rejection reason of each overload, in declaration order
        reasons: Vec<String>,
    },

    /// An overload signature is malformed
    #[error("invalid overload signature: {0}")]
    InvalidSignature(String),

    /// A native class name was registered twice
    #[error("class {existing} is already registered to '{name}' (attempted to register {new})")]
    ClassNameCollision {
        /// Native class name
        name: String,
        /// Class already holding the name
        existing: String,
        /// Class that tried to take it
        new: String,
    },

    /// A wrapper class name was registered twice
    #[error("wrapper class '{0}' is already defined")]
    DuplicateClass(String),

    /// Lookup of a class by name failed
    #[error("unknown class '{0}'")]
    UnknownClass(String),

    /// Instantiation refused (abstract class, missing pure-virtual override)
    #[error("{class} {reason}")]
    Construction {
        /// Class being instantiated
        class: String,
        /// Why it cannot be instantiated
        reason: String,
    },

    /// A pure virtual method was called without an override
    #[error("{class}.{method}() is an unimplemented abstract method")]
    NotImplemented {
        /// Class declaring the slot
        class: String,
        /// Method name
        method: String,
    },

    /// The class has no virtual method with this name or index
    #[error("{class} has no virtual method '{method}'")]
    NoSuchVirtual {
        /// Class searched
        class: String,
        /// Requested name or slot index
        method: String,
    },

    /// The proxy handle no longer refers to a live proxy
    #[error("{0} has been collected")]
    StaleProxy(ProxyId),

    /// The native object behind a proxy has been destroyed
    #[error("the native object wrapped by {0} has been destroyed")]
    DeadObject(ProxyId),

    /// A null native pointer where an object was required
    #[error("null native pointer")]
    NullPointer,

    /// Giving a proxy to this parent would put it inside its own subtree
    #[error("cannot give {child} to {parent}: it would become its own ancestor")]
    OwnershipCycle {
        /// Proxy being transferred
        child: ProxyId,
        /// Requested parent
        parent: ProxyId,
    },

    /// A class description could not be parsed or applied
    #[error("invalid class description: {0}")]
    InvalidDescription(String),

    /// Handle token is not (or no longer) in the refcount table
    #[error("invalid refcounted handle {0:#x}")]
    InvalidHandle(usize),

    /// The value has no identity and cannot be handed to native code by handle
    #[error("a {0} value has no identity and cannot be referenced by handle")]
    NoIdentity(String),

    /// Type mismatch during marshalling
    #[error("type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        /// Expected type name
        expected: String,
        /// Actual type name
        got: String,
    },

    /// Exception raised by native code and surfaced to the host
    #[error("{kind}: {message}")]
    Native {
        /// Exception class name
        kind: String,
        /// Exception message
        message: String,
    },

    /// No bridge is installed on the calling thread
    #[error("no bridge is installed on this thread")]
    NotInstalled,

    /// The thread's bridge is borrowed by a call that did not lend it
    #[error("the bridge is already in use on this thread")]
    BridgeBusy,

    /// Native code panicked under a bridge call
    #[error("native call panicked: {0}")]
    Panic(String),
}

fn format_reasons(reasons: &[String]) -> String {
    reasons
        .iter()
        .enumerate()
        .map(|(i, r)| format!("overload {}: {}", i + 1, r))
        .collect::<Vec<_>>()
        .join("; ")
}

impl BridgeError {
    /// Construction error helper
    pub fn construction(class: impl Into<String>, reason: impl Into<String>) -> Self {
        BridgeError::Construction {
            class: class.into(),
            reason: reason.into(),
        }
    }

    /// Type mismatch helper
    pub fn type_mismatch(expected: impl Into<String>, got: impl Into<String>) -> Self {
        BridgeError::TypeMismatch {
            expected: expected.into(),
            got: got.into(),
        }
    }

    /// Host exception class name this error surfaces as
    pub fn host_kind(&self) -> &str {
        match self {
            BridgeError::NoMatchingOverload { .. }
            | BridgeError::InvalidSignature(_)
            | BridgeError::Construction { .. }
            | BridgeError::TypeMismatch { .. }
            | BridgeError::NoIdentity(_) => "TypeError",
            BridgeError::ClassNameCollision { .. } | BridgeError::UnknownClass(_) => "KeyError",
            BridgeError::NotImplemented { .. } => "NotImplementedError",
            BridgeError::NoSuchVirtual { .. } => "AttributeError",
            BridgeError::Native { kind, .. } => kind,
            _ => "RuntimeError",
        }
    }
}

/// Render a panic payload as text
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}
