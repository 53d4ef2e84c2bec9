//! Ferrule Bridge Engine
//!
//! Runtime support that lets a garbage-collected host hold proxies for
//! native objects:
//! - **Identity**: one proxy per native address, base sub-object aliases,
//!   RTTI-driven class resolution (`bridge`, `identity` modules)
//! - **Ownership**: host-owned versus native-owned objects, parent/child
//!   trees, keep-alive references, destruction notices (`bridge`, `gc`)
//! - **Dispatch**: vtable slots, override flags and the trampoline that
//!   routes native virtual calls to host overrides (`dispatch`, `class`)
//! - **Overloads**: first-match multimethod resolution (`multimethod`)
//! - **Handles**: refcounted handles for host objects held by native code
//!   (`refcount`)
//!
//! # Example
//!
//! ```rust,ignore
//! use ferrule_engine::{Bridge, ClassBuilder, SlotSignature, ArgKind, native_method};
//!
//! let mut bridge = Bridge::new();
//! let base = bridge.register_class(
//!     ClassBuilder::new("Base")
//!         .destructor(|ptr| unsafe { delete_base(ptr) })
//!         .virtual_method("compute", SlotSignature::new([], ArgKind::Int), native_method(|_, _, _| {
//!             Ok(NativeValue::i32(0))
//!         })),
//! )?;
//! let obj = bridge.construct(base, |_| Ok(NativePtr::from_raw(unsafe { new_base() })))?;
//! bridge.release(obj)?;
//! bridge.collect();
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// ============================================================================
// Core Modules
// ============================================================================

/// Bridge context and its operations
pub mod bridge;

/// Wrapper classes and the class registry
pub mod class;

/// Vtables, override flags and method types
pub mod dispatch;

/// Proxy collection
pub mod gc;

/// Multimethod overload resolution
pub mod multimethod;

/// Proxy records and arena
pub mod proxy;

/// Refcounted handle table
pub mod refcount;

// ============================================================================
// Support Modules
// ============================================================================

/// Default configuration values
pub mod defaults;

/// Pending native exceptions
pub mod exceptions;

/// Address to proxy map
pub mod identity;

/// Destruction notices
pub mod notify;

/// Bridge options
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use bridge::{Bridge, OwnershipAnnotation};

pub use class::{
    ClassBuilder, ClassDescription, ClassRegistry, InstantiationPolicy, NativeBindings, NativeOps,
    PolicyDescription, SlotDescription, WrapperClass,
};

pub use dispatch::{
    host_method, native_method, ArgKind, HostMethod, NativeMethod, OverrideFlags, SlotDecl,
    SlotSignature, VTable,
};

pub use gc::{CollectStats, RootSet};

pub use multimethod::{
    BoundArgs, CustomType, MappedType, Multimethod, MultimethodKind, Overload, Signature,
    SignatureBuilder, TypeContext, TypeSpec,
};

pub use exceptions::ExceptionRegistry;
pub use notify::DestroyNotifier;
pub use options::BridgeOptions;
pub use proxy::{Ownership, Proxy};
pub use refcount::{HandleScope, RefcountTable, SharedRefcounts};

pub use ferrule_sdk;
pub use ferrule_sdk::{
    BridgeError, BridgeResult, ClassId, HostObject, NativePtr, NativeValue, ProxyId, Value,
};
