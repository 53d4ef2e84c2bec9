//! Virtual dispatch: vtables, override flags and host override callables
//!
//! The dispatch operations themselves live on [`crate::Bridge`]
//! (`dispatch_virtual`, `call_method`, `call_super`, the override setters);
//! this module holds the data they work on.

mod flags;
mod vtable;

pub use flags::OverrideFlags;
pub use vtable::{ArgKind, NativeMethod, SlotDecl, SlotSignature, VTable};

use crate::bridge::Bridge;
use ferrule_sdk::{BridgeResult, ProxyId, Value};
use std::rc::Rc;

/// Host implementation of a virtual slot
///
/// Called with the bridge, the receiving proxy and the marshalled arguments.
pub type HostMethod = Rc<dyn Fn(&mut Bridge, ProxyId, &[Value]) -> BridgeResult<Value>>;

/// Wrap a closure as a [`HostMethod`]
pub fn host_method<F>(f: F) -> HostMethod
where
    F: Fn(&mut Bridge, ProxyId, &[Value]) -> BridgeResult<Value> + 'static,
{
    Rc::new(f)
}

/// Wrap a closure as a [`NativeMethod`]
pub fn native_method<F>(f: F) -> NativeMethod
where
    F: Fn(&mut Bridge, ferrule_sdk::NativePtr, &[ferrule_sdk::NativeValue]) -> BridgeResult<ferrule_sdk::NativeValue>
        + 'static,
{
    Rc::new(f)
}
