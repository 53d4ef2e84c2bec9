//! Ferrule SDK - boundary types for the native object bridge
//!
//! This crate holds the types that both the bridge engine and generated glue
//! code need, without depending on the engine itself:
//!
//! - [`NativeValue`] / [`NativePtr`]: what native code passes and receives
//! - [`Value`] / [`HostObject`]: what host code passes and receives
//! - [`ProxyId`] / [`ClassId`]: handles into the bridge's arenas
//! - [`BridgeError`]: the single error type of the bridge
//!
//! # Example
//!
//! ```ignore
//! use ferrule_sdk::{NativeValue, Value, ValueExt};
//!
//! let word = NativeValue::i32(10);
//! let host = Value::Int(word.as_i64().unwrap());
//! let n: i64 = host.extract()?;
//! ```

#![warn(missing_docs)]

pub mod convert;
pub mod error;
pub mod host;
pub mod ids;
pub mod value;

pub use convert::{FromValue, IntoValue, ValueExt};
pub use error::{panic_message, BridgeError, BridgeResult};
pub use host::{HostObject, ObjectKey, Value, ValueKind};
pub use ids::{ClassId, ProxyId};
pub use value::{NativePtr, NativeValue};
