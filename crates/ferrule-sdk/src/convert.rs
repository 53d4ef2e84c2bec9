//! Conversions between host `Value`s and Rust types
//!
//! Override closures and overload bodies receive `Value`s; these traits give
//! them typed access without matching on the enum by hand.
//!
//! ```ignore
//! let n: i64 = args.get("n")?.extract()?;
//! Ok(n.into_value())
//! ```

use crate::error::{BridgeError, BridgeResult};
use crate::host::{HostObject, Value};
use crate::ids::ProxyId;

/// Extract a Rust value from a host `Value`
pub trait FromValue: Sized {
    /// Convert, failing with `TypeMismatch`
    fn from_value(value: &Value) -> BridgeResult<Self>;
}

/// Turn a Rust value into a host `Value`
pub trait IntoValue {
    /// Convert
    fn into_value(self) -> Value;
}

/// `value.extract::<T>()` sugar
pub trait ValueExt {
    /// Convert to `T`
    fn extract<T: FromValue>(&self) -> BridgeResult<T>;
}

impl ValueExt for Value {
    fn extract<T: FromValue>(&self) -> BridgeResult<T> {
        T::from_value(self)
    }
}

fn mismatch(expected: &str, got: &Value) -> BridgeError {
    BridgeError::type_mismatch(expected, got.kind().name())
}

impl FromValue for Value {
    fn from_value(value: &Value) -> BridgeResult<Self> {
        Ok(value.clone())
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> BridgeResult<Self> {
        match value {
            Value::Int(i) => Ok(*i),
            Value::Bool(b) => Ok(*b as i64),
            other => Err(mismatch("int", other)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> BridgeResult<Self> {
        let wide = i64::from_value(value)?;
        i32::try_from(wide).map_err(|_| BridgeError::type_mismatch("int (32-bit)", "int out of range"))
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> BridgeResult<Self> {
        match value {
            Value::Float(f) => Ok(*f),
            Value::Int(i) => Ok(*i as f64),
            other => Err(mismatch("float", other)),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> BridgeResult<Self> {
        match value {
            Value::Bool(b) => Ok(*b),
            other => Err(mismatch("bool", other)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> BridgeResult<Self> {
        match value {
            Value::Str(s) => Ok(s.to_string()),
            other => Err(mismatch("str", other)),
        }
    }
}

impl FromValue for ProxyId {
    fn from_value(value: &Value) -> BridgeResult<Self> {
        value.as_proxy().ok_or_else(|| mismatch("proxy", value))
    }
}

impl FromValue for HostObject {
    fn from_value(value: &Value) -> BridgeResult<Self> {
        match value {
            Value::Object(obj) => Ok(obj.clone()),
            other => Err(mismatch("object", other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> BridgeResult<Self> {
        if value.is_none() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &Value) -> BridgeResult<Self> {
        match value.as_seq() {
            Some(items) => items.iter().map(T::from_value).collect(),
            None => Err(mismatch("sequence", value)),
        }
    }
}

impl IntoValue for Value {
    fn into_value(self) -> Value {
        self
    }
}

impl IntoValue for () {
    fn into_value(self) -> Value {
        Value::None
    }
}

impl IntoValue for i64 {
    fn into_value(self) -> Value {
        Value::Int(self)
    }
}

impl IntoValue for i32 {
    fn into_value(self) -> Value {
        Value::Int(self as i64)
    }
}

impl IntoValue for f64 {
    fn into_value(self) -> Value {
        Value::Float(self)
    }
}

impl IntoValue for bool {
    fn into_value(self) -> Value {
        Value::Bool(self)
    }
}

impl IntoValue for &str {
    fn into_value(self) -> Value {
        Value::str(self)
    }
}

impl IntoValue for String {
    fn into_value(self) -> Value {
        Value::str(&self)
    }
}

impl IntoValue for ProxyId {
    fn into_value(self) -> Value {
        Value::Proxy(self)
    }
}

impl<T: IntoValue> IntoValue for Option<T> {
    fn into_value(self) -> Value {
        match self {
            Some(v) => v.into_value(),
            None => Value::None,
        }
    }
}
