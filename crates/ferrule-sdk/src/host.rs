//! Host-language values as seen by the bridge
//!
//! `Value` is the dynamically typed value that flows through multimethod
//! resolution, virtual-method overrides and keep-alive maps. Proxies and
//! classes are referenced by id; arbitrary host objects (callables, user
//! data) travel as `HostObject`, whose identity is its allocation.

use crate::ids::{ClassId, ProxyId};
use std::any::Any;
use std::fmt;
use std::rc::Rc;

/// Dynamically typed host value
#[derive(Clone, Default)]
pub enum Value {
    /// The host's `None`
    #[default]
    None,
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Float
    Float(f64),
    /// String
    Str(Rc<str>),
    /// Immutable sequence
    Tuple(Rc<[Value]>),
    /// Mutable-by-convention sequence
    List(Rc<[Value]>),
    /// Key/value pairs in insertion order
    Dict(Rc<[(Value, Value)]>),
    /// A proxy for a native object
    Proxy(ProxyId),
    /// A wrapper class object
    Class(ClassId),
    /// Any other host object
    Object(HostObject),
}

/// Coarse runtime kind of a `Value`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// `None`
    None,
    /// `bool`
    Bool,
    /// `int`
    Int,
    /// `float`
    Float,
    /// `str`
    Str,
    /// `tuple`
    Tuple,
    /// `list`
    List,
    /// `dict`
    Dict,
    /// wrapped native object
    Proxy,
    /// wrapper class
    Class,
    /// opaque host object
    Object,
}

impl ValueKind {
    /// Host-language spelling of the kind
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::None => "NoneType",
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Str => "str",
            ValueKind::Tuple => "tuple",
            ValueKind::List => "list",
            ValueKind::Dict => "dict",
            ValueKind::Proxy => "proxy",
            ValueKind::Class => "type",
            ValueKind::Object => "object",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Value {
    /// Build a string value
    pub fn str(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }

    /// Build a tuple value
    pub fn tuple(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Tuple(items.into_iter().collect())
    }

    /// Build a list value
    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Value::List(items.into_iter().collect())
    }

    /// Build a dict value
    pub fn dict(items: impl IntoIterator<Item = (Value, Value)>) -> Self {
        Value::Dict(items.into_iter().collect())
    }

    /// Runtime kind
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::None => ValueKind::None,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Str(_) => ValueKind::Str,
            Value::Tuple(_) => ValueKind::Tuple,
            Value::List(_) => ValueKind::List,
            Value::Dict(_) => ValueKind::Dict,
            Value::Proxy(_) => ValueKind::Proxy,
            Value::Class(_) => ValueKind::Class,
            Value::Object(_) => ValueKind::Object,
        }
    }

    /// Check for `None`
    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// The proxy id, if this is a proxy
    pub fn as_proxy(&self) -> Option<ProxyId> {
        match self {
            Value::Proxy(id) => Some(*id),
            _ => None,
        }
    }

    /// Elements of a tuple or list
    pub fn as_seq(&self) -> Option<&[Value]> {
        match self {
            Value::Tuple(items) | Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Identity key, for values that have one
    ///
    /// Scalars and strings compare by value and have no stable identity.
    pub fn identity(&self) -> Option<ObjectKey> {
        match self {
            Value::Proxy(id) => Some(ObjectKey::Proxy(*id)),
            Value::Object(obj) => Some(obj.key()),
            Value::Tuple(items) | Value::List(items) => {
                Some(ObjectKey::Host(Rc::as_ptr(items) as *const () as usize))
            }
            Value::Dict(items) => Some(ObjectKey::Host(Rc::as_ptr(items) as *const () as usize)),
            _ => None,
        }
    }

    /// Visit every proxy reachable from this value
    pub fn for_each_proxy(&self, f: &mut impl FnMut(ProxyId)) {
        match self {
            Value::Proxy(id) => f(*id),
            Value::Tuple(items) | Value::List(items) => {
                for item in items.iter() {
                    item.for_each_proxy(f);
                }
            }
            Value::Dict(items) => {
                for (k, v) in items.iter() {
                    k.for_each_proxy(f);
                    v.for_each_proxy(f);
                }
            }
            _ => {}
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) | (Value::List(a), Value::List(b)) => a == b,
            (Value::Dict(a), Value::Dict(b)) => a == b,
            (Value::Proxy(a), Value::Proxy(b)) => a == b,
            (Value::Class(a), Value::Class(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Tuple(items) => {
                let mut t = f.debug_tuple("");
                for item in items.iter() {
                    t.field(item);
                }
                t.finish()
            }
            Value::List(items) => f.debug_list().entries(items.iter()).finish(),
            Value::Dict(items) => f
                .debug_map()
                .entries(items.iter().map(|(k, v)| (k, v)))
                .finish(),
            Value::Proxy(id) => write!(f, "<{}>", id),
            Value::Class(id) => write!(f, "<{}>", id),
            Value::Object(obj) => write!(f, "{:?}", obj),
        }
    }
}

/// Identity of a host object
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectKey {
    /// A proxy, by id
    Proxy(ProxyId),
    /// Any other host object, by allocation address
    Host(usize),
}

/// Reference-counted opaque host object
///
/// Cloning shares the allocation, so clones have the same identity.
#[derive(Clone)]
pub struct HostObject(Rc<dyn Any>);

impl HostObject {
    /// Wrap a Rust value as a host object
    pub fn new<T: Any>(value: T) -> Self {
        Self(Rc::new(value))
    }

    /// Identity key
    pub fn key(&self) -> ObjectKey {
        ObjectKey::Host(Rc::as_ptr(&self.0) as *const () as usize)
    }

    /// Same allocation?
    pub fn ptr_eq(&self, other: &HostObject) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Borrow the wrapped value as `T`
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Number of live clones (host references) of this object
    pub fn strong_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }
}

impl fmt::Debug for HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<object at {:#x}>", Rc::as_ptr(&self.0) as *const () as usize)
    }
}

impl From<HostObject> for Value {
    fn from(obj: HostObject) -> Self {
        Value::Object(obj)
    }
}
