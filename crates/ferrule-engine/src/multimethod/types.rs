//! Parameter types of overload signatures

use crate::bridge::Bridge;
use ferrule_sdk::{BridgeError, BridgeResult, ClassId, HostObject, Value, ValueKind};
use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use std::fmt;
use std::rc::Rc;

/// What overload resolution needs to know about wrapper classes
pub trait TypeContext {
    /// Is `value` an instance of `class` or one of its subclasses?
    fn value_is_instance(&self, value: &Value, class: ClassId) -> bool;

    /// Wrapper class by host name
    fn class_named(&self, name: &str) -> Option<ClassId>;

    /// Host name of a wrapper class
    fn class_name(&self, class: ClassId) -> Option<String>;
}

impl TypeContext for Bridge {
    fn value_is_instance(&self, value: &Value, class: ClassId) -> bool {
        value.as_proxy().is_some_and(|id| self.is_instance(id, class))
    }

    fn class_named(&self, name: &str) -> Option<ClassId> {
        self.classes().by_name(name)
    }

    fn class_name(&self, class: ClassId) -> Option<String> {
        self.classes().get(class).map(|c| c.name().to_string())
    }
}

/// Multimethods over plain host values, with no wrapper classes in play
impl TypeContext for () {
    fn value_is_instance(&self, _value: &Value, _class: ClassId) -> bool {
        false
    }

    fn class_named(&self, _name: &str) -> Option<ClassId> {
        None
    }

    fn class_name(&self, _class: ClassId) -> Option<String> {
        None
    }
}

/// A user-defined parameter type with its own check and conversion
///
/// `accepts` decides whether an overload is feasible; `convert` runs only
/// on the winning overload, and only for values that are not already
/// exact instances.
pub trait MappedType {
    /// Name used in mismatch messages
    fn name(&self) -> &str;

    /// Can `value` be passed for a parameter of this type?
    fn accepts(&self, value: &Value) -> bool;

    /// Is `value` already of this type, needing no conversion?
    fn is_exact(&self, _value: &Value) -> bool {
        false
    }

    /// Convert an accepted value
    fn convert(&self, value: &Value) -> BridgeResult<Value>;
}

type Check = Box<dyn Fn(&Value) -> bool>;
type Convert = Box<dyn Fn(&Value) -> BridgeResult<Value>>;

/// Closure-backed [`MappedType`]
pub struct CustomType {
    name: String,
    accepts: Check,
    exact: Option<Check>,
    convert: Convert,
}

impl CustomType {
    /// A type accepting values for which `accepts` holds, converted by
    /// `convert`
    pub fn new(
        name: impl Into<String>,
        accepts: impl Fn(&Value) -> bool + 'static,
        convert: impl Fn(&Value) -> BridgeResult<Value> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            accepts: Box::new(accepts),
            exact: None,
            convert: Box::new(convert),
        }
    }

    /// Values for which `exact` holds are passed through unconverted
    pub fn exact(mut self, exact: impl Fn(&Value) -> bool + 'static) -> Self {
        self.exact = Some(Box::new(exact));
        self
    }

    /// Values holding a `T` are exact; others are converted by `convert`
    pub fn wrapping<T: 'static>(
        name: impl Into<String>,
        accepts: impl Fn(&Value) -> bool + 'static,
        convert: impl Fn(&Value) -> BridgeResult<T> + 'static,
    ) -> Self {
        let is_t = |v: &Value| matches!(v, Value::Object(o) if o.downcast_ref::<T>().is_some());
        Self::new(
            name,
            move |v| is_t(v) || accepts(v),
            move |v| convert(v).map(|t| Value::Object(HostObject::new(t))),
        )
        .exact(is_t)
    }
}

impl MappedType for CustomType {
    fn name(&self) -> &str {
        &self.name
    }

    fn accepts(&self, value: &Value) -> bool {
        (self.accepts)(value)
    }

    fn is_exact(&self, value: &Value) -> bool {
        self.exact.as_ref().is_some_and(|f| f(value))
    }

    fn convert(&self, value: &Value) -> BridgeResult<Value> {
        (self.convert)(value)
    }
}

/// Declared type of an overload parameter
#[derive(Clone)]
pub enum TypeSpec {
    /// Anything
    Any,
    /// A builtin host type
    Builtin(ValueKind),
    /// A raw address (int) or `None`
    VoidPtr,
    /// A wrapper class, matched through the base chain
    Class(ClassId),
    /// A tuple or list whose every element matches
    SeqOf(Box<TypeSpec>),
    /// A user-defined type
    Mapped(Rc<dyn MappedType>),
    /// A type known only by name until the multimethod is finalized
    Named(String),
}

#[derive(Clone, Copy)]
enum BuiltinName {
    Any,
    VoidPtr,
    Kind(ValueKind),
}

static BUILTIN_NAMES: Lazy<FxHashMap<&'static str, BuiltinName>> = Lazy::new(|| {
    let mut table = FxHashMap::default();
    for kind in [
        ValueKind::Int,
        ValueKind::Float,
        ValueKind::Bool,
        ValueKind::Str,
        ValueKind::Tuple,
        ValueKind::List,
        ValueKind::Dict,
    ] {
        table.insert(kind.name(), BuiltinName::Kind(kind));
    }
    table.insert("None", BuiltinName::Kind(ValueKind::None));
    table.insert("NoneType", BuiltinName::Kind(ValueKind::None));
    table.insert("object", BuiltinName::Any);
    table.insert("any", BuiltinName::Any);
    table.insert("voidptr", BuiltinName::VoidPtr);
    table
});

impl TypeSpec {
    /// `int`
    pub fn int() -> Self {
        TypeSpec::Builtin(ValueKind::Int)
    }

    /// `float`
    pub fn float() -> Self {
        TypeSpec::Builtin(ValueKind::Float)
    }

    /// `bool`
    pub fn bool() -> Self {
        TypeSpec::Builtin(ValueKind::Bool)
    }

    /// `str`
    pub fn str() -> Self {
        TypeSpec::Builtin(ValueKind::Str)
    }

    /// `tuple`
    pub fn tuple() -> Self {
        TypeSpec::Builtin(ValueKind::Tuple)
    }

    /// `list`
    pub fn list() -> Self {
        TypeSpec::Builtin(ValueKind::List)
    }

    /// `dict`
    pub fn dict() -> Self {
        TypeSpec::Builtin(ValueKind::Dict)
    }

    /// `None`
    pub fn none() -> Self {
        TypeSpec::Builtin(ValueKind::None)
    }

    /// Wrapper class
    pub fn class(id: ClassId) -> Self {
        TypeSpec::Class(id)
    }

    /// Sequence of `item`
    pub fn seq_of(item: TypeSpec) -> Self {
        TypeSpec::SeqOf(Box::new(item))
    }

    /// User-defined type
    pub fn mapped(ty: impl MappedType + 'static) -> Self {
        TypeSpec::Mapped(Rc::new(ty))
    }

    /// Type resolved by name at finalize time
    pub fn named(name: impl Into<String>) -> Self {
        TypeSpec::Named(name.into())
    }

    /// Resolve a type name: builtin names first, then wrapper classes
    pub fn lookup(name: &str, ctx: &dyn TypeContext) -> Option<TypeSpec> {
        if let Some(builtin) = BUILTIN_NAMES.get(name) {
            return Some(match *builtin {
                BuiltinName::Any => TypeSpec::Any,
                BuiltinName::VoidPtr => TypeSpec::VoidPtr,
                BuiltinName::Kind(kind) => TypeSpec::Builtin(kind),
            });
        }
        ctx.class_named(name).map(TypeSpec::Class)
    }

    /// Replace named types with what they name
    pub(crate) fn resolve_names(&mut self, ctx: &dyn TypeContext) -> BridgeResult<()> {
        match self {
            TypeSpec::Named(name) => {
                *self = TypeSpec::lookup(name, ctx).ok_or_else(|| BridgeError::UnknownClass(name.clone()))?;
                Ok(())
            }
            TypeSpec::SeqOf(item) => item.resolve_names(ctx),
            _ => Ok(()),
        }
    }

    /// Does `value` satisfy this type?
    pub fn accepts(&self, value: &Value, ctx: &dyn TypeContext) -> bool {
        match self {
            TypeSpec::Any => true,
            TypeSpec::Builtin(ValueKind::Int) => matches!(value, Value::Int(_) | Value::Bool(_)),
            TypeSpec::Builtin(kind) => value.kind() == *kind,
            TypeSpec::VoidPtr => matches!(value, Value::Int(_) | Value::None),
            TypeSpec::Class(class) => ctx.value_is_instance(value, *class),
            TypeSpec::SeqOf(item) => value
                .as_seq()
                .is_some_and(|items| items.iter().all(|v| item.accepts(v, ctx))),
            TypeSpec::Mapped(ty) => ty.accepts(value),
            TypeSpec::Named(name) => {
                TypeSpec::lookup(name, ctx).is_some_and(|ty| ty.accepts(value, ctx))
            }
        }
    }

    /// Convert an accepted value to this type, unless it already is one
    pub fn coerce(&self, value: &Value, ctx: &dyn TypeContext) -> BridgeResult<Value> {
        match self {
            TypeSpec::Builtin(ValueKind::Int) => match value {
                Value::Bool(b) => Ok(Value::Int(*b as i64)),
                other => Ok(other.clone()),
            },
            TypeSpec::SeqOf(item) => match value {
                Value::Tuple(items) => Ok(Value::Tuple(coerce_all(item, items, ctx)?.into())),
                Value::List(items) => Ok(Value::List(coerce_all(item, items, ctx)?.into())),
                other => Ok(other.clone()),
            },
            TypeSpec::Mapped(ty) if !ty.is_exact(value) => ty.convert(value),
            TypeSpec::Named(name) => match TypeSpec::lookup(name, ctx) {
                Some(ty) => ty.coerce(value, ctx),
                None => Ok(value.clone()),
            },
            _ => Ok(value.clone()),
        }
    }

    /// Type name for mismatch messages
    pub fn describe(&self, ctx: &dyn TypeContext) -> String {
        match self {
            TypeSpec::Class(class) => ctx.class_name(*class).unwrap_or_else(|| class.to_string()),
            TypeSpec::SeqOf(item) => format!("sequence of {}", item.describe(ctx)),
            other => other.to_string(),
        }
    }
}

fn coerce_all(item: &TypeSpec, items: &[Value], ctx: &dyn TypeContext) -> BridgeResult<Vec<Value>> {
    items.iter().map(|v| item.coerce(v, ctx)).collect()
}

impl fmt::Display for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSpec::Any => write!(f, "object"),
            TypeSpec::Builtin(kind) => write!(f, "{}", kind),
            TypeSpec::VoidPtr => write!(f, "voidptr"),
            TypeSpec::Class(class) => write!(f, "{}", class),
            TypeSpec::SeqOf(item) => write!(f, "sequence of {}", item),
            TypeSpec::Mapped(ty) => write!(f, "{}", ty.name()),
            TypeSpec::Named(name) => write!(f, "{}", name),
        }
    }
}

impl fmt::Debug for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeSpec({})", self)
    }
}
