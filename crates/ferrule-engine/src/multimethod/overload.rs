//! Overload signatures, feasibility checks and argument binding

use super::types::{TypeContext, TypeSpec};
use ferrule_sdk::{BridgeError, BridgeResult, Value};
use once_cell::unsync::OnceCell;
use rustc_hash::FxHashSet;
use std::fmt;
use std::rc::Rc;

/// Overload body: context, receiver (instance or class, `None` for static
/// multimethods) and the bound arguments
pub type OverloadFn<C> = Rc<dyn Fn(&mut C, Option<Value>, &BoundArgs) -> BridgeResult<Value>>;

/// Default of an optional parameter
#[derive(Clone)]
pub enum DefaultValue {
    /// A value known at declaration time
    Value(Value),
    /// An expression evaluated once, at finalize or first use
    Lazy {
        /// The expression
        init: Rc<dyn Fn() -> Value>,
        /// Its value once evaluated
        cell: Rc<OnceCell<Value>>,
    },
}

impl DefaultValue {
    /// The default's value, evaluating a lazy default if needed
    pub fn get(&self) -> Value {
        match self {
            DefaultValue::Value(v) => v.clone(),
            DefaultValue::Lazy { init, cell } => cell.get_or_init(|| init()).clone(),
        }
    }
}

/// A declared parameter
#[derive(Clone)]
pub struct Param {
    name: Option<String>,
    ty: TypeSpec,
    default: Option<DefaultValue>,
}

impl Param {
    /// Parameter name; `None` for positional-only parameters
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Declared type
    pub fn ty(&self) -> &TypeSpec {
        &self.ty
    }

    /// Is the parameter required?
    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

/// Parameter list of one overload
#[derive(Clone, Default)]
pub struct Signature {
    params: Vec<Param>,
}

impl Signature {
    /// Start a signature
    pub fn builder() -> SignatureBuilder {
        SignatureBuilder::default()
    }

    /// The empty signature
    pub fn empty() -> Self {
        Self::default()
    }

    /// Declared parameters
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Number of positional-only (unnamed) parameters
    pub fn unnamed_count(&self) -> usize {
        self.params.iter().take_while(|p| p.name.is_none()).count()
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p.name.as_deref() == Some(name))
    }

    pub(crate) fn finalize(&mut self, ctx: &dyn TypeContext) -> BridgeResult<()> {
        for param in &mut self.params {
            param.ty.resolve_names(ctx)?;
            if let Some(default) = &param.default {
                default.get();
            }
        }
        Ok(())
    }

    /// Check whether the arguments fit, without converting anything
    ///
    /// Returns the reason for rejection.
    pub fn check_match(
        &self,
        args: &[Value],
        kwargs: &[(&str, Value)],
        ctx: &dyn TypeContext,
    ) -> Result<(), String> {
        if args.len() > self.params.len() {
            return Err("too many arguments".to_string());
        }
        if args.len() < self.unnamed_count() {
            return Err("not enough arguments".to_string());
        }

        let kw_names: FxHashSet<&str> = kwargs.iter().map(|(k, _)| *k).collect();
        for (i, value) in args.iter().enumerate() {
            let param = &self.params[i];
            if let Some(name) = param.name.as_deref() {
                if kw_names.contains(name) {
                    return Err(format!(
                        "argument '{}' has already been given as a positional argument",
                        name
                    ));
                }
            }
            if !param.ty.accepts(value, ctx) {
                return Err(format!(
                    "argument {} has unexpected type '{}'",
                    i,
                    param.ty.describe(ctx)
                ));
            }
        }

        let mut seen = FxHashSet::default();
        for (name, value) in kwargs {
            let Some(index) = self.index_of(name) else {
                return Err(format!("'{}' is not a valid keyword argument", name));
            };
            if !seen.insert(*name) {
                return Err(format!("argument '{}' given more than once", name));
            }
            let ty = &self.params[index].ty;
            if !ty.accepts(value, ctx) {
                return Err(format!(
                    "argument '{}' has unexpected type '{}'",
                    name,
                    ty.describe(ctx)
                ));
            }
        }

        for param in self.params.iter().skip(args.len()) {
            if let (Some(name), true) = (param.name.as_deref(), param.is_required()) {
                if !kw_names.contains(name) {
                    return Err(format!("missing required argument '{}'", name));
                }
            }
        }
        Ok(())
    }

    /// Bind checked arguments to parameters, converting values that are
    /// not already exact instances and filling in defaults
    pub fn bind(
        &self,
        args: &[Value],
        kwargs: &[(&str, Value)],
        ctx: &dyn TypeContext,
    ) -> BridgeResult<BoundArgs> {
        let mut slots: Vec<Option<Value>> = vec![None; self.params.len()];
        for (i, value) in args.iter().enumerate() {
            slots[i] = Some(self.params[i].ty.coerce(value, ctx)?);
        }
        for (name, value) in kwargs {
            let index = self
                .index_of(name)
                .ok_or_else(|| BridgeError::type_mismatch("keyword argument", *name))?;
            slots[index] = Some(self.params[index].ty.coerce(value, ctx)?);
        }

        let mut values = Vec::with_capacity(self.params.len());
        for (param, slot) in self.params.iter().zip(slots) {
            let value = match (slot, &param.default) {
                (Some(v), _) => v,
                (None, Some(default)) => default.get(),
                (None, None) => {
                    return Err(BridgeError::type_mismatch(
                        format!("argument '{}'", param.name.as_deref().unwrap_or("?")),
                        "nothing",
                    ))
                }
            };
            values.push((param.name.clone(), value));
        }
        Ok(BoundArgs { values })
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for p in &self.params {
            match (&p.name, p.is_required()) {
                (Some(n), true) => list.entry(&format_args!("{}: {}", n, p.ty)),
                (Some(n), false) => list.entry(&format_args!("{}: {} = ...", n, p.ty)),
                (None, _) => list.entry(&format_args!("{}", p.ty)),
            };
        }
        list.finish()
    }
}

/// Builder for [`Signature`]
///
/// Layout rules, checked by [`SignatureBuilder::build`]: positional-only
/// parameters come first, required named parameters next, optional ones
/// last, and names are unique.
#[derive(Default)]
pub struct SignatureBuilder {
    params: Vec<Param>,
}

impl SignatureBuilder {
    /// Required positional-only parameter
    pub fn positional(mut self, ty: TypeSpec) -> Self {
        self.params.push(Param {
            name: None,
            ty,
            default: None,
        });
        self
    }

    /// Required named parameter
    pub fn param(mut self, name: impl Into<String>, ty: TypeSpec) -> Self {
        self.params.push(Param {
            name: Some(name.into()),
            ty,
            default: None,
        });
        self
    }

    /// Optional named parameter
    pub fn optional(mut self, name: impl Into<String>, ty: TypeSpec, default: Value) -> Self {
        self.params.push(Param {
            name: Some(name.into()),
            ty,
            default: Some(DefaultValue::Value(default)),
        });
        self
    }

    /// Optional named parameter whose default is computed once
    pub fn lazy_optional(
        mut self,
        name: impl Into<String>,
        ty: TypeSpec,
        init: impl Fn() -> Value + 'static,
    ) -> Self {
        self.params.push(Param {
            name: Some(name.into()),
            ty,
            default: Some(DefaultValue::Lazy {
                init: Rc::new(init),
                cell: Rc::new(OnceCell::new()),
            }),
        });
        self
    }

    /// Validate the layout
    pub fn build(self) -> BridgeResult<Signature> {
        let mut names = FxHashSet::default();
        let mut seen_named = false;
        let mut seen_optional = false;
        for (i, p) in self.params.iter().enumerate() {
            match p.name.as_deref() {
                None if seen_named => {
                    return Err(BridgeError::InvalidSignature(format!(
                        "unnamed positional argument at position {} follows a named argument",
                        i
                    )))
                }
                None => {}
                Some(name) => {
                    seen_named = true;
                    if !names.insert(name) {
                        return Err(BridgeError::InvalidSignature(format!(
                            "duplicate argument name '{}'",
                            name
                        )));
                    }
                    if p.is_required() && seen_optional {
                        return Err(BridgeError::InvalidSignature(format!(
                            "required argument '{}' follows an optional argument",
                            name
                        )));
                    }
                    seen_optional |= !p.is_required();
                }
            }
        }
        Ok(Signature { params: self.params })
    }
}

/// Arguments bound to a winning overload's parameters, in declaration
/// order, defaults filled in
#[derive(Debug, Clone, PartialEq)]
pub struct BoundArgs {
    values: Vec<(Option<String>, Value)>,
}

impl BoundArgs {
    /// Argument of a named parameter
    pub fn get(&self, name: &str) -> BridgeResult<&Value> {
        self.values
            .iter()
            .find(|(n, _)| n.as_deref() == Some(name))
            .map(|(_, v)| v)
            .ok_or_else(|| BridgeError::type_mismatch(format!("argument '{}'", name), "nothing"))
    }

    /// Argument of the `index`th parameter
    pub fn positional(&self, index: usize) -> Option<&Value> {
        self.values.get(index).map(|(_, v)| v)
    }

    /// All arguments in parameter order
    pub fn values(&self) -> impl Iterator<Item = &Value> + '_ {
        self.values.iter().map(|(_, v)| v)
    }

    /// Number of parameters
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True for an empty signature
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// One overload of a multimethod
pub struct Overload<C> {
    pub(crate) signature: Signature,
    pub(crate) func: OverloadFn<C>,
    pub(crate) deprecated: Option<String>,
}

impl<C> Overload<C> {
    /// Parameter list
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Deprecation message, if the overload is deprecated
    pub fn deprecated(&self) -> Option<&str> {
        self.deprecated.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig() -> Signature {
        Signature::builder()
            .param("i", TypeSpec::int())
            .optional("n", TypeSpec::int(), Value::Int(10))
            .build()
            .unwrap()
    }

    #[test]
    fn test_layout_rules() {
        let err = Signature::builder()
            .param("a", TypeSpec::int())
            .positional(TypeSpec::int())
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, BridgeError::InvalidSignature(_)));

        assert!(Signature::builder()
            .optional("a", TypeSpec::int(), Value::Int(0))
            .param("b", TypeSpec::int())
            .build()
            .is_err());
        assert!(Signature::builder()
            .param("a", TypeSpec::int())
            .param("a", TypeSpec::str())
            .build()
            .is_err());
    }

    #[test]
    fn test_mismatch_reasons() {
        fn check(args: &[Value], kwargs: &[(&str, Value)]) -> Option<String> {
            sig().check_match(args, kwargs, &()).err()
        }
        assert_eq!(check(&[Value::Int(1), Value::Int(2), Value::Int(3)], &[]).as_deref(), Some("too many arguments"));
        assert_eq!(
            check(&[Value::Int(1)], &[("i", Value::Int(2))]).as_deref(),
            Some("argument 'i' has already been given as a positional argument")
        );
        assert_eq!(check(&[Value::str("x")], &[]).as_deref(), Some("argument 0 has unexpected type 'int'"));
        assert_eq!(check(&[], &[("k", Value::Int(2))]).as_deref(), Some("'k' is not a valid keyword argument"));
        assert_eq!(
            check(&[], &[("i", Value::Float(2.0))]).as_deref(),
            Some("argument 'i' has unexpected type 'int'")
        );
        assert_eq!(check(&[], &[]).as_deref(), Some("missing required argument 'i'"));
        assert_eq!(check(&[], &[("n", Value::Int(2)), ("i", Value::Int(3))]), None);
    }

    #[test]
    fn test_unnamed_params_must_be_positional() {
        let s = Signature::builder().positional(TypeSpec::str()).build().unwrap();
        assert_eq!(s.check_match(&[], &[], &()).err().as_deref(), Some("not enough arguments"));
        assert!(s.check_match(&[Value::str("a")], &[], &()).is_ok());
    }

    #[test]
    fn test_bind_fills_defaults_in_order() {
        let s = sig();
        let bound = s.bind(&[], &[("i", Value::Bool(true))], &()).unwrap();
        assert_eq!(bound.get("i"), Ok(&Value::Int(1)));
        assert_eq!(bound.get("n"), Ok(&Value::Int(10)));
        assert_eq!(bound.positional(1), Some(&Value::Int(10)));
        assert!(bound.get("x").is_err());
    }

    #[test]
    fn test_lazy_default_evaluated_once() {
        let calls = Rc::new(std::cell::Cell::new(0));
        let counter = Rc::clone(&calls);
        let mut s = Signature::builder()
            .lazy_optional("k", TypeSpec::tuple(), move || {
                counter.set(counter.get() + 1);
                Value::tuple([Value::Int(1), Value::Int(2)])
            })
            .build()
            .unwrap();
        assert_eq!(calls.get(), 0);
        s.finalize(&()).unwrap();
        assert_eq!(calls.get(), 1);
        let a = s.bind(&[], &[], &()).unwrap();
        let b = s.bind(&[], &[], &()).unwrap();
        assert_eq!(a, b);
        assert_eq!(calls.get(), 1);
    }
}
