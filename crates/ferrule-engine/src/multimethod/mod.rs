//! Multimethod resolver
//!
//! A multimethod is an ordered list of overloads. A call picks the *first*
//! overload, in declaration order, whose signature accepts the arguments.
//! There is no best-match scoring: declare narrower overloads before wider
//! ones. When nothing matches, the error lists every overload's rejection
//! reason.
//!
//! Values are converted (custom conversions, `bool` to `int`) only after
//! a winner is chosen.
//!
//! ```ignore
//! let mut mm = Multimethod::instance("SetSize");
//! mm.overload(
//!     Signature::builder().param("w", TypeSpec::int()).param("h", TypeSpec::int()).build()?,
//!     |bridge, this, args| { ... },
//! );
//! mm.finalize(&bridge)?;
//! mm.call(&mut bridge, Some(Value::Proxy(frame)), &[Value::Int(4), Value::Int(3)], &[])?;
//! ```

mod overload;
mod types;

pub use overload::{BoundArgs, DefaultValue, Overload, OverloadFn, Param, Signature, SignatureBuilder};
pub use types::{CustomType, MappedType, TypeContext, TypeSpec};

use ferrule_sdk::{BridgeError, BridgeResult, Value};
use std::rc::Rc;

/// How the receiver reaches an overload body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultimethodKind {
    /// Receives the instance; called unbound, the first positional
    /// argument is the instance
    Instance,
    /// Receives the class
    Class,
    /// Receives no receiver
    Static,
}

/// Overloaded callable
pub struct Multimethod<C> {
    name: String,
    kind: MultimethodKind,
    overloads: Vec<Overload<C>>,
    finalized: bool,
}

impl<C: TypeContext> Multimethod<C> {
    /// Create an empty multimethod
    pub fn new(name: impl Into<String>, kind: MultimethodKind) -> Self {
        Self {
            name: name.into(),
            kind,
            overloads: Vec::new(),
            finalized: false,
        }
    }

    /// Instance multimethod
    pub fn instance(name: impl Into<String>) -> Self {
        Self::new(name, MultimethodKind::Instance)
    }

    /// Class multimethod
    pub fn class_method(name: impl Into<String>) -> Self {
        Self::new(name, MultimethodKind::Class)
    }

    /// Static multimethod
    pub fn static_method(name: impl Into<String>) -> Self {
        Self::new(name, MultimethodKind::Static)
    }

    /// Name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Receiver kind
    pub fn kind(&self) -> MultimethodKind {
        self.kind
    }

    /// Overloads in declaration order
    pub fn overloads(&self) -> &[Overload<C>] {
        &self.overloads
    }

    /// Has [`Multimethod::finalize`] run?
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Append an overload
    pub fn overload<F>(&mut self, signature: Signature, func: F) -> &mut Self
    where
        F: Fn(&mut C, Option<Value>, &BoundArgs) -> BridgeResult<Value> + 'static,
    {
        self.push(signature, Rc::new(func), None)
    }

    /// Append an overload that logs `message` whenever it is called
    pub fn deprecated_overload<F>(&mut self, signature: Signature, message: impl Into<String>, func: F) -> &mut Self
    where
        F: Fn(&mut C, Option<Value>, &BoundArgs) -> BridgeResult<Value> + 'static,
    {
        self.push(signature, Rc::new(func), Some(message.into()))
    }

    fn push(&mut self, signature: Signature, func: OverloadFn<C>, deprecated: Option<String>) -> &mut Self {
        self.overloads.push(Overload {
            signature,
            func,
            deprecated,
        });
        self
    }

    /// Resolve named parameter types and evaluate lazy defaults
    ///
    /// Run once every class the signatures name by name is registered.
    pub fn finalize(&mut self, ctx: &C) -> BridgeResult<()> {
        for overload in &mut self.overloads {
            overload.signature.finalize(ctx)?;
        }
        self.finalized = true;
        tracing::debug!(multimethod = %self.name, overloads = self.overloads.len(), "multimethod finalized");
        Ok(())
    }

    /// First overload accepting the arguments
    pub fn resolve_overload(
        &self,
        ctx: &C,
        args: &[Value],
        kwargs: &[(&str, Value)],
    ) -> BridgeResult<&Overload<C>> {
        let mut reasons = Vec::with_capacity(self.overloads.len());
        for overload in &self.overloads {
            match overload.signature.check_match(args, kwargs, ctx) {
                Ok(()) => return Ok(overload),
                Err(reason) => reasons.push(reason),
            }
        }
        Err(BridgeError::NoMatchingOverload { reasons })
    }

    /// Resolve, convert and invoke
    ///
    /// `receiver` is the bound instance or class. An instance multimethod
    /// called without one takes its receiver from the first positional
    /// argument; a static multimethod ignores it.
    pub fn call(
        &self,
        ctx: &mut C,
        receiver: Option<Value>,
        args: &[Value],
        kwargs: &[(&str, Value)],
    ) -> BridgeResult<Value> {
        let (receiver, args) = match (self.kind, receiver) {
            (MultimethodKind::Static, _) => (None, args),
            (MultimethodKind::Instance, None) => match args.split_first() {
                Some((this, rest)) => (Some(this.clone()), rest),
                None => {
                    return Err(BridgeError::type_mismatch(
                        format!("instance as first argument of {}", self.name),
                        "no arguments",
                    ))
                }
            },
            (_, receiver) => (receiver, args),
        };

        let overload = self.resolve_overload(&*ctx, args, kwargs)?;
        if let Some(message) = &overload.deprecated {
            tracing::warn!(target: "ferrule::deprecated", multimethod = %self.name, "{}", message);
        }
        let bound = overload.signature.bind(args, kwargs, &*ctx)?;
        let func = Rc::clone(&overload.func);
        func(ctx, receiver, &bound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrule_sdk::ValueExt;

    fn echo(_: &mut (), this: Option<Value>, args: &BoundArgs) -> BridgeResult<Value> {
        let mut out: Vec<Value> = this.into_iter().collect();
        out.extend(args.values().cloned());
        Ok(Value::tuple(out))
    }

    fn builtin_types() -> Multimethod<()> {
        let mut mm = Multimethod::instance("builtin_types");
        mm.overload(Signature::empty(), echo)
            .overload(Signature::builder().param("i", TypeSpec::int()).build().unwrap(), echo)
            .overload(
                Signature::builder()
                    .param("i", TypeSpec::int())
                    .param("l", TypeSpec::list())
                    .build()
                    .unwrap(),
                echo,
            )
            .overload(
                Signature::builder()
                    .param("one", TypeSpec::tuple())
                    .optional("two", TypeSpec::tuple(), Value::tuple([Value::Int(2), Value::Int(3)]))
                    .build()
                    .unwrap(),
                echo,
            )
            .overload(
                Signature::builder()
                    .param("f", TypeSpec::float())
                    .optional("k", TypeSpec::tuple(), Value::tuple([Value::Int(1)]))
                    .build()
                    .unwrap(),
                echo,
            );
        mm
    }

    fn call(mm: &Multimethod<()>, args: &[Value], kwargs: &[(&str, Value)]) -> BridgeResult<Value> {
        mm.call(&mut (), Some(Value::str("self")), args, kwargs)
    }

    #[test]
    fn test_positional_and_keyword_calls() {
        let mm = builtin_types();
        let me = Value::str("self");
        assert_eq!(call(&mm, &[], &[]), Ok(Value::tuple([me.clone()])));
        assert_eq!(call(&mm, &[Value::Int(42)], &[]), Ok(Value::tuple([me.clone(), Value::Int(42)])));
        let l = Value::list([Value::Int(1)]);
        assert_eq!(
            call(&mm, &[], &[("l", l.clone()), ("i", Value::Int(-1))]),
            Ok(Value::tuple([me.clone(), Value::Int(-1), l]))
        );
        let one = Value::tuple([Value::Int(0)]);
        assert_eq!(
            call(&mm, &[one.clone()], &[]),
            Ok(Value::tuple([me.clone(), one, Value::tuple([Value::Int(2), Value::Int(3)])]))
        );
        let two = Value::tuple([Value::Int(1)]);
        assert_eq!(
            call(&mm, &[], &[("two", two.clone()), ("one", Value::tuple([]))]),
            Ok(Value::tuple([me, Value::tuple([]), two]))
        );
    }

    #[test]
    fn test_first_feasible_overload_wins() {
        let mut mm: Multimethod<()> = Multimethod::static_method("pick");
        let int_sig = || Signature::builder().param("x", TypeSpec::int()).build().unwrap();
        mm.overload(int_sig(), |_, _, _| Ok(Value::str("first")))
            .overload(int_sig(), |_, _, _| Ok(Value::str("second")))
            .overload(
                Signature::builder().param("x", TypeSpec::Any).build().unwrap(),
                |_, _, _| Ok(Value::str("third")),
            );
        assert_eq!(mm.call(&mut (), None, &[Value::Int(1)], &[]), Ok(Value::str("first")));
        assert_eq!(mm.call(&mut (), None, &[Value::str("s")], &[]), Ok(Value::str("third")));
    }

    #[test]
    fn test_no_match_lists_every_reason() {
        let mm = builtin_types();
        let err = call(&mm, &[Value::str("foo")], &[]).unwrap_err();
        let BridgeError::NoMatchingOverload { reasons } = &err else {
            panic!("unexpected error {err:?}");
        };
        assert_eq!(reasons.len(), mm.overloads().len());
        assert_eq!(reasons[0], "too many arguments");
        assert_eq!(reasons[1], "argument 0 has unexpected type 'int'");
        assert!(err.to_string().contains("overload 5: argument 0 has unexpected type 'float'"));

        let t = || Value::tuple([Value::Int(1)]);
        assert!(call(&mm, &[t(), t(), t()], &[]).is_err());
        assert!(call(&mm, &[Value::tuple([Value::Int(1), Value::Int(2)]), Value::Float(0.1)], &[]).is_err());
    }

    #[test]
    fn test_receiver_injection_by_kind() {
        let mut inst: Multimethod<()> = Multimethod::instance("m");
        inst.overload(Signature::builder().param("d", TypeSpec::dict()).build().unwrap(), echo);
        let d = Value::dict([(Value::Int(1), Value::Int(10))]);
        let bound = inst.call(&mut (), Some(Value::Int(7)), &[d.clone()], &[]).unwrap();
        let unbound = inst.call(&mut (), None, &[Value::Int(7), d.clone()], &[]).unwrap();
        assert_eq!(bound, unbound);
        assert!(inst.call(&mut (), None, &[], &[]).is_err());

        let mut stat: Multimethod<()> = Multimethod::static_method("s");
        stat.overload(Signature::builder().optional("i", TypeSpec::int(), Value::Int(9)).build().unwrap(), echo);
        assert_eq!(
            stat.call(&mut (), Some(Value::Int(7)), &[], &[]),
            Ok(Value::tuple([Value::Int(9)]))
        );
    }

    #[test]
    fn test_custom_type_converted_after_selection() {
        struct Number(f64);
        let number = CustomType::wrapping(
            "Number",
            |v| matches!(v, Value::Int(_) | Value::Float(_)),
            |v| v.extract::<f64>().map(Number),
        );
        let mut mm: Multimethod<()> = Multimethod::static_method("usertypes");
        mm.overload(Signature::empty(), |_, _, _| Ok(Value::None)).overload(
            Signature::builder().param("numb", TypeSpec::mapped(number)).build().unwrap(),
            |_, _, args| {
                let Value::Object(obj) = args.get("numb")? else {
                    return Err(BridgeError::type_mismatch("Number", "other"));
                };
                Ok(Value::Float(obj.downcast_ref::<Number>().map_or(0.0, |n| n.0)))
            },
        );
        assert_eq!(mm.call(&mut (), None, &[Value::Int(10)], &[]), Ok(Value::Float(10.0)));
        assert!(mm.call(&mut (), None, &[Value::str("10")], &[]).is_err());
    }

    #[test]
    fn test_named_types_resolve_at_finalize() {
        let mut mm: Multimethod<()> = Multimethod::static_method("delayed");
        mm.overload(
            Signature::builder().param("i", TypeSpec::named("int")).build().unwrap(),
            |_, _, args| Ok(Value::Int(args.get("i")?.extract::<i64>()? * 2)),
        );
        assert_eq!(mm.call(&mut (), None, &[Value::Int(14)], &[]), Ok(Value::Int(28)));
        mm.finalize(&()).unwrap();
        assert!(mm.is_finalized());
        assert_eq!(mm.call(&mut (), None, &[Value::Int(14)], &[]), Ok(Value::Int(28)));

        let mut broken: Multimethod<()> = Multimethod::static_method("broken");
        broken.overload(
            Signature::builder().param("x", TypeSpec::named("SomeClass")).build().unwrap(),
            echo,
        );
        assert_eq!(broken.finalize(&()), Err(BridgeError::UnknownClass("SomeClass".into())));
    }

    #[test]
    fn test_deprecated_overload_still_runs() {
        let mut mm: Multimethod<()> = Multimethod::static_method("old");
        mm.deprecated_overload(Signature::empty(), "use new() instead", |_, _, _| Ok(Value::Int(1)));
        assert_eq!(mm.overloads()[0].deprecated(), Some("use new() instead"));
        assert_eq!(mm.call(&mut (), None, &[], &[]), Ok(Value::Int(1)));
    }
}
