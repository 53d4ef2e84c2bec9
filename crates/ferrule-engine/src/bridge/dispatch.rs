//! Virtual dispatch and override management
//!
//! Native glue calls [`Bridge::dispatch_virtual`] from every overridable
//! slot. If the receiving object is a host-created instance whose flag for
//! the slot is set, the call is routed to the host override; otherwise the
//! native implementation runs.
//!
//! Override lookup order, for both directions:
//! 1. the instance's own override
//! 2. the nearest class override up the base chain
//! 3. the native implementation
//! 4. `NotImplemented` for an unoverridden pure virtual

use super::Bridge;
use crate::dispatch::{ArgKind, HostMethod, SlotDecl};
use crate::refcount::HandleScope;
use ferrule_sdk::{
    panic_message, BridgeError, BridgeResult, ClassId, NativePtr, NativeValue, ProxyId, Value,
};
use std::panic::{catch_unwind, AssertUnwindSafe};

impl Bridge {
    fn slot_of(&self, class: ClassId, name: &str) -> BridgeResult<usize> {
        let wrapper = self.class(class)?;
        wrapper
            .vtable
            .slot_by_name(name)
            .ok_or_else(|| BridgeError::NoSuchVirtual {
                class: wrapper.name.clone(),
                method: name.to_string(),
            })
    }

    fn slot_decl(&self, class: ClassId, slot: usize) -> BridgeResult<SlotDecl> {
        let wrapper = self.class(class)?;
        wrapper
            .vtable
            .get(slot)
            .cloned()
            .ok_or_else(|| BridgeError::NoSuchVirtual {
                class: wrapper.name.clone(),
                method: format!("#{}", slot),
            })
    }

    /// Push an instance's flags to the native side
    pub(crate) fn sync_flags(&self, id: ProxyId) {
        let Some(proxy) = self.proxies.get(id) else {
            return;
        };
        let (true, Some(ptr)) = (proxy.created_by_host, proxy.native_ptr) else {
            return;
        };
        if let Some(hook) = self.classes.get(proxy.class).and_then(|c| c.ops.sync_flags.clone()) {
            hook(ptr, &proxy.flags);
        }
    }

    fn resolve_host(&self, id: ProxyId, slot: usize, above: Option<ClassId>) -> Option<HostMethod> {
        let proxy = self.proxies.get(id)?;
        if above.is_none() {
            if let Some(m) = proxy.overrides.get(&slot) {
                return Some(m.clone());
            }
        }
        let chain = self.classes.ancestry(proxy.class);
        let start = match above {
            Some(from) => chain.iter().position(|&c| c == from).map_or(chain.len(), |i| i + 1),
            None => 0,
        };
        chain[start..]
            .iter()
            .find_map(|&c| self.classes.get(c)?.overrides.get(&slot).cloned())
    }

    // ========================================================================
    // Override management
    // ========================================================================

    /// Override a virtual method on one instance
    ///
    /// Host-side calls see the override immediately. Native-side calls only
    /// reach it if the host constructed the instance; a wrapped native
    /// object has no trampoline to route through.
    pub fn set_instance_override(&mut self, id: ProxyId, name: &str, method: HostMethod) -> BridgeResult<()> {
        let slot = self.slot_of(self.proxy(id)?.class, name)?;
        let proxy = self.proxy_mut(id)?;
        proxy.overrides.insert(slot, method);
        if proxy.created_by_host {
            proxy.flags.set(slot);
            self.sync_flags(id);
        }
        Ok(())
    }

    /// Remove an instance override, falling back to the class default
    pub fn clear_instance_override(&mut self, id: ProxyId, name: &str) -> BridgeResult<()> {
        let class = self.proxy(id)?.class;
        let slot = self.slot_of(class, name)?;
        let default = self.class(class)?.default_flags.get(slot);
        let proxy = self.proxy_mut(id)?;
        proxy.overrides.remove(&slot);
        if proxy.created_by_host {
            proxy.flags.assign(slot, default);
            self.sync_flags(id);
        }
        Ok(())
    }

    /// Override a virtual method on a class
    ///
    /// Updates the default flags of the class and its subclasses, and the
    /// flags of every live host-created instance of them.
    pub fn set_class_override(&mut self, class: ClassId, name: &str, method: HostMethod) -> BridgeResult<()> {
        let slot = self.slot_of(class, name)?;
        if let Some(c) = self.classes.get_mut(class) {
            c.overrides.insert(slot, method);
        }
        let affected = self.classes.descendants(class);
        for &d in &affected {
            if let Some(c) = self.classes.get_mut(d) {
                c.default_flags.set(slot);
            }
        }
        self.refresh_instance_flags(&affected, slot);
        Ok(())
    }

    /// Remove a class override
    ///
    /// Defaults fall back to whatever a base class still overrides.
    pub fn clear_class_override(&mut self, class: ClassId, name: &str) -> BridgeResult<()> {
        let slot = self.slot_of(class, name)?;
        if let Some(c) = self.classes.get_mut(class) {
            c.overrides.remove(&slot);
        }
        let affected = self.classes.descendants(class);
        for &d in &affected {
            let on = self.classes.chain_overrides(d, slot);
            if let Some(c) = self.classes.get_mut(d) {
                c.default_flags.assign(slot, on);
            }
        }
        self.refresh_instance_flags(&affected, slot);
        Ok(())
    }

    fn refresh_instance_flags(&mut self, classes: &[ClassId], slot: usize) {
        for &class in classes {
            let Some(c) = self.classes.get_mut(class) else {
                continue;
            };
            let proxies = &self.proxies;
            c.live_instances.retain(|&id| proxies.contains(id));
            let default = c.default_flags.get(slot);
            let instances: Vec<ProxyId> = c.live_instances.iter().copied().collect();
            for id in instances {
                if let Some(p) = self.proxies.get_mut(id) {
                    let on = default || p.overrides.contains_key(&slot);
                    p.flags.assign(slot, on);
                }
                self.sync_flags(id);
            }
        }
    }

    /// Is the slot routed to the host for the object at `ptr`?
    pub fn override_active(&self, ptr: NativePtr, slot: usize) -> bool {
        self.live_proxy_at(ptr)
            .and_then(|id| self.proxies.get(id))
            .is_some_and(|p| p.flags.get(slot))
    }

    // ========================================================================
    // Calls
    // ========================================================================

    /// Call a virtual method from host code
    pub fn call_method(&mut self, id: ProxyId, name: &str, args: &[Value]) -> BridgeResult<Value> {
        let class = self.proxy(id)?.class;
        let slot = self.slot_of(class, name)?;
        match self.resolve_host(id, slot, None) {
            Some(method) => method(self, id, args),
            None => self.call_native_slot(id, class, slot, args),
        }
    }

    /// Call the implementation `from_class`'s base would use
    ///
    /// Instance overrides are skipped and the class search starts strictly
    /// above `from_class`, ending at the native implementation.
    pub fn call_super(
        &mut self,
        id: ProxyId,
        from_class: ClassId,
        name: &str,
        args: &[Value],
    ) -> BridgeResult<Value> {
        let class = self.proxy(id)?.class;
        let slot = self.slot_of(class, name)?;
        match self.resolve_host(id, slot, Some(from_class)) {
            Some(method) => method(self, id, args),
            None => self.call_native_slot(id, class, slot, args),
        }
    }

    fn call_native_slot(&mut self, id: ProxyId, class: ClassId, slot: usize, args: &[Value]) -> BridgeResult<Value> {
        let decl = self.slot_decl(class, slot)?;
        let Some(native) = decl.native.clone() else {
            return Err(BridgeError::NotImplemented {
                class: self.class(class)?.name.clone(),
                method: decl.name,
            });
        };
        let ptr = self.live_ptr(id)?;
        check_arity(&decl, args.len())?;
        let mut scopes = Vec::new();
        let native_args = args
            .iter()
            .zip(&decl.signature.args)
            .map(|(v, kind)| self.to_native(v, kind, Some(&mut scopes)))
            .collect::<BridgeResult<Vec<_>>>()?;

        let result = self.run_native(|bridge| native(bridge, ptr, &native_args));
        drop(scopes);
        let word = result?;
        let mut temps = Vec::new();
        self.to_host(word, &decl.signature.ret, &mut temps)
    }

    fn run_native<F>(&mut self, f: F) -> BridgeResult<NativeValue>
    where
        F: FnOnce(&mut Bridge) -> BridgeResult<NativeValue>,
    {
        let result = catch_unwind(AssertUnwindSafe(|| f(self)))
            .unwrap_or_else(|payload| Err(BridgeError::Panic(panic_message(&*payload))));
        self.drain_notifications();
        self.check_exception()?;
        result
    }

    /// The virtual-dispatch trampoline
    ///
    /// `class` is the class whose vtable the native glue belongs to; it is
    /// used when `ptr` has no proxy. Arguments and the result are
    /// marshalled per the slot's signature.
    pub fn dispatch_virtual(
        &mut self,
        class: ClassId,
        ptr: NativePtr,
        slot: usize,
        args: &[NativeValue],
    ) -> BridgeResult<NativeValue> {
        self.drain_notifications();
        let receiver = self.live_proxy_at(ptr);
        let vt_class = receiver
            .and_then(|id| self.proxies.get(id))
            .map_or(class, |p| p.class);
        let decl = self.slot_decl(vt_class, slot)?;
        check_arity(&decl, args.len())?;

        let routed = receiver
            .filter(|&id| self.proxies.get(id).is_some_and(|p| p.flags.get(slot)))
            .and_then(|id| self.resolve_host(id, slot, None).map(|m| (id, m)));
        if let Some((id, method)) = routed {
            tracing::trace!(proxy = %id, slot = %decl.name, "virtual call routed to host");
            let mut temps = Vec::new();
            let host_args = args
                .iter()
                .zip(&decl.signature.args)
                .map(|(&v, kind)| self.to_host(v, kind, &mut temps))
                .collect::<BridgeResult<Vec<_>>>();
            let result = host_args.and_then(|host_args| {
                catch_unwind(AssertUnwindSafe(|| method(self, id, &host_args)))
                    .unwrap_or_else(|payload| Err(BridgeError::Panic(panic_message(&*payload))))
            });
            for t in temps {
                if self.release(t).is_err() {
                    tracing::trace!(proxy = %t, "temporary argument collected during call");
                }
            }
            let value = result?;
            return self.to_native(&value, &decl.signature.ret, None);
        }

        let Some(native) = decl.native.clone() else {
            return Err(BridgeError::NotImplemented {
                class: self.class(vt_class)?.name.clone(),
                method: decl.name,
            });
        };
        self.run_native(|bridge| native(bridge, ptr, args))
    }

    // ========================================================================
    // Marshalling
    // ========================================================================

    /// Native word to host value
    ///
    /// Objects are wrapped through `obj_from_ptr`; the host reference that
    /// takes is recorded in `temps` for the caller to release.
    fn to_host(&mut self, word: NativeValue, kind: &ArgKind, temps: &mut Vec<ProxyId>) -> BridgeResult<Value> {
        let mismatch = || BridgeError::type_mismatch(kind.to_string(), format!("{:?}", word));
        match kind {
            ArgKind::Void => Ok(Value::None),
            ArgKind::Bool => word.as_bool().map(Value::Bool).ok_or_else(mismatch),
            ArgKind::Int => word.as_i64().map(Value::Int).ok_or_else(mismatch),
            ArgKind::Float => word
                .as_f64()
                .or_else(|| word.as_i64().map(|i| i as f64))
                .map(Value::Float)
                .ok_or_else(mismatch),
            ArgKind::Handle => {
                if word.is_null() {
                    return Ok(Value::None);
                }
                let handle = word.as_handle().ok_or_else(mismatch)?;
                self.from_handle(handle)
            }
            ArgKind::Object(name) => {
                let ptr = word.as_ptr().ok_or_else(mismatch)?;
                let class = self.class_by_name(name)?;
                match self.obj_from_ptr(ptr, class, false)? {
                    Some(id) => {
                        temps.push(id);
                        Ok(Value::Proxy(id))
                    }
                    None => Ok(Value::None),
                }
            }
        }
    }

    /// Host value to native word
    ///
    /// With `scopes`, handles are held for the duration of the call;
    /// without, the native side receives a reference of its own.
    fn to_native(
        &mut self,
        value: &Value,
        kind: &ArgKind,
        scopes: Option<&mut Vec<HandleScope>>,
    ) -> BridgeResult<NativeValue> {
        let mismatch = || BridgeError::type_mismatch(kind.to_string(), value.kind().name());
        match (kind, value) {
            (ArgKind::Void, _) => Ok(NativeValue::null()),
            (ArgKind::Bool, Value::Bool(b)) => Ok(NativeValue::bool(*b)),
            (ArgKind::Int, Value::Int(i)) => Ok(match i32::try_from(*i) {
                Ok(small) => NativeValue::i32(small),
                Err(_) => NativeValue::i64(*i),
            }),
            (ArgKind::Int, Value::Bool(b)) => Ok(NativeValue::i32(*b as i32)),
            (ArgKind::Float, Value::Float(f)) => Ok(NativeValue::f64(*f)),
            (ArgKind::Float, Value::Int(i)) => Ok(NativeValue::f64(*i as f64)),
            (ArgKind::Handle, Value::None) => Ok(NativeValue::null()),
            (ArgKind::Handle, v) => match scopes {
                Some(scopes) => {
                    let scope = self.get_refcounted_handle(v)?;
                    let word = NativeValue::handle(scope.handle());
                    scopes.push(scope);
                    Ok(word)
                }
                None => {
                    let handle = self.handles().borrow_mut().acquire(v)?;
                    Ok(NativeValue::handle(handle))
                }
            },
            (ArgKind::Object(_), Value::None) => Ok(NativeValue::null()),
            (ArgKind::Object(name), Value::Proxy(id)) => {
                let class = self.class_by_name(name)?;
                if !self.is_instance(*id, class) {
                    return Err(mismatch());
                }
                Ok(NativeValue::ptr(Some(self.live_ptr(*id)?)))
            }
            _ => Err(mismatch()),
        }
    }
}

fn check_arity(decl: &SlotDecl, got: usize) -> BridgeResult<()> {
    let want = decl.signature.args.len();
    if want == got {
        Ok(())
    } else {
        Err(BridgeError::type_mismatch(
            format!("{} argument(s) for {}", want, decl.name),
            format!("{}", got),
        ))
    }
}

#[cfg(test)]
mod tests {
    use crate::class::ClassBuilder;
    use crate::dispatch::{host_method, native_method, ArgKind, SlotSignature};
    use crate::Bridge;
    use ferrule_sdk::{BridgeError, ClassId, NativePtr, NativeValue, Value, ValueExt};

    fn int_to_int() -> SlotSignature {
        SlotSignature::new([ArgKind::Int], ArgKind::Int)
    }

    /// `virtual_meth(i)` returns `i` natively
    fn setup() -> (Bridge, ClassId) {
        let mut bridge = Bridge::new();
        let class = bridge
            .register_class(ClassBuilder::new("Widget").virtual_method(
                "virtual_meth",
                int_to_int(),
                native_method(|_, _, args| Ok(args[0])),
            ))
            .unwrap();
        (bridge, class)
    }

    fn call_natively(bridge: &mut Bridge, class: ClassId, addr: usize, i: i32) -> i64 {
        bridge
            .dispatch_virtual(class, NativePtr::new(addr).unwrap(), 0, &[NativeValue::i32(i)])
            .unwrap()
            .as_i64()
            .unwrap()
    }

    #[test]
    fn test_instance_override_round_trip() {
        let (mut bridge, class) = setup();
        let obj = bridge.construct(class, |_| Ok(NativePtr::new(0x10))).unwrap();
        assert_eq!(call_natively(&mut bridge, class, 0x10, 10), 10);

        bridge
            .set_instance_override(
                obj,
                "virtual_meth",
                host_method(|_, _, args| Ok(Value::Int(-args[0].extract::<i64>()?))),
            )
            .unwrap();
        assert!(bridge.override_active(NativePtr::new(0x10).unwrap(), 0));
        assert_eq!(call_natively(&mut bridge, class, 0x10, 10), -10);

        bridge.clear_instance_override(obj, "virtual_meth").unwrap();
        assert_eq!(call_natively(&mut bridge, class, 0x10, 10), 10);
    }

    #[test]
    fn test_override_on_wrapped_object_is_host_only() {
        let (mut bridge, class) = setup();
        let obj = bridge
            .obj_from_ptr(NativePtr::new(0x20), class, false)
            .unwrap()
            .unwrap();
        bridge
            .set_instance_override(obj, "virtual_meth", host_method(|_, _, _| Ok(Value::Int(-1))))
            .unwrap();
        assert_eq!(call_natively(&mut bridge, class, 0x20, 10), 10);
        assert_eq!(bridge.call_method(obj, "virtual_meth", &[Value::Int(10)]), Ok(Value::Int(-1)));
    }

    #[test]
    fn test_class_override_reaches_live_instances() {
        let (mut bridge, class) = setup();
        let sub = bridge.register_class(ClassBuilder::new("Sub").base(class)).unwrap();
        let before = bridge.construct(sub, |_| Ok(NativePtr::new(0x30))).unwrap();
        bridge
            .set_class_override(class, "virtual_meth", host_method(|_, _, _| Ok(Value::Int(7))))
            .unwrap();
        assert!(bridge.proxy(before).unwrap().flags().get(0));
        assert_eq!(call_natively(&mut bridge, sub, 0x30, 1), 7);

        let after = bridge.construct(sub, |_| Ok(NativePtr::new(0x40))).unwrap();
        assert!(bridge.proxy(after).unwrap().flags().get(0));

        bridge.clear_class_override(class, "virtual_meth").unwrap();
        assert_eq!(call_natively(&mut bridge, sub, 0x30, 1), 1);
        assert_eq!(call_natively(&mut bridge, sub, 0x40, 2), 2);
    }

    #[test]
    fn test_instance_beats_class_override() {
        let (mut bridge, class) = setup();
        let obj = bridge.construct(class, |_| Ok(NativePtr::new(0x50))).unwrap();
        bridge
            .set_class_override(class, "virtual_meth", host_method(|_, _, _| Ok(Value::Int(20))))
            .unwrap();
        bridge
            .set_instance_override(obj, "virtual_meth", host_method(|_, _, _| Ok(Value::Int(-10))))
            .unwrap();
        assert_eq!(call_natively(&mut bridge, class, 0x50, 10), -10);
    }

    #[test]
    fn test_call_super_skips_own_override() {
        let (mut bridge, class) = setup();
        let sub = bridge
            .register_class(ClassBuilder::new("Sub").base(class).override_method(
                "virtual_meth",
                host_method(move |bridge, this, args| {
                    let sub = bridge.class_by_name("Sub")?;
                    let base = bridge.call_super(this, sub, "virtual_meth", args)?;
                    Ok(Value::Int(base.extract::<i64>()? * 2))
                }),
            ))
            .unwrap();
        let obj = bridge.construct(sub, |_| Ok(NativePtr::new(0x60))).unwrap();
        assert_eq!(call_natively(&mut bridge, sub, 0x60, 21), 42);
        assert_eq!(bridge.call_method(obj, "virtual_meth", &[Value::Int(5)]), Ok(Value::Int(10)));
    }

    #[test]
    fn test_pure_virtual_without_override() {
        let mut bridge = Bridge::new();
        let class = bridge
            .register_class(ClassBuilder::new("Shape").pure_virtual("area", SlotSignature::new([], ArgKind::Float)))
            .unwrap();
        let err = bridge
            .dispatch_virtual(class, NativePtr::new(0x70).unwrap(), 0, &[])
            .unwrap_err();
        assert_eq!(
            err,
            BridgeError::NotImplemented {
                class: "Shape".into(),
                method: "area".into()
            }
        );
    }

    #[test]
    fn test_object_arguments_are_wrapped() {
        let mut bridge = Bridge::new();
        let class = bridge
            .register_class(ClassBuilder::new("Node").virtual_method(
                "adopt",
                SlotSignature::new([ArgKind::Object("Node".into())], ArgKind::Bool),
                native_method(|_, _, _| Ok(NativeValue::bool(false))),
            ))
            .unwrap();
        let obj = bridge.construct(class, |_| Ok(NativePtr::new(0x80))).unwrap();
        bridge
            .set_instance_override(
                obj,
                "adopt",
                host_method(|bridge, _, args| {
                    let other = args[0].as_proxy().expect("proxy argument");
                    Ok(Value::Bool(bridge.get_ptr(other)?.map(|p| p.addr()) == Some(0x90)))
                }),
            )
            .unwrap();
        let out = bridge
            .dispatch_virtual(
                class,
                NativePtr::new(0x80).unwrap(),
                0,
                &[NativeValue::ptr(NativePtr::new(0x90))],
            )
            .unwrap();
        assert_eq!(out.as_bool(), Some(true));
        // The temporary wrapper holds no host reference after the call
        let tmp = bridge.proxy_at(NativePtr::new(0x90).unwrap()).unwrap();
        assert_eq!(bridge.proxy(tmp).unwrap().host_refs(), 0);
    }

    #[test]
    fn test_native_exception_surfaces() {
        let mut bridge = Bridge::new();
        let class = bridge
            .register_class(ClassBuilder::new("Failing").virtual_method(
                "run",
                SlotSignature::new([], ArgKind::Void),
                native_method(|bridge, _, _| {
                    bridge.exceptions().set_pending(Some("ValueError"), Some("bad input"));
                    Ok(NativeValue::null())
                }),
            ))
            .unwrap();
        let err = bridge
            .dispatch_virtual(class, NativePtr::new(0xa0).unwrap(), 0, &[])
            .unwrap_err();
        assert_eq!(err.to_string(), "ValueError: bad input");
    }

    #[test]
    fn test_panicking_override_becomes_error() {
        let mut bridge = Bridge::new();
        let class = bridge
            .register_class(
                ClassBuilder::new("Widget")
                    .virtual_method("virtual_meth", int_to_int(), native_method(|_, _, args| Ok(args[0])))
                    .override_method("virtual_meth", host_method(|_, _, _| panic!("override blew up"))),
            )
            .unwrap();
        bridge.construct(class, |_| Ok(NativePtr::new(0xb0))).unwrap();
        let err = bridge
            .dispatch_virtual(class, NativePtr::new(0xb0).unwrap(), 0, &[NativeValue::i32(1)])
            .unwrap_err();
        assert_eq!(err, BridgeError::Panic("override blew up".into()));
        // The bridge is still usable afterwards
        assert_eq!(call_natively(&mut bridge, class, 0xc0, 3), 3);
    }
}
