//! Construction, ownership transfer and explicit destruction

use super::Bridge;
use crate::proxy::{Ownership, Proxy};
use ferrule_sdk::{panic_message, BridgeError, BridgeResult, ClassId, NativePtr, ProxyId, Value};
use std::panic::{catch_unwind, AssertUnwindSafe};

impl Bridge {
    /// Construct a native object from host code
    ///
    /// Checks the class's instantiation policy, runs the native constructor
    /// and wraps the result in a host-owned proxy whose override flags start
    /// from the class defaults. The returned id carries one host reference.
    pub fn construct<F>(&mut self, class: ClassId, ctor: F) -> BridgeResult<ProxyId>
    where
        F: FnOnce(&mut Bridge) -> BridgeResult<Option<NativePtr>>,
    {
        self.classes.check_instantiable(class)?;
        let result = catch_unwind(AssertUnwindSafe(|| ctor(self)));
        self.drain_notifications();
        self.check_exception()?;
        let ptr = match result {
            Ok(r) => r?.ok_or(BridgeError::NullPointer)?,
            Err(payload) => return Err(BridgeError::Panic(panic_message(&*payload))),
        };

        let existing = self.live_proxy_at(ptr);
        let wrapper = self.class(class)?;
        let mut proxy = Proxy::new(class, ptr, Ownership::HostOwned);
        proxy.created_by_host = true;
        proxy.flags = wrapper.default_flags.clone();
        let id = self.proxies.insert(proxy);
        if let Some(stale) = existing {
            self.supersede(stale, id);
        }
        self.remember_ptr(id, ptr, false)?;
        if let Some(c) = self.classes.get_mut(class) {
            c.live_instances.insert(id);
        }
        self.sync_flags(id);
        tracing::debug!(class = class.0, ptr = %ptr, proxy = %id, "constructed native object");
        Ok(id)
    }

    /// Make host code responsible for destroying the native object
    ///
    /// Idempotent. Unpins the proxy and detaches it from any parent.
    pub fn take_ownership(&mut self, id: ProxyId) -> BridgeResult<()> {
        self.proxy_mut(id)?.ownership = Ownership::HostOwned;
        self.roots.remove_external(id);
        self.detach_from_parent(id);
        Ok(())
    }

    /// Hand responsibility for the native object to native code
    ///
    /// With a parent, the proxy becomes the parent's child and lives as
    /// long as the parent does. Without a parent, `external_ref` pins it
    /// in the root set until native code releases it. Idempotent for
    /// identical arguments.
    pub fn give_ownership(
        &mut self,
        id: ProxyId,
        parent: Option<ProxyId>,
        external_ref: bool,
    ) -> BridgeResult<()> {
        self.proxy(id)?;
        if let Some(p) = parent {
            self.proxy(p)?;
        }
        self.detach_from_parent(id);
        let pinned = external_ref && parent.is_none();
        self.proxy_mut(id)?.ownership = if pinned {
            Ownership::NativeOwnedWithExternalRef
        } else {
            Ownership::NativeOwned
        };
        match parent {
            Some(p) => {
                self.roots.remove_external(id);
                self.attach_to_parent(id, p)?;
            }
            None if pinned => self.roots.add_external(id),
            None => {
                self.roots.remove_external(id);
            }
        }
        Ok(())
    }

    /// Keep `object` alive on behalf of native code
    ///
    /// With an owner the object lives as long as the owner's proxy, stored
    /// under `key` (a second call with the same key replaces the first).
    /// Without an owner it lives until the bridge is disposed.
    pub fn keep_reference(&mut self, object: Value, key: &str, owner: Option<ProxyId>) -> BridgeResult<()> {
        match owner {
            Some(owner) => {
                self.proxy_mut(owner)?.keepalive.insert(key.to_string(), object);
            }
            None => self.roots.keep_forever(object),
        }
        Ok(())
    }

    /// Explicitly delete the native object behind a proxy
    ///
    /// Runs the native destructor only if the host owns the object and it
    /// is still alive, then unregisters the pointer. The proxy itself stays
    /// in the arena, dead, until collected.
    pub fn destroy(&mut self, id: ProxyId) -> BridgeResult<()> {
        let proxy = self.proxy(id)?;
        let Some(ptr) = proxy.native_ptr else {
            return Ok(());
        };
        if proxy.owned_by_host() {
            let dtor = self.class(proxy.class)?.ops.destroy.clone();
            if let Some(dtor) = dtor {
                catch_unwind(AssertUnwindSafe(|| dtor(self, ptr)))
                    .map_err(|payload| BridgeError::Panic(panic_message(&*payload)))?;
            }
        }
        self.forget_ptr(ptr);
        self.detach_from_parent(id);
        if let Some(p) = self.proxies.get_mut(id) {
            p.native_ptr = None;
            p.ownership = Ownership::NativeOwned;
        }
        self.drain_notifications();
        self.check_exception()
    }
}

#[cfg(test)]
mod tests {
    use crate::class::{ClassBuilder, InstantiationPolicy};
    use crate::proxy::Ownership;
    use crate::{Bridge, BridgeOptions};
    use ferrule_sdk::{BridgeError, NativePtr, ProxyId, Value};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn new_at(addr: usize) -> impl FnOnce(&mut Bridge) -> ferrule_sdk::BridgeResult<Option<NativePtr>> {
        move |_| Ok(NativePtr::new(addr))
    }

    fn bridge_with_node() -> (Bridge, ferrule_sdk::ClassId, Rc<RefCell<Vec<usize>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let mut bridge = Bridge::new();
        let node = bridge
            .register_class(ClassBuilder::new("Node").destructor(move |p| sink.borrow_mut().push(p.addr())))
            .unwrap();
        (bridge, node, log)
    }

    #[test]
    fn test_construct_is_host_owned() {
        let (mut bridge, node, _) = bridge_with_node();
        let obj = bridge.construct(node, new_at(0x10)).unwrap();
        let p = bridge.proxy(obj).unwrap();
        assert!(p.created_by_host());
        assert!(p.owned_by_host());
        assert_eq!(bridge.proxy_at(NativePtr::new(0x10).unwrap()), Some(obj));
    }

    #[test]
    fn test_construct_null_and_abstract() {
        let (mut bridge, node, _) = bridge_with_node();
        assert_eq!(bridge.construct(node, |_| Ok(None)), Err(BridgeError::NullPointer));
        let abs = bridge
            .register_class(ClassBuilder::new("Abs").policy(InstantiationPolicy::Abstract))
            .unwrap();
        let called = Rc::new(RefCell::new(false));
        let flag = Rc::clone(&called);
        let err = bridge
            .construct(abs, move |_| {
                *flag.borrow_mut() = true;
                Ok(NativePtr::new(0x20))
            })
            .unwrap_err();
        assert!(matches!(err, BridgeError::Construction { .. }));
        assert!(!*called.borrow());
    }

    #[test]
    fn test_constructor_panic_becomes_error() {
        let (mut bridge, node, _) = bridge_with_node();
        let err = bridge.construct(node, |_| panic!("ctor blew up")).unwrap_err();
        assert_eq!(err, BridgeError::Panic("ctor blew up".into()));
    }

    #[test]
    fn test_ownership_transfers_are_idempotent() {
        let (mut bridge, node, _) = bridge_with_node();
        let parent = bridge.construct(node, new_at(0x10)).unwrap();
        let child = bridge.construct(node, new_at(0x20)).unwrap();

        bridge.give_ownership(child, Some(parent), false).unwrap();
        bridge.give_ownership(child, Some(parent), false).unwrap();
        assert_eq!(bridge.children(parent), vec![child]);
        assert_eq!(bridge.proxy(child).unwrap().ownership(), Ownership::NativeOwned);

        bridge.take_ownership(child).unwrap();
        bridge.take_ownership(child).unwrap();
        assert!(bridge.children(parent).is_empty());
        assert!(bridge.proxy(child).unwrap().owned_by_host());
    }

    #[test]
    fn test_external_ref_pins_without_parent() {
        let (mut bridge, node, _) = bridge_with_node();
        let parent = bridge.construct(node, new_at(0x10)).unwrap();
        let obj = bridge.construct(node, new_at(0x20)).unwrap();
        bridge.give_ownership(obj, None, true).unwrap();
        assert!(bridge.is_rooted(obj));
        assert_eq!(
            bridge.proxy(obj).unwrap().ownership(),
            Ownership::NativeOwnedWithExternalRef
        );
        // A parent takes over from the root set
        bridge.give_ownership(obj, Some(parent), true).unwrap();
        assert!(!bridge.is_rooted(obj));
        assert_eq!(bridge.proxy(obj).unwrap().ownership(), Ownership::NativeOwned);
    }

    #[test]
    fn test_keep_reference_per_owner() {
        let (mut bridge, node, _) = bridge_with_node();
        let owner = bridge.construct(node, new_at(0x10)).unwrap();
        bridge.keep_reference(Value::Int(1), "cb", Some(owner)).unwrap();
        bridge.keep_reference(Value::Int(2), "cb", Some(owner)).unwrap();
        assert_eq!(bridge.kept_reference(owner, "cb"), Some(&Value::Int(2)));
        let stale = ProxyId::new(99, 0);
        assert_eq!(
            bridge.keep_reference(Value::None, "cb", Some(stale)),
            Err(BridgeError::StaleProxy(stale))
        );
    }

    #[test]
    fn test_destroy_runs_dtor_only_when_host_owned() {
        let (mut bridge, node, log) = bridge_with_node();
        let owned = bridge.construct(node, new_at(0x10)).unwrap();
        let lent = bridge.construct(node, new_at(0x20)).unwrap();
        bridge.give_ownership(lent, None, false).unwrap();

        bridge.destroy(owned).unwrap();
        bridge.destroy(lent).unwrap();
        assert_eq!(*log.borrow(), vec![0x10]);
        assert!(!bridge.is_alive(owned));
        assert!(!bridge.is_alive(lent));

        // Already dead: nothing to do
        bridge.destroy(owned).unwrap();
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn test_keep_reference_without_owner_outlives_host_refs() {
        let (mut bridge, node, log) = bridge_with_node();
        let obj = bridge.construct(node, new_at(0x10)).unwrap();
        bridge.keep_reference(Value::Proxy(obj), "app", None).unwrap();
        bridge.release(obj).unwrap();
        bridge.collect();
        bridge.collect();
        assert!(bridge.exists(obj));
        assert!(bridge.is_alive(obj));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_orphans_can_keep_parent_link() {
        let mut bridge = Bridge::with_options(BridgeOptions::default().with_clear_orphan_parent_links(false));
        let node = bridge.register_class(ClassBuilder::new("Node")).unwrap();
        let parent = bridge.construct(node, new_at(0x10)).unwrap();
        let a = bridge.construct(node, new_at(0x20)).unwrap();
        let b = bridge.construct(node, new_at(0x30)).unwrap();
        bridge.give_ownership(a, Some(parent), false).unwrap();
        bridge.give_ownership(b, Some(parent), false).unwrap();

        bridge.forget_ptr(NativePtr::new(0x10).unwrap());
        assert!(bridge.children(parent).is_empty());
        for child in [a, b] {
            let p = bridge.proxy(child).unwrap();
            assert_eq!(p.parent(), Some(parent));
            assert_eq!(p.next_sibling(), None);
            assert_eq!(p.prev_sibling(), None);
        }

        let adopter = bridge.construct(node, new_at(0x40)).unwrap();
        bridge.give_ownership(a, Some(adopter), false).unwrap();
        assert_eq!(bridge.children(adopter), vec![a]);
        assert_eq!(bridge.parent_of(a), Some(adopter));
        bridge.take_ownership(b).unwrap();
        assert_eq!(bridge.proxy(b).unwrap().parent(), None);
    }
}
