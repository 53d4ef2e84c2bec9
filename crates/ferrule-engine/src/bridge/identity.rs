//! Pointer to proxy resolution

use super::Bridge;
use crate::proxy::{Ownership, Proxy};
use ferrule_sdk::{BridgeResult, ClassId, NativePtr, ProxyId};

impl Bridge {
    pub(crate) fn live_proxy_at(&self, ptr: NativePtr) -> Option<ProxyId> {
        self.identity
            .lookup(ptr)
            .filter(|&id| self.proxies.contains(id))
    }

    /// Proxy registered at `ptr` (or at one of its base-class aliases),
    /// without taking a host reference
    pub fn proxy_at(&self, ptr: NativePtr) -> Option<ProxyId> {
        self.live_proxy_at(ptr)
    }

    /// Return the unique proxy for a native pointer, wrapping it if needed
    ///
    /// The returned proxy carries one new host reference, which the caller
    /// gives back with [`Bridge::release`]. A null pointer yields `None`.
    ///
    /// If the address is registered to a proxy of an unrelated class, the
    /// old object is assumed destroyed: a new proxy takes over the address,
    /// the old one's place in the ownership tree and its children.
    pub fn obj_from_ptr(
        &mut self,
        ptr: Option<NativePtr>,
        expected: ClassId,
        is_new: bool,
    ) -> BridgeResult<Option<ProxyId>> {
        self.drain_notifications();
        let Some(ptr) = ptr else {
            return Ok(None);
        };
        self.class(expected)?;
        let class = self.resolve_runtime_class(ptr, expected);

        let existing = self.live_proxy_at(ptr);
        if let Some(id) = existing {
            if self.is_instance(id, class) {
                self.retain(id)?;
                return Ok(Some(id));
            }
        }

        let ownership = if is_new {
            Ownership::HostOwned
        } else {
            Ownership::NativeOwned
        };
        let id = self.proxies.insert(Proxy::new(class, ptr, ownership));
        if let Some(stale) = existing {
            self.supersede(stale, id);
        }
        self.register_at(id, ptr);
        tracing::trace!(ptr = %ptr, proxy = %id, class = class.0, "wrapped native pointer");
        Ok(Some(id))
    }

    /// Most-derived registered class of the object at `ptr`
    ///
    /// Uses the class's RTTI hook. Unknown names, and names of classes that
    /// are not subclasses of `expected`, fall back to `expected`.
    pub(crate) fn resolve_runtime_class(&self, ptr: NativePtr, expected: ClassId) -> ClassId {
        let Some(hook) = self
            .classes
            .get(expected)
            .and_then(|c| c.ops.type_name.clone())
        else {
            return expected;
        };
        let Some(name) = hook(ptr) else {
            return expected;
        };
        match self.classes.class_from_cpp_name(&name) {
            Some(found) if self.classes.is_subclass(found, expected) => found,
            Some(_) => expected,
            None => {
                tracing::debug!(type_name = %name, "no wrapper registered for native type");
                expected
            }
        }
    }

    pub(crate) fn supersede(&mut self, stale: ProxyId, replacement: ProxyId) {
        tracing::debug!(old = %stale, new = %replacement, "address reused by a new native object");
        if let Some(ptr) = self.proxies.get(stale).and_then(|p| p.native_ptr) {
            let offsets = self.offsets_of(stale);
            self.identity.remove(ptr, &offsets, stale);
        }
        self.roots.remove_external(stale);
        self.transplant(stale, replacement);
        if let Some(old) = self.proxies.get_mut(stale) {
            old.native_ptr = None;
            old.ownership = Ownership::NativeOwned;
        }
    }

    /// Register `id` at `ptr` and its base-class aliases
    ///
    /// With `external_ref`, the proxy is also pinned in the root set until
    /// native code releases it.
    pub fn remember_ptr(&mut self, id: ProxyId, ptr: NativePtr, external_ref: bool) -> BridgeResult<()> {
        let proxy = self.proxy_mut(id)?;
        if proxy.native_ptr.is_none() {
            proxy.native_ptr = Some(ptr);
        }
        self.register_at(id, ptr);
        if external_ref {
            self.roots.add_external(id);
        }
        Ok(())
    }

    fn register_at(&mut self, id: ProxyId, ptr: NativePtr) {
        let offsets = self.offsets_of(id);
        self.identity.insert(ptr, &offsets, id);
    }

    pub(crate) fn offsets_of(&self, id: ProxyId) -> Vec<isize> {
        self.proxies
            .get(id)
            .and_then(|p| self.classes.get(p.class))
            .map(|c| c.base_offsets.clone())
            .unwrap_or_default()
    }

    /// Unregister whatever proxy lives at `ptr`
    ///
    /// Removes the address and its aliases from the registry, unpins the
    /// proxy and orphans its children. Unknown addresses are ignored.
    pub fn forget_ptr(&mut self, ptr: NativePtr) {
        let Some(id) = self.live_proxy_at(ptr) else {
            return;
        };
        let primary = self.identity.primary(ptr).unwrap_or(ptr);
        let offsets = self.offsets_of(id);
        self.identity.remove(primary, &offsets, id);
        self.roots.remove_external(id);
        self.detach_children(id);
    }
}
