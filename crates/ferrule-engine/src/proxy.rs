//! Proxy records and the generational arena that owns them
//!
//! Every host-side stand-in for a native object is a [`Proxy`] stored in a
//! [`ProxyArena`] slot. Other structures only ever hold [`ProxyId`]s, so a
//! reference from the identity registry, a parent link or a sibling link is
//! weak: once the slot is freed its generation moves on and old ids miss.
//!
//! What keeps a proxy alive is decided by the collector (`gc` module):
//! outstanding host references, the root set, keep-alive maps, the
//! refcount table and parent-to-child links.

use crate::dispatch::{HostMethod, OverrideFlags};
use ferrule_sdk::{ClassId, NativePtr, ProxyId, Value};
use rustc_hash::FxHashMap;

/// Who is responsible for destroying the native object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ownership {
    /// The proxy destroys the native object when it is finalized
    HostOwned,
    /// Native code owns the object; finalizing the proxy never destroys it
    NativeOwned,
    /// Native code owns the object and holds a reference to the proxy,
    /// which is therefore pinned in the root set
    NativeOwnedWithExternalRef,
}

impl Ownership {
    /// True only for `HostOwned`
    #[inline]
    pub fn owned_by_host(self) -> bool {
        matches!(self, Ownership::HostOwned)
    }
}

/// Host-side stand-in for a native object
pub struct Proxy {
    pub(crate) class: ClassId,
    pub(crate) native_ptr: Option<NativePtr>,
    pub(crate) ownership: Ownership,
    pub(crate) created_by_host: bool,

    // Parent/child tree: parent link, head of the child list, siblings
    pub(crate) parent: Option<ProxyId>,
    pub(crate) first_child: Option<ProxyId>,
    pub(crate) next_sibling: Option<ProxyId>,
    pub(crate) prev_sibling: Option<ProxyId>,

    /// References held by host code (retain/release)
    pub(crate) host_refs: u32,

    pub(crate) flags: OverrideFlags,
    pub(crate) overrides: FxHashMap<usize, HostMethod>,
    pub(crate) keepalive: FxHashMap<String, Value>,
}

impl Proxy {
    pub(crate) fn new(class: ClassId, native_ptr: NativePtr, ownership: Ownership) -> Self {
        Self {
            class,
            native_ptr: Some(native_ptr),
            ownership,
            created_by_host: false,
            parent: None,
            first_child: None,
            next_sibling: None,
            prev_sibling: None,
            host_refs: 1,
            flags: OverrideFlags::new(),
            overrides: FxHashMap::default(),
            keepalive: FxHashMap::default(),
        }
    }

    /// Wrapper class of the proxy
    pub fn class(&self) -> ClassId {
        self.class
    }

    /// Native address, `None` once the native object is gone
    pub fn native_ptr(&self) -> Option<NativePtr> {
        self.native_ptr
    }

    /// Current ownership state
    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    /// Whether finalizing this proxy destroys the native object
    pub fn owned_by_host(&self) -> bool {
        self.ownership.owned_by_host()
    }

    /// Whether host code constructed the object (as opposed to wrapping a
    /// pointer that native code handed over)
    pub fn created_by_host(&self) -> bool {
        self.created_by_host
    }

    /// Parent proxy in the ownership tree
    pub fn parent(&self) -> Option<ProxyId> {
        self.parent
    }

    /// Head of the child list
    pub fn first_child(&self) -> Option<ProxyId> {
        self.first_child
    }

    /// Next sibling in the parent's child list
    pub fn next_sibling(&self) -> Option<ProxyId> {
        self.next_sibling
    }

    /// Previous sibling in the parent's child list
    pub fn prev_sibling(&self) -> Option<ProxyId> {
        self.prev_sibling
    }

    /// Outstanding host references
    pub fn host_refs(&self) -> u32 {
        self.host_refs
    }

    /// Per-instance override flags
    pub fn flags(&self) -> &OverrideFlags {
        &self.flags
    }
}

struct Slot {
    generation: u32,
    proxy: Option<Proxy>,
}

/// Generational slot arena of proxies
pub struct ProxyArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl ProxyArena {
    /// Create an arena with room for `capacity` proxies
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            live: 0,
        }
    }

    /// Store a proxy and mint its id
    pub fn insert(&mut self, proxy: Proxy) -> ProxyId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.proxy = Some(proxy);
            return ProxyId::new(index, slot.generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            proxy: Some(proxy),
        });
        ProxyId::new(index, 0)
    }

    /// Look up a live proxy
    #[inline]
    pub fn get(&self, id: ProxyId) -> Option<&Proxy> {
        self.slots
            .get(id.index())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.proxy.as_ref())
    }

    /// Look up a live proxy mutably
    #[inline]
    pub fn get_mut(&mut self, id: ProxyId) -> Option<&mut Proxy> {
        self.slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.proxy.as_mut())
    }

    /// Does `id` still name a live proxy?
    #[inline]
    pub fn contains(&self, id: ProxyId) -> bool {
        self.get(id).is_some()
    }

    /// Free the slot, invalidating every copy of `id`
    pub fn remove(&mut self, id: ProxyId) -> Option<Proxy> {
        let slot = self
            .slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation())?;
        let proxy = slot.proxy.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index() as u32);
        self.live -= 1;
        Some(proxy)
    }

    /// Ids of all live proxies, in slot order
    pub fn ids(&self) -> Vec<ProxyId> {
        self.iter().map(|(id, _)| id).collect()
    }

    /// Iterate live proxies
    pub fn iter(&self) -> impl Iterator<Item = (ProxyId, &Proxy)> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.proxy
                .as_ref()
                .map(|p| (ProxyId::new(i as u32, slot.generation), p))
        })
    }

    /// Number of live proxies
    pub fn len(&self) -> usize {
        self.live
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proxy(addr: usize) -> Proxy {
        Proxy::new(ClassId(0), NativePtr::new(addr).unwrap(), Ownership::NativeOwned)
    }

    #[test]
    fn test_removed_ids_go_stale() {
        let mut arena = ProxyArena::with_capacity(4);
        let a = arena.insert(proxy(0x10));
        assert!(arena.contains(a));
        assert!(arena.remove(a).is_some());
        assert!(!arena.contains(a));
        assert!(arena.remove(a).is_none());

        // The slot is reused under a new generation
        let b = arena.insert(proxy(0x20));
        assert_eq!(a.index(), b.index());
        assert_ne!(a, b);
        assert!(arena.get(a).is_none());
        assert_eq!(arena.get(b).unwrap().native_ptr().unwrap().addr(), 0x20);
    }

    #[test]
    fn test_len_tracks_live_proxies() {
        let mut arena = ProxyArena::with_capacity(0);
        let ids: Vec<_> = (1..=3).map(|i| arena.insert(proxy(i * 8))).collect();
        assert_eq!(arena.len(), 3);
        arena.remove(ids[1]);
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.ids(), vec![ids[0], ids[2]]);
    }

    #[test]
    fn test_ownership_owned_by_host() {
        assert!(Ownership::HostOwned.owned_by_host());
        assert!(!Ownership::NativeOwned.owned_by_host());
        assert!(!Ownership::NativeOwnedWithExternalRef.owned_by_host());
    }
}
