//! Native address to proxy map
//!
//! Each registered proxy is reachable from its primary address and from the
//! address of every base-class sub-object that sits at a non-zero offset.
//! Entries hold `ProxyId`s, which are weak: a lookup that lands on a freed
//! proxy is treated as a miss by the caller.

use ferrule_sdk::{NativePtr, ProxyId};
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Copy)]
struct Entry {
    proxy: ProxyId,
    primary: NativePtr,
}

/// Address-keyed weak map of proxies
#[derive(Default)]
pub struct IdentityMap {
    entries: FxHashMap<NativePtr, Entry>,
}

impl IdentityMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Proxy registered at `ptr` (primary address or alias)
    #[inline]
    pub fn lookup(&self, ptr: NativePtr) -> Option<ProxyId> {
        self.entries.get(&ptr).map(|e| e.proxy)
    }

    /// Primary address of whatever is registered at `ptr`
    pub fn primary(&self, ptr: NativePtr) -> Option<NativePtr> {
        self.entries.get(&ptr).map(|e| e.primary)
    }

    /// Register `proxy` at `ptr` and at each non-zero base offset
    ///
    /// Existing entries at those addresses are replaced.
    pub fn insert(&mut self, ptr: NativePtr, offsets: &[isize], proxy: ProxyId) {
        let entry = Entry {
            proxy,
            primary: ptr,
        };
        self.entries.insert(ptr, entry);
        for alias in aliases(ptr, offsets) {
            self.entries.insert(alias, entry);
        }
    }

    /// Remove the entries for `ptr` and its aliases that still name `proxy`
    ///
    /// Returns how many entries were removed. Entries that now belong to a
    /// different proxy (the address was reused) are left alone.
    pub fn remove(&mut self, ptr: NativePtr, offsets: &[isize], proxy: ProxyId) -> usize {
        let mut removed = 0;
        for addr in std::iter::once(ptr).chain(aliases(ptr, offsets)) {
            if self.entries.get(&addr).is_some_and(|e| e.proxy == proxy) {
                self.entries.remove(&addr);
                removed += 1;
            }
        }
        removed
    }

    /// Number of entries, aliases included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

fn aliases(ptr: NativePtr, offsets: &[isize]) -> impl Iterator<Item = NativePtr> + '_ {
    offsets
        .iter()
        .filter(|&&off| off != 0)
        .filter_map(move |&off| ptr.offset(off))
}
