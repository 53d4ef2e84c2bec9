//! GC root tracking
//!
//! This module manages the root set for proxy collection.
//! Roots are starting points for GC traversal and include:
//! - Proxies whose native object holds a reference to them
//! - Objects kept alive forever by `keep_reference` without an owner

use ferrule_sdk::{ProxyId, Value};
use rustc_hash::FxHashSet;

/// Root set for proxy collection
///
/// The root set contains all values that are directly accessible
/// from native code and should not be collected, even if no host code
/// references them.
#[derive(Default)]
pub struct RootSet {
    /// Proxies pinned by a native-side reference
    external: FxHashSet<ProxyId>,

    /// Values kept alive for the lifetime of the bridge
    forever: Vec<Value>,
}

impl RootSet {
    /// Create a new root set
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin a proxy
    pub fn add_external(&mut self, id: ProxyId) {
        self.external.insert(id);
    }

    /// Unpin a proxy; returns whether it was pinned
    pub fn remove_external(&mut self, id: ProxyId) -> bool {
        self.external.remove(&id)
    }

    /// Is the proxy pinned?
    pub fn contains(&self, id: ProxyId) -> bool {
        self.external.contains(&id)
    }

    /// Keep a value alive until the bridge is disposed
    pub fn keep_forever(&mut self, value: Value) {
        self.forever.push(value);
    }

    /// Visit every rooted proxy, including those inside kept values
    pub fn for_each_proxy(&self, f: &mut impl FnMut(ProxyId)) {
        for &id in &self.external {
            f(id);
        }
        for value in &self.forever {
            value.for_each_proxy(f);
        }
    }

    /// Get total number of roots
    pub fn len(&self) -> usize {
        self.external.len() + self.forever.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every root
    pub fn clear(&mut self) {
        self.external.clear();
        self.forever.clear();
    }
}
