//! Parent/child ownership tree
//!
//! A parent references only the head of its child list; siblings are
//! doubly linked. Attaching inserts at the head, detaching unlinks in
//! O(1). The links are proxy ids, so they never keep anything alive by
//! themselves: the collector treats parent→first-child and
//! sibling→next-sibling as strong edges and the rest as weak.

use super::Bridge;
use ferrule_sdk::{BridgeError, BridgeResult, ProxyId};

impl Bridge {
    /// Children of `id`, head first
    pub fn children(&self, id: ProxyId) -> Vec<ProxyId> {
        let mut out = Vec::new();
        let mut cur = self.proxies.get(id).and_then(|p| p.first_child);
        while let Some(c) = cur {
            out.push(c);
            cur = self.proxies.get(c).and_then(|p| p.next_sibling);
        }
        out
    }

    /// Parent of `id`, if it is attached to a live parent
    pub fn parent_of(&self, id: ProxyId) -> Option<ProxyId> {
        self.proxies
            .get(id)
            .and_then(|p| p.parent)
            .filter(|&p| self.proxies.contains(p))
    }

    /// Would making `parent` the parent of `child` create a cycle?
    fn is_ancestor_or_self(&self, candidate: ProxyId, of: ProxyId) -> bool {
        let mut cur = Some(of);
        while let Some(id) = cur {
            if id == candidate {
                return true;
            }
            cur = self.parent_of(id);
        }
        false
    }

    /// Insert `child` at the head of `parent`'s child list
    ///
    /// `child` must already be detached.
    pub(crate) fn attach_to_parent(&mut self, child: ProxyId, parent: ProxyId) -> BridgeResult<()> {
        self.proxy(child)?;
        if self.is_ancestor_or_self(child, parent) {
            return Err(BridgeError::OwnershipCycle { child, parent });
        }
        let head = self.proxy(parent)?.first_child;
        if let Some(h) = head.and_then(|h| self.proxies.get_mut(h)) {
            h.prev_sibling = Some(child);
        }
        let c = self.proxy_mut(child)?;
        c.parent = Some(parent);
        c.prev_sibling = None;
        c.next_sibling = head;
        self.proxy_mut(parent)?.first_child = Some(child);
        Ok(())
    }

    /// Unlink `child` from its parent's child list
    ///
    /// A parent that has already been collected, or sibling links that do
    /// not agree with each other, are tolerated and leave the list alone.
    pub(crate) fn detach_from_parent(&mut self, child: ProxyId) {
        let Some(c) = self.proxies.get(child) else {
            return;
        };
        let (Some(parent), prev, next) = (c.parent, c.prev_sibling, c.next_sibling) else {
            return;
        };
        let Some(head) = self.proxies.get(parent).map(|p| p.first_child) else {
            tracing::debug!(child = %child, parent = %parent, "detach from collected parent");
            if let Some(c) = self.proxies.get_mut(child) {
                c.parent = None;
            }
            return;
        };

        if head == Some(child) {
            if let Some(p) = self.proxies.get_mut(parent) {
                p.first_child = next;
            }
            if let Some(n) = next.and_then(|n| self.proxies.get_mut(n)) {
                n.prev_sibling = None;
            }
        } else if let Some(prev) = prev {
            if let Some(p) = self.proxies.get_mut(prev) {
                p.next_sibling = next;
            }
            if let Some(n) = next.and_then(|n| self.proxies.get_mut(n)) {
                n.prev_sibling = Some(prev);
            }
        } else if next.is_none() {
            // Orphaned by `detach_children` with the parent link kept
            tracing::debug!(child = %child, parent = %parent, "detach orphan from former parent");
        } else {
            tracing::warn!(child = %child, parent = %parent, "inconsistent sibling links, child left attached");
            return;
        }

        if let Some(c) = self.proxies.get_mut(child) {
            c.parent = None;
            c.prev_sibling = None;
            c.next_sibling = None;
        }
    }

    /// Empty `id`'s child list, orphaning every child
    ///
    /// Children are not destroyed; they merely lose their owner.
    pub(crate) fn detach_children(&mut self, id: ProxyId) {
        let clear_parent = self.options.clear_orphan_parent_links;
        let mut cur = self.proxies.get_mut(id).and_then(|p| p.first_child.take());
        while let Some(c) = cur {
            let Some(child) = self.proxies.get_mut(c) else {
                break;
            };
            cur = child.next_sibling.take();
            child.prev_sibling = None;
            if clear_parent {
                child.parent = None;
            }
        }
    }

    /// Hand `old`'s tree position and children over to `new`
    pub(crate) fn transplant(&mut self, old: ProxyId, new: ProxyId) {
        let parent = self.parent_of(old);
        self.detach_from_parent(old);
        if let Some(parent) = parent {
            if let Err(e) = self.attach_to_parent(new, parent) {
                tracing::warn!(error = %e, "could not move replacement proxy under old parent");
            }
        }
        let children = self.children(old);
        for &c in &children {
            if let Some(child) = self.proxies.get_mut(c) {
                child.parent = Some(new);
            }
        }
        let head = children.first().copied();
        if let Some(o) = self.proxies.get_mut(old) {
            o.first_child = None;
        }
        if let Some(n) = self.proxies.get_mut(new) {
            n.first_child = head;
        }
    }
}
