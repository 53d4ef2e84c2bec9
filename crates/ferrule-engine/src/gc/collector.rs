//! Mark-sweep collector over the proxy arena

use crate::bridge::Bridge;
use ferrule_sdk::{panic_message, ProxyId};
use rustc_hash::FxHashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Collector statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectStats {
    /// Total number of collections
    pub collections: usize,

    /// Total proxies freed
    pub proxies_freed: usize,

    /// Total native destructors run by finalizers
    pub destructors_run: usize,

    /// Total finalizer failures (errors and panics), all swallowed
    pub finalizer_errors: usize,

    /// Proxies marked in last collection
    pub last_marked_count: usize,

    /// Proxies freed in last collection
    pub last_freed_count: usize,

    /// Live proxies after last collection
    pub live_proxies: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct FinalizeOutcome {
    pub(crate) destructor_ran: bool,
    pub(crate) failed: bool,
}

impl Bridge {
    /// Collect every proxy that nothing keeps alive
    ///
    /// Returns the cumulative statistics, including this collection.
    pub fn collect(&mut self) -> CollectStats {
        self.drain_notifications();
        let marked = self.mark();
        let garbage: Vec<ProxyId> = self
            .proxies
            .iter()
            .map(|(id, _)| id)
            .filter(|id| !marked.contains(id))
            .collect();

        let order = self.finalization_order(&garbage);
        let mut freed = 0;
        for id in order {
            let outcome = self.finalize(id);
            freed += 1;
            if outcome.destructor_ran {
                self.stats.destructors_run += 1;
            }
            if outcome.failed {
                self.stats.finalizer_errors += 1;
            }
        }

        self.stats.collections += 1;
        self.stats.proxies_freed += freed;
        self.stats.last_marked_count = marked.len();
        self.stats.last_freed_count = freed;
        self.stats.live_proxies = self.proxies.len();
        tracing::debug!(marked = marked.len(), freed, live = self.proxies.len(), "proxy collection finished");
        self.stats.clone()
    }

    /// Cumulative collector statistics
    pub fn collect_stats(&self) -> &CollectStats {
        &self.stats
    }

    fn mark(&self) -> FxHashSet<ProxyId> {
        let mut stack: Vec<ProxyId> = self
            .proxies
            .iter()
            .filter(|(_, p)| p.host_refs > 0)
            .map(|(id, _)| id)
            .collect();
        self.roots.for_each_proxy(&mut |id| stack.push(id));
        for object in self.handles().borrow().objects() {
            object.for_each_proxy(&mut |id| stack.push(id));
        }

        let mut marked = FxHashSet::default();
        while let Some(id) = stack.pop() {
            let Some(proxy) = self.proxies.get(id) else {
                continue;
            };
            if !marked.insert(id) {
                continue;
            }
            stack.extend(proxy.first_child);
            stack.extend(proxy.next_sibling);
            for value in proxy.keepalive.values() {
                value.for_each_proxy(&mut |kept| stack.push(kept));
            }
        }
        marked
    }

    /// Order `ids` so every parent comes before its children
    pub(crate) fn finalization_order(&self, ids: &[ProxyId]) -> Vec<ProxyId> {
        let set: FxHashSet<ProxyId> = ids.iter().copied().collect();
        let mut seen = FxHashSet::default();
        let mut order = Vec::with_capacity(ids.len());
        for &id in ids {
            if self.parent_of(id).is_some_and(|p| set.contains(&p)) {
                continue;
            }
            let mut stack = vec![id];
            while let Some(cur) = stack.pop() {
                if !seen.insert(cur) {
                    continue;
                }
                order.push(cur);
                let kids = self.children(cur);
                stack.extend(kids.into_iter().rev().filter(|k| set.contains(k)));
            }
        }
        // Links that do not agree with each other can leave stragglers
        order.extend(ids.iter().filter(|id| !seen.contains(id)));
        order
    }

    /// Run a proxy's finalizer and free its slot
    ///
    /// The native destructor runs only for a host-owned proxy whose native
    /// object is still alive. Errors and panics are logged and swallowed.
    pub(crate) fn finalize(&mut self, id: ProxyId) -> FinalizeOutcome {
        let mut outcome = FinalizeOutcome::default();
        let Some(proxy) = self.proxies.get(id) else {
            return outcome;
        };
        let ptr = proxy.native_ptr;
        if let (Some(ptr), true) = (ptr, proxy.owned_by_host()) {
            let dtor = self
                .classes
                .get(proxy.class)
                .and_then(|c| c.ops.destroy.clone());
            if let Some(dtor) = dtor {
                match catch_unwind(AssertUnwindSafe(|| dtor(self, ptr))) {
                    Ok(()) => outcome.destructor_ran = true,
                    Err(payload) => {
                        outcome.failed = true;
                        tracing::debug!(proxy = %id, panic = %panic_message(&*payload), "destructor panicked in finalizer");
                    }
                }
            }
        }
        self.drain_notifications();
        if let Err(e) = self.check_exception() {
            outcome.failed = true;
            tracing::debug!(proxy = %id, error = %e, "native exception raised in finalizer");
        }

        if let Some(ptr) = self.proxies.get(id).and_then(|p| p.native_ptr) {
            self.forget_ptr(ptr);
        }
        self.roots.remove_external(id);
        self.detach_from_parent(id);
        self.detach_children(id);
        if let Some(proxy) = self.proxies.remove(id) {
            if let Some(c) = self.classes.get_mut(proxy.class) {
                c.live_instances.remove(&id);
            }
        }
        tracing::trace!(proxy = %id, "proxy finalized");
        outcome
    }
}

#[cfg(test)]
mod tests {
    use crate::class::ClassBuilder;
    use crate::Bridge;
    use ferrule_sdk::{NativePtr, Value};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn setup() -> (Bridge, ferrule_sdk::ClassId, Rc<RefCell<Vec<usize>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let mut bridge = Bridge::new();
        let c = bridge
            .register_class(ClassBuilder::new("Obj").destructor(move |p| sink.borrow_mut().push(p.addr())))
            .unwrap();
        (bridge, c, log)
    }

    #[test]
    fn test_released_host_owned_proxy_is_destroyed() {
        let (mut bridge, c, log) = setup();
        let obj = bridge.construct(c, |_| Ok(NativePtr::new(0x10))).unwrap();
        bridge.collect();
        assert!(bridge.exists(obj));

        bridge.release(obj).unwrap();
        let stats = bridge.collect();
        assert!(!bridge.exists(obj));
        assert_eq!(*log.borrow(), vec![0x10]);
        assert_eq!(stats.last_freed_count, 1);
        assert_eq!(stats.destructors_run, 1);
        assert_eq!(bridge.proxy_at(NativePtr::new(0x10).unwrap()), None);
    }

    #[test]
    fn test_native_owned_proxy_is_freed_without_dtor() {
        let (mut bridge, c, log) = setup();
        let obj = bridge.obj_from_ptr(NativePtr::new(0x10), c, false).unwrap().unwrap();
        bridge.release(obj).unwrap();
        bridge.collect();
        assert!(!bridge.exists(obj));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_roots_and_keepalive_survive() {
        let (mut bridge, c, _) = setup();
        let pinned = bridge.construct(c, |_| Ok(NativePtr::new(0x10))).unwrap();
        let owner = bridge.construct(c, |_| Ok(NativePtr::new(0x20))).unwrap();
        let kept = bridge.construct(c, |_| Ok(NativePtr::new(0x30))).unwrap();
        bridge.give_ownership(pinned, None, true).unwrap();
        bridge.keep_reference(Value::Proxy(kept), "k", Some(owner)).unwrap();
        for id in [pinned, kept] {
            bridge.release(id).unwrap();
        }
        bridge.collect();
        assert!(bridge.exists(pinned));
        assert!(bridge.exists(kept));

        bridge.release(owner).unwrap();
        bridge.collect();
        assert!(!bridge.exists(owner));
        assert!(!bridge.exists(kept));
        assert!(bridge.exists(pinned));
    }

    #[test]
    fn test_handle_table_keeps_proxy_alive() {
        let (mut bridge, c, _) = setup();
        let obj = bridge.construct(c, |_| Ok(NativePtr::new(0x10))).unwrap();
        let scope = bridge.get_refcounted_handle(&Value::Proxy(obj)).unwrap();
        bridge.release(obj).unwrap();
        bridge.collect();
        assert!(bridge.exists(obj));
        drop(scope);
        bridge.collect();
        assert!(!bridge.exists(obj));
    }

    #[test]
    fn test_collected_instances_leave_the_class() {
        let (mut bridge, c, _) = setup();
        for i in 1..=100 {
            let obj = bridge.construct(c, |_| Ok(NativePtr::new(i * 0x10))).unwrap();
            bridge.release(obj).unwrap();
            bridge.collect();
        }
        assert_eq!(bridge.proxy_count(), 0);
        assert!(bridge.classes().get(c).unwrap().live_instances.is_empty());

        let kept = bridge.construct(c, |_| Ok(NativePtr::new(0x10))).unwrap();
        bridge.collect();
        assert_eq!(bridge.classes().get(c).unwrap().live_instances.len(), 1);
        assert!(bridge.classes().get(c).unwrap().live_instances.contains(&kept));
    }

    #[test]
    fn test_panicking_destructor_is_swallowed() {
        let mut bridge = Bridge::new();
        let c = bridge
            .register_class(ClassBuilder::new("Bad").destructor(|_| panic!("dtor failed")))
            .unwrap();
        let obj = bridge.construct(c, |_| Ok(NativePtr::new(0x10))).unwrap();
        bridge.release(obj).unwrap();
        let stats = bridge.collect();
        assert!(!bridge.exists(obj));
        assert_eq!(stats.finalizer_errors, 1);
    }
}
