//! The bridge context
//!
//! [`Bridge`] owns every piece of bridge state: the proxy arena, the
//! identity registry, the class registry, the root set, the refcount table
//! and the pending-exception slot. All operations are methods on it; the
//! C entry points in `ferrule-ffi` reach it through a thread-local install.
//!
//! Operations are split by concern:
//! - `identity`: `obj_from_ptr`, `remember_ptr`, `forget_ptr`
//! - `ownership`: construction, `take_ownership`, `give_ownership`,
//!   `keep_reference`, explicit destruction
//! - `tree`: parent/child links
//! - `dispatch`: virtual dispatch and override management
//! - `annotations`: ownership annotations applied by generated glue
//! - collection lives in [`crate::gc`]

mod annotations;
mod dispatch;
mod identity;
mod ownership;
mod tree;

pub use annotations::OwnershipAnnotation;

use crate::class::{ClassBuilder, ClassDescription, ClassRegistry, NativeBindings, WrapperClass};
use crate::exceptions::ExceptionRegistry;
use crate::gc::{CollectStats, RootSet};
use crate::identity::IdentityMap;
use crate::notify::DestroyNotifier;
use crate::options::BridgeOptions;
use crate::proxy::{Proxy, ProxyArena};
use crate::refcount::{HandleScope, RefcountTable, SharedRefcounts};
use ferrule_sdk::{BridgeError, BridgeResult, ClassId, NativePtr, ProxyId, Value};
use std::rc::Rc;

/// Runtime bridge between host code and a native object model
pub struct Bridge {
    options: BridgeOptions,
    pub(crate) proxies: ProxyArena,
    pub(crate) identity: IdentityMap,
    pub(crate) classes: ClassRegistry,
    pub(crate) roots: RootSet,
    handles: SharedRefcounts,
    exceptions: Rc<ExceptionRegistry>,
    notifier: DestroyNotifier,
    pub(crate) stats: CollectStats,
    disposed: bool,
}

impl Bridge {
    /// Create a bridge with default options
    pub fn new() -> Self {
        Self::with_options(BridgeOptions::default())
    }

    /// Create a bridge with the given options
    pub fn with_options(options: BridgeOptions) -> Self {
        Self {
            proxies: ProxyArena::with_capacity(options.proxy_capacity),
            identity: IdentityMap::new(),
            classes: ClassRegistry::new(),
            roots: RootSet::new(),
            handles: RefcountTable::shared(),
            exceptions: Rc::new(ExceptionRegistry::new()),
            notifier: DestroyNotifier::new(),
            stats: CollectStats::default(),
            disposed: false,
            options,
        }
    }

    /// Active options
    pub fn options(&self) -> &BridgeOptions {
        &self.options
    }

    // ========================================================================
    // Classes
    // ========================================================================

    /// Define a wrapper class
    pub fn register_class(&mut self, builder: ClassBuilder) -> BridgeResult<ClassId> {
        let name = builder.name.clone();
        let id = self.classes.define(builder)?;
        tracing::debug!(class = %name, id = id.0, "registered wrapper class");
        Ok(id)
    }

    /// Define a wrapper class from a generated description
    pub fn register_description(
        &mut self,
        description: ClassDescription,
        natives: NativeBindings,
    ) -> BridgeResult<ClassId> {
        let builder = description.into_builder(&self.classes, natives)?;
        self.register_class(builder)
    }

    /// Bind a native class name to a wrapper class
    pub fn register_cpp_classname(&mut self, name: &str, class: ClassId) -> BridgeResult<()> {
        self.classes.register_cpp_classname(name, class)
    }

    /// Class registry
    pub fn classes(&self) -> &ClassRegistry {
        &self.classes
    }

    /// Class by id
    pub fn class(&self, id: ClassId) -> BridgeResult<&WrapperClass> {
        self.classes
            .get(id)
            .ok_or_else(|| BridgeError::UnknownClass(id.to_string()))
    }

    /// Class id by host name
    pub fn class_by_name(&self, name: &str) -> BridgeResult<ClassId> {
        self.classes
            .by_name(name)
            .ok_or_else(|| BridgeError::UnknownClass(name.to_string()))
    }

    // ========================================================================
    // Proxies
    // ========================================================================

    /// Live proxy by id
    pub fn proxy(&self, id: ProxyId) -> BridgeResult<&Proxy> {
        self.proxies.get(id).ok_or(BridgeError::StaleProxy(id))
    }

    pub(crate) fn proxy_mut(&mut self, id: ProxyId) -> BridgeResult<&mut Proxy> {
        self.proxies.get_mut(id).ok_or(BridgeError::StaleProxy(id))
    }

    /// Does the proxy still wrap a native object?
    ///
    /// False once the native object is destroyed and for collected proxies.
    pub fn is_alive(&self, id: ProxyId) -> bool {
        self.proxies.get(id).is_some_and(|p| p.native_ptr.is_some())
    }

    /// Has the proxy not been collected yet?
    pub fn exists(&self, id: ProxyId) -> bool {
        self.proxies.contains(id)
    }

    /// Number of live proxies
    pub fn proxy_count(&self) -> usize {
        self.proxies.len()
    }

    /// Native address behind a proxy; `None` once the object is gone
    pub fn get_ptr(&self, id: ProxyId) -> BridgeResult<Option<NativePtr>> {
        Ok(self.proxy(id)?.native_ptr)
    }

    pub(crate) fn live_ptr(&self, id: ProxyId) -> BridgeResult<NativePtr> {
        self.proxy(id)?.native_ptr.ok_or(BridgeError::DeadObject(id))
    }

    /// Is `id` an instance of `class` or one of its subclasses?
    pub fn is_instance(&self, id: ProxyId, class: ClassId) -> bool {
        self.proxies
            .get(id)
            .is_some_and(|p| self.classes.is_subclass(p.class, class))
    }

    /// Take a host reference
    pub fn retain(&mut self, id: ProxyId) -> BridgeResult<()> {
        let proxy = self.proxy_mut(id)?;
        proxy.host_refs += 1;
        Ok(())
    }

    /// Drop a host reference
    ///
    /// The proxy becomes collectable once nothing else keeps it alive; see
    /// [`Bridge::collect`].
    pub fn release(&mut self, id: ProxyId) -> BridgeResult<()> {
        let proxy = self.proxy_mut(id)?;
        proxy.host_refs = proxy.host_refs.saturating_sub(1);
        Ok(())
    }

    /// Keep-alive entry of a proxy
    pub fn kept_reference(&self, owner: ProxyId, key: &str) -> Option<&Value> {
        self.proxies.get(owner)?.keepalive.get(key)
    }

    /// Is the proxy pinned by a native-side reference?
    pub fn is_rooted(&self, id: ProxyId) -> bool {
        self.roots.contains(id)
    }

    // ========================================================================
    // Destruction notices, exceptions, handles
    // ========================================================================

    /// Sender native destructors use to report destroyed objects
    pub fn notifier(&self) -> DestroyNotifier {
        self.notifier.clone()
    }

    /// Process a destruction notice now
    pub fn notify_destroyed(&mut self, ptr: NativePtr) {
        self.notifier.notify(ptr);
        self.drain_notifications();
    }

    /// Process every queued destruction notice
    pub fn drain_notifications(&mut self) {
        while let Some(ptr) = self.notifier.pop() {
            self.handle_destroyed(ptr);
        }
    }

    fn handle_destroyed(&mut self, ptr: NativePtr) {
        let Some(id) = self.live_proxy_at(ptr) else {
            tracing::debug!(ptr = %ptr, "destroyed object has no proxy");
            return;
        };
        self.forget_ptr(ptr);
        self.detach_from_parent(id);
        if let Some(proxy) = self.proxies.get_mut(id) {
            proxy.native_ptr = None;
            proxy.ownership = crate::proxy::Ownership::NativeOwned;
        }
        tracing::debug!(ptr = %ptr, proxy = %id, "native object destroyed");
    }

    /// Shared pending-exception registry
    pub fn exceptions(&self) -> Rc<ExceptionRegistry> {
        Rc::clone(&self.exceptions)
    }

    /// Make a native exception name surface under its own name
    pub fn register_exception(&self, name: impl Into<String>) {
        self.exceptions.register_exception(name);
    }

    /// Raise the exception native code left pending, if any
    pub fn check_exception(&self) -> BridgeResult<()> {
        self.exceptions.check()
    }

    /// Shared refcount table
    pub fn handles(&self) -> SharedRefcounts {
        Rc::clone(&self.handles)
    }

    /// Scoped handle to `object` for passing to native code
    pub fn get_refcounted_handle(&self, object: &Value) -> BridgeResult<HandleScope> {
        HandleScope::new(&self.handles, object)
    }

    /// Adjust the count of a handle native code holds
    pub fn adjust_refcount(&self, handle: usize, delta: i64) -> BridgeResult<i64> {
        self.handles.borrow_mut().adjust_refcount(handle, delta)
    }

    /// Object behind a handle token
    pub fn from_handle(&self, handle: usize) -> BridgeResult<Value> {
        self.handles
            .borrow()
            .from_handle(handle)
            .ok_or(BridgeError::InvalidHandle(handle))
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Tear the bridge down
    ///
    /// With `finalize_on_dispose`, every live proxy is finalized top-down
    /// first. Failures during teardown are logged and otherwise ignored.
    pub fn dispose(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.drain_notifications();
        let live = self.proxies.len();
        if self.options.finalize_on_dispose {
            let order = self.finalization_order(&self.proxies.ids());
            for id in order {
                self.finalize(id);
            }
        }
        self.proxies = ProxyArena::with_capacity(0);
        self.identity.clear();
        self.roots.clear();
        match self.handles.try_borrow_mut() {
            Ok(mut table) => table.clear(),
            Err(_) => tracing::warn!("refcount table busy during dispose"),
        }
        tracing::debug!(proxies = live, "bridge disposed");
    }
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.teardown();
    }
}
