//! Wrapper classes
//!
//! A [`WrapperClass`] is the host-side description of a native class: its
//! place in the inheritance tree, its virtual slots, the native hooks the
//! bridge calls (destructor, RTTI name, flag sync) and the host overrides
//! declared on the class itself. Classes are defined through a
//! [`ClassBuilder`] and stored in the [`ClassRegistry`].

mod description;
mod registry;

pub use description::{ClassDescription, NativeBindings, PolicyDescription, SlotDescription};
pub use registry::ClassRegistry;

use crate::bridge::Bridge;
use crate::dispatch::{HostMethod, NativeMethod, OverrideFlags, SlotDecl, VTable};
use ferrule_sdk::{ClassId, NativePtr, ProxyId};
use rustc_hash::{FxHashMap, FxHashSet};
use std::rc::Rc;

/// Native destructor of a class
///
/// Receives the bridge so native code it calls may re-enter it.
pub type Destructor = Rc<dyn Fn(&mut Bridge, NativePtr)>;

/// Native RTTI hook: the most-derived native class name of an object
pub type TypeNameHook = Rc<dyn Fn(NativePtr) -> Option<String>>;

/// Pushes an instance's override flags to the native side
pub type FlagSync = Rc<dyn Fn(NativePtr, &OverrideFlags)>;

/// Native entry points the bridge calls for a class
///
/// Hooks left unset are inherited from the base class.
#[derive(Clone, Default)]
pub struct NativeOps {
    /// Destroys a native object the host owns
    pub destroy: Option<Destructor>,
    /// Most-derived native type name
    pub type_name: Option<TypeNameHook>,
    /// Override-flag sync for host-created instances
    pub sync_flags: Option<FlagSync>,
}

impl NativeOps {
    fn inherit(&mut self, base: &NativeOps) {
        if self.destroy.is_none() {
            self.destroy = base.destroy.clone();
        }
        if self.type_name.is_none() {
            self.type_name = base.type_name.clone();
        }
        if self.sync_flags.is_none() {
            self.sync_flags = base.sync_flags.clone();
        }
    }
}

/// Whether a class and its subclasses may be instantiated from the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InstantiationPolicy {
    /// Follow the base class
    #[default]
    Inherit,
    /// Neither this class nor its subclasses can be instantiated, unless a
    /// subclass is marked `ConcreteSubclass`
    Abstract,
    /// Re-enables instantiation below an `Abstract` class
    ConcreteSubclass,
    /// Wraps a native abstract class: the class itself cannot be
    /// instantiated, subclasses can once every pure slot is overridden
    PureVirtualAbstract,
}

/// Runtime metadata of a wrapper class
pub struct WrapperClass {
    pub(crate) id: ClassId,
    pub(crate) name: String,
    pub(crate) cpp_name: Option<String>,
    pub(crate) base: Option<ClassId>,
    pub(crate) policy: InstantiationPolicy,
    pub(crate) ops: NativeOps,
    /// Offsets of base-class sub-objects, inherited ones included
    pub(crate) base_offsets: Vec<isize>,
    pub(crate) vtable: Rc<VTable>,
    /// Host overrides declared on this class, by slot
    pub(crate) overrides: FxHashMap<usize, HostMethod>,
    /// Flags copied into each instance the host constructs
    pub(crate) default_flags: OverrideFlags,
    /// Weak set of host-constructed instances
    pub(crate) live_instances: FxHashSet<ProxyId>,
    pub(crate) subclasses: Vec<ClassId>,
}

impl WrapperClass {
    /// Class id
    pub fn id(&self) -> ClassId {
        self.id
    }

    /// Host-side name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registered native class name
    pub fn cpp_name(&self) -> Option<&str> {
        self.cpp_name.as_deref()
    }

    /// Base class
    pub fn base(&self) -> Option<ClassId> {
        self.base
    }

    /// Instantiation policy marker
    pub fn policy(&self) -> InstantiationPolicy {
        self.policy
    }

    /// Virtual slots
    pub fn vtable(&self) -> &Rc<VTable> {
        &self.vtable
    }

    /// Default override flags for new instances
    pub fn default_flags(&self) -> &OverrideFlags {
        &self.default_flags
    }

    /// Base-class sub-object offsets
    pub fn base_offsets(&self) -> &[isize] {
        &self.base_offsets
    }

    /// Does this class itself declare a host override for `slot`?
    pub fn overrides_slot(&self, slot: usize) -> bool {
        self.overrides.contains_key(&slot)
    }
}

impl std::fmt::Debug for WrapperClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WrapperClass")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("cpp_name", &self.cpp_name)
            .field("base", &self.base)
            .field("policy", &self.policy)
            .field("slots", &self.vtable.len())
            .finish()
    }
}

/// Definition of a wrapper class, consumed by `Bridge::register_class`
pub struct ClassBuilder {
    pub(crate) name: String,
    pub(crate) cpp_name: Option<String>,
    pub(crate) base: Option<ClassId>,
    pub(crate) policy: InstantiationPolicy,
    pub(crate) ops: NativeOps,
    pub(crate) base_offsets: Vec<isize>,
    pub(crate) slots: Vec<SlotDecl>,
    pub(crate) overrides: Vec<(String, HostMethod)>,
}

impl ClassBuilder {
    /// Start a class definition
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cpp_name: None,
            base: None,
            policy: InstantiationPolicy::Inherit,
            ops: NativeOps::default(),
            base_offsets: Vec::new(),
            slots: Vec::new(),
            overrides: Vec::new(),
        }
    }

    /// Derive from `base`
    pub fn base(mut self, base: ClassId) -> Self {
        self.base = Some(base);
        self
    }

    /// Register the class under its native name for RTTI lookups
    pub fn cpp_name(mut self, name: impl Into<String>) -> Self {
        self.cpp_name = Some(name.into());
        self
    }

    /// Set the instantiation policy marker
    pub fn policy(mut self, policy: InstantiationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Native destructor
    pub fn destructor(mut self, destroy: impl Fn(NativePtr) + 'static) -> Self {
        self.ops.destroy = Some(Rc::new(move |_: &mut Bridge, ptr: NativePtr| destroy(ptr)));
        self
    }

    /// Native RTTI hook
    pub fn type_name(mut self, hook: impl Fn(NativePtr) -> Option<String> + 'static) -> Self {
        self.ops.type_name = Some(Rc::new(hook));
        self
    }

    /// Native override-flag sync hook
    pub fn sync_flags(mut self, hook: impl Fn(NativePtr, &OverrideFlags) + 'static) -> Self {
        self.ops.sync_flags = Some(Rc::new(hook));
        self
    }

    /// Replace all native hooks at once
    pub fn native_ops(mut self, ops: NativeOps) -> Self {
        self.ops = ops;
        self
    }

    /// Offset of a base-class sub-object inside instances
    pub fn base_offset(mut self, offset: isize) -> Self {
        self.base_offsets.push(offset);
        self
    }

    /// Append a virtual slot with a native implementation
    pub fn virtual_method(
        mut self,
        name: impl Into<String>,
        signature: crate::dispatch::SlotSignature,
        native: NativeMethod,
    ) -> Self {
        self.slots.push(SlotDecl::new(name, signature, native));
        self
    }

    /// Append a pure virtual slot
    pub fn pure_virtual(
        mut self,
        name: impl Into<String>,
        signature: crate::dispatch::SlotSignature,
    ) -> Self {
        self.slots.push(SlotDecl::pure(name, signature));
        self
    }

    /// Append a prepared slot
    pub fn slot(mut self, slot: SlotDecl) -> Self {
        self.slots.push(slot);
        self
    }

    /// Host override declared in the class body
    pub fn override_method(mut self, name: impl Into<String>, method: HostMethod) -> Self {
        self.overrides.push((name.into(), method));
        self
    }
}
