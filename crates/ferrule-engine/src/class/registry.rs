//! Class registry for wrapper class metadata

use super::{ClassBuilder, InstantiationPolicy, WrapperClass};
use crate::dispatch::VTable;
use ferrule_sdk::{BridgeError, BridgeResult, ClassId};
use rustc_hash::{FxHashMap, FxHashSet};
use std::rc::Rc;

/// Registry of wrapper classes
#[derive(Default)]
pub struct ClassRegistry {
    /// Classes indexed by ID
    classes: Vec<WrapperClass>,
    /// Host class name to ID mapping
    name_to_id: FxHashMap<String, ClassId>,
    /// Native class name to ID mapping
    cpp_names: FxHashMap<String, ClassId>,
}

impl ClassRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a builder against its base class and register it
    pub fn define(&mut self, builder: ClassBuilder) -> BridgeResult<ClassId> {
        if self.name_to_id.contains_key(&builder.name) {
            return Err(BridgeError::DuplicateClass(builder.name));
        }
        // Native-name collisions must fail before anything is registered
        if let Some(&existing) = builder.cpp_name.as_ref().and_then(|cpp| self.cpp_names.get(cpp)) {
            return Err(BridgeError::ClassNameCollision {
                name: builder.cpp_name.clone().unwrap_or_default(),
                existing: self.classes[existing.0].name.clone(),
                new: builder.name,
            });
        }
        let id = ClassId(self.classes.len());
        let base = match builder.base {
            Some(b) => Some(self.get(b).ok_or_else(|| BridgeError::UnknownClass(b.to_string()))?),
            None => None,
        };

        let mut ops = builder.ops;
        let mut base_offsets = Vec::new();
        let mut default_flags = Default::default();
        let vtable = match base {
            Some(base) => {
                ops.inherit(&base.ops);
                base_offsets.extend_from_slice(&base.base_offsets);
                default_flags = base.default_flags.clone();
                if builder.slots.is_empty() {
                    Rc::clone(&base.vtable)
                } else {
                    let mut vt = VTable::extending(&base.vtable);
                    for slot in builder.slots {
                        vt.add_slot(slot);
                    }
                    Rc::new(vt)
                }
            }
            None => {
                let mut vt = VTable::new();
                for slot in builder.slots {
                    vt.add_slot(slot);
                }
                Rc::new(vt)
            }
        };
        for off in builder.base_offsets {
            if !base_offsets.contains(&off) {
                base_offsets.push(off);
            }
        }

        let mut overrides = FxHashMap::default();
        for (name, method) in builder.overrides {
            let slot = vtable
                .slot_by_name(&name)
                .ok_or_else(|| BridgeError::NoSuchVirtual {
                    class: builder.name.clone(),
                    method: name.clone(),
                })?;
            default_flags.set(slot);
            overrides.insert(slot, method);
        }

        let class = WrapperClass {
            id,
            name: builder.name.clone(),
            cpp_name: None,
            base: builder.base,
            policy: builder.policy,
            ops,
            base_offsets,
            vtable,
            overrides,
            default_flags,
            live_instances: FxHashSet::default(),
            subclasses: Vec::new(),
        };
        self.classes.push(class);
        self.name_to_id.insert(builder.name, id);
        if let Some(b) = builder.base {
            self.classes[b.0].subclasses.push(id);
        }
        if let Some(cpp) = builder.cpp_name {
            self.register_cpp_classname(&cpp, id)?;
        }
        Ok(id)
    }

    /// Bind a native class name to a wrapper class
    ///
    /// Re-registering the same pair is a no-op; binding a name that already
    /// belongs to another class fails and names both classes.
    pub fn register_cpp_classname(&mut self, name: &str, class: ClassId) -> BridgeResult<()> {
        if self.get(class).is_none() {
            return Err(BridgeError::UnknownClass(class.to_string()));
        }
        match self.cpp_names.get(name) {
            Some(&existing) if existing == class => Ok(()),
            Some(&existing) => Err(BridgeError::ClassNameCollision {
                name: name.to_string(),
                existing: self.classes[existing.0].name.clone(),
                new: self.classes[class.0].name.clone(),
            }),
            None => {
                self.cpp_names.insert(name.to_string(), class);
                self.classes[class.0].cpp_name = Some(name.to_string());
                Ok(())
            }
        }
    }

    /// Wrapper class registered for a native class name
    pub fn class_from_cpp_name(&self, name: &str) -> Option<ClassId> {
        self.cpp_names.get(name).copied()
    }

    /// Get class by ID
    pub fn get(&self, id: ClassId) -> Option<&WrapperClass> {
        self.classes.get(id.0)
    }

    /// Get mutable class by ID
    pub fn get_mut(&mut self, id: ClassId) -> Option<&mut WrapperClass> {
        self.classes.get_mut(id.0)
    }

    /// Get class ID by host name
    pub fn by_name(&self, name: &str) -> Option<ClassId> {
        self.name_to_id.get(name).copied()
    }

    /// `id` followed by each of its base classes
    pub fn ancestry(&self, id: ClassId) -> Vec<ClassId> {
        let mut chain = Vec::new();
        let mut cur = Some(id);
        while let Some(c) = cur {
            let Some(class) = self.get(c) else { break };
            chain.push(c);
            cur = class.base;
        }
        chain
    }

    /// `id` and every class derived from it, breadth first
    pub fn descendants(&self, id: ClassId) -> Vec<ClassId> {
        let mut out = vec![id];
        let mut i = 0;
        while i < out.len() {
            if let Some(class) = self.get(out[i]) {
                out.extend_from_slice(&class.subclasses);
            }
            i += 1;
        }
        out
    }

    /// Is `class` equal to or derived from `base`?
    pub fn is_subclass(&self, class: ClassId, base: ClassId) -> bool {
        self.ancestry(class).contains(&base)
    }

    /// Does any class from `id` up the chain override `slot`?
    pub fn chain_overrides(&self, id: ClassId, slot: usize) -> bool {
        self.ancestry(id)
            .into_iter()
            .any(|c| self.classes[c.0].overrides_slot(slot))
    }

    /// Refuse instantiation of abstract classes and of classes that leave
    /// a pure virtual slot without a host override
    pub fn check_instantiable(&self, id: ClassId) -> BridgeResult<()> {
        let class = self
            .get(id)
            .ok_or_else(|| BridgeError::UnknownClass(id.to_string()))?;
        for c in self.ancestry(id) {
            match self.classes[c.0].policy {
                InstantiationPolicy::ConcreteSubclass => break,
                InstantiationPolicy::Abstract => {
                    return Err(BridgeError::construction(
                        &class.name,
                        "cannot be instantiated or sub-classed",
                    ));
                }
                InstantiationPolicy::PureVirtualAbstract if c == id => {
                    return Err(BridgeError::construction(
                        &class.name,
                        "represents a C++ abstract class and cannot be instantiated",
                    ));
                }
                _ => {}
            }
        }
        for (slot, decl) in class.vtable.iter() {
            if decl.is_pure() && !self.chain_overrides(id, slot) {
                return Err(BridgeError::construction(
                    &class.name,
                    format!(
                        "represents a C++ abstract class and cannot be instantiated: pure virtual method '{}' has no override",
                        decl.name
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Get next available class ID
    pub fn next_class_id(&self) -> ClassId {
        ClassId(self.classes.len())
    }

    /// Iterate over all classes with their IDs
    pub fn iter(&self) -> impl Iterator<Item = (ClassId, &WrapperClass)> {
        self.classes.iter().enumerate().map(|(i, c)| (ClassId(i), c))
    }

    /// Number of registered classes
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{host_method, ArgKind, SlotSignature};
    use ferrule_sdk::Value;

    fn compute_sig() -> SlotSignature {
        SlotSignature::new([], ArgKind::Int)
    }

    #[test]
    fn test_define_and_lookup() {
        let mut registry = ClassRegistry::new();
        let point = registry.define(ClassBuilder::new("Point")).unwrap();
        assert_eq!(point, ClassId(0));
        assert_eq!(registry.by_name("Point"), Some(point));
        assert_eq!(registry.get(point).unwrap().name(), "Point");
        assert_eq!(registry.next_class_id(), ClassId(1));
        assert!(matches!(
            registry.define(ClassBuilder::new("Point")),
            Err(BridgeError::DuplicateClass(_))
        ));
    }

    #[test]
    fn test_subclass_shares_vtable_without_new_slots() {
        let mut registry = ClassRegistry::new();
        let base = registry
            .define(ClassBuilder::new("Base").pure_virtual("compute", compute_sig()))
            .unwrap();
        let derived = registry.define(ClassBuilder::new("Derived").base(base)).unwrap();
        let b = registry.get(base).unwrap();
        let d = registry.get(derived).unwrap();
        assert!(Rc::ptr_eq(b.vtable(), d.vtable()));
        assert!(registry.is_subclass(derived, base));
        assert!(!registry.is_subclass(base, derived));
        assert_eq!(registry.descendants(base), vec![base, derived]);
    }

    #[test]
    fn test_cpp_name_collision() {
        let mut registry = ClassRegistry::new();
        let a = registry.define(ClassBuilder::new("Window").cpp_name("wxWindow")).unwrap();
        let b = registry.define(ClassBuilder::new("OtherWindow")).unwrap();
        assert!(registry.register_cpp_classname("wxWindow", a).is_ok());
        let err = registry.register_cpp_classname("wxWindow", b).unwrap_err();
        assert_eq!(
            err,
            BridgeError::ClassNameCollision {
                name: "wxWindow".into(),
                existing: "Window".into(),
                new: "OtherWindow".into(),
            }
        );
        assert_eq!(registry.class_from_cpp_name("wxWindow"), Some(a));
    }

    #[test]
    fn test_colliding_define_registers_nothing() {
        let mut registry = ClassRegistry::new();
        let window = registry.define(ClassBuilder::new("Window").cpp_name("wxWindow")).unwrap();
        let err = registry
            .define(ClassBuilder::new("Frame").base(window).cpp_name("wxWindow"))
            .unwrap_err();
        assert!(matches!(err, BridgeError::ClassNameCollision { .. }));
        assert_eq!(registry.by_name("Frame"), None);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.descendants(window), vec![window]);

        let frame = registry
            .define(ClassBuilder::new("Frame").base(window).cpp_name("wxFrame"))
            .unwrap();
        assert_eq!(registry.class_from_cpp_name("wxFrame"), Some(frame));
    }

    #[test]
    fn test_abstract_policies() {
        let mut registry = ClassRegistry::new();
        let abs = registry
            .define(ClassBuilder::new("Abstract").policy(InstantiationPolicy::Abstract))
            .unwrap();
        let sub = registry.define(ClassBuilder::new("Sub").base(abs)).unwrap();
        let concrete = registry
            .define(
                ClassBuilder::new("Concrete")
                    .base(sub)
                    .policy(InstantiationPolicy::ConcreteSubclass),
            )
            .unwrap();
        let below = registry.define(ClassBuilder::new("Below").base(concrete)).unwrap();

        let err = registry.check_instantiable(abs).unwrap_err();
        assert!(err.to_string().contains("cannot be instantiated or sub-classed"));
        assert!(registry.check_instantiable(sub).is_err());
        assert!(registry.check_instantiable(concrete).is_ok());
        assert!(registry.check_instantiable(below).is_ok());
    }

    #[test]
    fn test_pure_virtual_needs_override() {
        let mut registry = ClassRegistry::new();
        let base = registry
            .define(
                ClassBuilder::new("Base")
                    .policy(InstantiationPolicy::PureVirtualAbstract)
                    .pure_virtual("compute", compute_sig()),
            )
            .unwrap();
        let lazy = registry.define(ClassBuilder::new("Lazy").base(base)).unwrap();
        let derived = registry
            .define(
                ClassBuilder::new("Derived")
                    .base(base)
                    .override_method("compute", host_method(|_, _, _| Ok(Value::Int(42)))),
            )
            .unwrap();

        let err = registry.check_instantiable(base).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Base represents a C++ abstract class and cannot be instantiated"
        );
        let err = registry.check_instantiable(lazy).unwrap_err();
        assert!(err.to_string().contains("'compute'"));
        assert!(registry.check_instantiable(derived).is_ok());
        assert!(registry.get(derived).unwrap().default_flags().get(0));
        assert!(!registry.get(base).unwrap().default_flags().get(0));
    }

    #[test]
    fn test_override_of_unknown_slot_is_rejected() {
        let mut registry = ClassRegistry::new();
        let err = registry
            .define(
                ClassBuilder::new("Broken")
                    .override_method("missing", host_method(|_, _, _| Ok(Value::None))),
            )
            .unwrap_err();
        assert!(matches!(err, BridgeError::NoSuchVirtual { .. }));
    }
}
