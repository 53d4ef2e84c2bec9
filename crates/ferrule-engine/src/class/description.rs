//! Serialized class descriptions
//!
//! Binding generators emit one JSON object per wrapped class. A description
//! carries everything about the class except the native function pointers,
//! which the embedding glue supplies as [`NativeBindings`].
//!
//! ```json
//! {
//!   "name": "Widget",
//!   "cpp_name": "wxWidget",
//!   "base": "Object",
//!   "policy": "pure_virtual_abstract",
//!   "virtuals": [
//!     { "name": "compute", "args": ["int"], "ret": "int", "pure": true }
//!   ]
//! }
//! ```

use super::{ClassBuilder, ClassRegistry, InstantiationPolicy, NativeOps};
use crate::dispatch::{ArgKind, NativeMethod, SlotDecl, SlotSignature};
use ferrule_sdk::{BridgeError, BridgeResult};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Instantiation policy as written in a description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyDescription {
    /// Follow the base class
    #[default]
    Inherit,
    /// Abstract, subclasses included
    Abstract,
    /// Concrete below an abstract base
    ConcreteSubclass,
    /// Native abstract class
    PureVirtualAbstract,
}

impl From<PolicyDescription> for InstantiationPolicy {
    fn from(p: PolicyDescription) -> Self {
        match p {
            PolicyDescription::Inherit => InstantiationPolicy::Inherit,
            PolicyDescription::Abstract => InstantiationPolicy::Abstract,
            PolicyDescription::ConcreteSubclass => InstantiationPolicy::ConcreteSubclass,
            PolicyDescription::PureVirtualAbstract => InstantiationPolicy::PureVirtualAbstract,
        }
    }
}

/// One virtual slot in a description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotDescription {
    /// Method name
    pub name: String,
    /// Argument kinds
    #[serde(default)]
    pub args: Vec<ArgKind>,
    /// Return kind
    #[serde(default)]
    pub ret: ArgKind,
    /// Pure virtual: no native implementation
    #[serde(default)]
    pub pure: bool,
}

/// Generated description of a wrapped class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDescription {
    /// Host-side class name
    pub name: String,
    /// Native class name for RTTI lookups
    #[serde(default)]
    pub cpp_name: Option<String>,
    /// Host-side name of the base class
    #[serde(default)]
    pub base: Option<String>,
    /// Instantiation policy
    #[serde(default)]
    pub policy: PolicyDescription,
    /// Base-class sub-object offsets
    #[serde(default)]
    pub base_offsets: Vec<isize>,
    /// Virtual slots added by this class, in native order
    #[serde(default)]
    pub virtuals: Vec<SlotDescription>,
}

/// Native function pointers that complete a description
#[derive(Default)]
pub struct NativeBindings {
    /// Destructor, RTTI and flag-sync hooks
    pub ops: NativeOps,
    /// Native implementations of non-pure virtual slots, by name
    pub methods: FxHashMap<String, NativeMethod>,
}

impl NativeBindings {
    /// Empty bindings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the native hooks
    pub fn with_ops(mut self, ops: NativeOps) -> Self {
        self.ops = ops;
        self
    }

    /// Bind the native implementation of a virtual slot
    pub fn with_method(mut self, name: impl Into<String>, method: NativeMethod) -> Self {
        self.methods.insert(name.into(), method);
        self
    }
}

impl ClassDescription {
    /// Parse a single description
    pub fn from_json(text: &str) -> BridgeResult<Self> {
        serde_json::from_str(text).map_err(|e| BridgeError::InvalidDescription(e.to_string()))
    }

    /// Parse a JSON array of descriptions
    pub fn list_from_json(text: &str) -> BridgeResult<Vec<Self>> {
        serde_json::from_str(text).map_err(|e| BridgeError::InvalidDescription(e.to_string()))
    }

    /// Serialize back to JSON
    pub fn to_json(&self) -> BridgeResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| BridgeError::InvalidDescription(e.to_string()))
    }

    /// Turn the description into a builder, resolving the base by name
    pub fn into_builder(
        self,
        registry: &ClassRegistry,
        mut natives: NativeBindings,
    ) -> BridgeResult<ClassBuilder> {
        let mut builder = ClassBuilder::new(&self.name)
            .policy(self.policy.into())
            .native_ops(natives.ops);
        if let Some(base) = &self.base {
            let id = registry
                .by_name(base)
                .ok_or_else(|| BridgeError::UnknownClass(base.clone()))?;
            builder = builder.base(id);
        }
        if let Some(cpp) = self.cpp_name {
            builder = builder.cpp_name(cpp);
        }
        for off in self.base_offsets {
            builder = builder.base_offset(off);
        }
        for v in self.virtuals {
            let signature = SlotSignature::new(v.args, v.ret);
            let slot = if v.pure {
                SlotDecl::pure(v.name, signature)
            } else {
                let native = natives.methods.remove(&v.name).ok_or_else(|| {
                    BridgeError::InvalidDescription(format!(
                        "no native implementation bound for {}.{}",
                        self.name, v.name
                    ))
                })?;
                SlotDecl::new(v.name, signature, native)
            };
            builder = builder.slot(slot);
        }
        for unused in natives.methods.keys() {
            tracing::warn!(class = %self.name, method = %unused, "native binding has no matching virtual slot");
        }
        Ok(builder)
    }
}
