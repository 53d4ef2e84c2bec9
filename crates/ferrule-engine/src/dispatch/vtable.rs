//! Virtual method tables of wrapped native classes
//!
//! A `VTable` lists the virtual slots a class exposes, in the order native
//! glue numbers them. Subclasses that add slots get a new table whose
//! prefix is the base table; subclasses that add nothing share the base
//! table through an `Rc`.

use crate::bridge::Bridge;
use ferrule_sdk::{BridgeError, BridgeResult, NativePtr, NativeValue};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

/// Native implementation of a virtual slot
///
/// Receives the bridge so native code can call back into it (for example
/// to dispatch another virtual) while the outer call is in progress.
pub type NativeMethod = Rc<dyn Fn(&mut Bridge, NativePtr, &[NativeValue]) -> BridgeResult<NativeValue>>;

/// How one argument or return value crosses the boundary
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ArgKind {
    /// No value
    Void,
    /// `bool`
    Bool,
    /// Integer
    Int,
    /// Double
    Float,
    /// Arbitrary host object passed as a refcounted handle
    Handle,
    /// Pointer to an instance of the named wrapper class
    Object(String),
}

impl fmt::Display for ArgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgKind::Void => f.write_str("void"),
            ArgKind::Bool => f.write_str("bool"),
            ArgKind::Int => f.write_str("int"),
            ArgKind::Float => f.write_str("float"),
            ArgKind::Handle => f.write_str("handle"),
            ArgKind::Object(class) => write!(f, "object:{}", class),
        }
    }
}

impl FromStr for ArgKind {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "void" => Ok(ArgKind::Void),
            "bool" => Ok(ArgKind::Bool),
            "int" => Ok(ArgKind::Int),
            "float" => Ok(ArgKind::Float),
            "handle" => Ok(ArgKind::Handle),
            other => match other.strip_prefix("object:") {
                Some(class) if !class.is_empty() => Ok(ArgKind::Object(class.to_string())),
                _ => Err(BridgeError::InvalidDescription(format!(
                    "unknown argument kind '{}'",
                    other
                ))),
            },
        }
    }
}

impl TryFrom<String> for ArgKind {
    type Error = BridgeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ArgKind> for String {
    fn from(kind: ArgKind) -> Self {
        kind.to_string()
    }
}

impl Default for ArgKind {
    fn default() -> Self {
        ArgKind::Void
    }
}

/// Argument and return kinds of a virtual slot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotSignature {
    /// Argument kinds, excluding `this`
    pub args: Vec<ArgKind>,
    /// Return kind
    pub ret: ArgKind,
}

impl SlotSignature {
    /// Build a signature
    pub fn new(args: impl IntoIterator<Item = ArgKind>, ret: ArgKind) -> Self {
        Self {
            args: args.into_iter().collect(),
            ret,
        }
    }
}

/// One virtual slot
#[derive(Clone)]
pub struct SlotDecl {
    /// Method name as seen from the host
    pub name: String,
    /// Marshalling signature
    pub signature: SlotSignature,
    /// Native implementation; `None` for a pure virtual
    pub native: Option<NativeMethod>,
}

impl SlotDecl {
    /// Slot with a native implementation
    pub fn new(name: impl Into<String>, signature: SlotSignature, native: NativeMethod) -> Self {
        Self {
            name: name.into(),
            signature,
            native: Some(native),
        }
    }

    /// Pure virtual slot
    pub fn pure(name: impl Into<String>, signature: SlotSignature) -> Self {
        Self {
            name: name.into(),
            signature,
            native: None,
        }
    }

    /// No native implementation
    pub fn is_pure(&self) -> bool {
        self.native.is_none()
    }
}

impl fmt::Debug for SlotDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotDecl")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .field("pure", &self.is_pure())
            .finish()
    }
}

/// Virtual method table
#[derive(Debug, Clone, Default)]
pub struct VTable {
    slots: Vec<SlotDecl>,
}

impl VTable {
    /// Create a new empty vtable
    pub fn new() -> Self {
        Self::default()
    }

    /// Table that starts with every slot of `base`
    pub fn extending(base: &VTable) -> Self {
        base.clone()
    }

    /// Append a slot, returning its index
    pub fn add_slot(&mut self, slot: SlotDecl) -> usize {
        self.slots.push(slot);
        self.slots.len() - 1
    }

    /// Slot by index
    pub fn get(&self, index: usize) -> Option<&SlotDecl> {
        self.slots.get(index)
    }

    /// Index of the slot named `name`
    ///
    /// Later slots shadow earlier ones with the same name.
    pub fn slot_by_name(&self, name: &str) -> Option<usize> {
        self.slots.iter().rposition(|s| s.name == name)
    }

    /// Get number of slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Iterate slots in index order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &SlotDecl)> + '_ {
        self.slots.iter().enumerate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ret_int() -> SlotSignature {
        SlotSignature::new([ArgKind::Int], ArgKind::Int)
    }

    #[test]
    fn test_extending_keeps_base_indices() {
        let mut base = VTable::new();
        base.add_slot(SlotDecl::pure("compute", ret_int()));
        let mut derived = VTable::extending(&base);
        let idx = derived.add_slot(SlotDecl::pure("extra", ret_int()));
        assert_eq!(derived.slot_by_name("compute"), Some(0));
        assert_eq!(idx, 1);
        assert_eq!(base.len(), 1);
        assert!(derived.get(0).unwrap().is_pure());
    }

    #[test]
    fn test_arg_kind_text_form() {
        assert_eq!("object:Window".parse::<ArgKind>(), Ok(ArgKind::Object("Window".into())));
        assert_eq!(ArgKind::Handle.to_string(), "handle");
        assert!("object:".parse::<ArgKind>().is_err());
        assert!("pointer".parse::<ArgKind>().is_err());
    }
}
