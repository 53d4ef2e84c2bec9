//! Stable handles into the bridge's arenas
//!
//! A `ProxyId` is the host-side identity of a proxy. Holding one does not keep
//! the proxy alive: lookups through a stale id (freed slot or bumped
//! generation) simply miss, which is how weak references are expressed.

use std::fmt;

/// Generational handle to a proxy slot
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProxyId {
    index: u32,
    generation: u32,
}

impl ProxyId {
    /// Create a handle from its raw parts
    #[inline]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index inside the proxy arena
    #[inline]
    pub const fn index(self) -> usize {
        self.index as usize
    }

    /// Generation the slot had when this handle was minted
    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for ProxyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProxyId({}v{})", self.index, self.generation)
    }
}

impl fmt::Display for ProxyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "proxy #{}v{}", self.index, self.generation)
    }
}

/// Index of a wrapper class in the class registry
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct ClassId(pub usize);

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class #{}", self.0)
    }
}
