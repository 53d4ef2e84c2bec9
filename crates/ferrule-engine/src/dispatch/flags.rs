//! Per-slot override flags
//!
//! One bit per virtual slot. The native trampoline consults the bit to
//! decide whether a virtual call goes to the host or straight to the native
//! implementation, so instances created by host code carry their own copy.

use smallvec::SmallVec;

const WORD_BITS: usize = 64;

/// Bitset of overridden virtual slots
#[derive(Clone, Default, PartialEq, Eq)]
pub struct OverrideFlags {
    words: SmallVec<[u64; 2]>,
}

impl OverrideFlags {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Is `slot` overridden?
    #[inline]
    pub fn get(&self, slot: usize) -> bool {
        self.words
            .get(slot / WORD_BITS)
            .is_some_and(|w| w & (1 << (slot % WORD_BITS)) != 0)
    }

    /// Mark `slot` as overridden
    pub fn set(&mut self, slot: usize) {
        let word = slot / WORD_BITS;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1 << (slot % WORD_BITS);
    }

    /// Unmark `slot`
    pub fn clear(&mut self, slot: usize) {
        if let Some(w) = self.words.get_mut(slot / WORD_BITS) {
            *w &= !(1 << (slot % WORD_BITS));
        }
    }

    /// Set or clear `slot`
    pub fn assign(&mut self, slot: usize, on: bool) {
        if on {
            self.set(slot)
        } else {
            self.clear(slot)
        }
    }

    /// Any slot overridden?
    pub fn any(&self) -> bool {
        self.words.iter().any(|&w| w != 0)
    }

    /// Overridden slots in ascending order
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &w)| {
            (0..WORD_BITS)
                .filter(move |bit| w & (1 << bit) != 0)
                .map(move |bit| i * WORD_BITS + bit)
        })
    }

    /// One byte per slot, the layout native glue keeps next to its vtable
    pub fn to_bytes(&self, slots: usize) -> Vec<u8> {
        (0..slots).map(|s| self.get(s) as u8).collect()
    }
}

impl std::fmt::Debug for OverrideFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_clear_across_words() {
        let mut flags = OverrideFlags::new();
        assert!(!flags.get(3));
        flags.set(3);
        flags.set(70);
        assert!(flags.get(3));
        assert!(flags.get(70));
        assert_eq!(flags.iter().collect::<Vec<_>>(), vec![3, 70]);
        flags.clear(3);
        flags.assign(70, false);
        assert!(!flags.any());
    }

    #[test]
    fn test_to_bytes() {
        let mut flags = OverrideFlags::new();
        flags.set(1);
        assert_eq!(flags.to_bytes(3), vec![0, 1, 0]);
    }
}
