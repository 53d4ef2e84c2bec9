//! Native destruction notices
//!
//! Native destructors run at arbitrary points, often while the bridge is in
//! the middle of finalizing something else. They only push the dying
//! address onto this queue; the bridge drains it before each operation
//! returns.

use ferrule_sdk::NativePtr;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// Cloneable sender for "this native object is gone" notices
#[derive(Clone, Default)]
pub struct DestroyNotifier {
    queue: Rc<RefCell<VecDeque<NativePtr>>>,
}

impl DestroyNotifier {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Report that the native object at `ptr` has been destroyed
    pub fn notify(&self, ptr: NativePtr) {
        self.queue.borrow_mut().push_back(ptr);
    }

    pub(crate) fn pop(&self) -> Option<NativePtr> {
        self.queue.borrow_mut().pop_front()
    }

    /// Notices not yet processed
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_the_queue() {
        let a = DestroyNotifier::new();
        let b = a.clone();
        b.notify(NativePtr::new(0x40).unwrap());
        assert_eq!(a.pending(), 1);
        assert_eq!(a.pop(), NativePtr::new(0x40));
        assert_eq!(b.pending(), 0);
    }
}
