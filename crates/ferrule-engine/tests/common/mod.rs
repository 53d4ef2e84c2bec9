//! A fake native toolkit for integration tests
//!
//! Objects live in a map keyed by made-up addresses. Deleting an object
//! deletes the children it owns natively, logs `~label` for each and sends
//! a destruction notice, the way a widget toolkit's destructors would.

#![allow(dead_code)]

use ferrule_engine::{Bridge, ClassBuilder, DestroyNotifier, OverrideFlags};
use ferrule_sdk::NativePtr;
use rustc_hash::FxHashMap;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// A native object
pub struct FakeObject {
    pub label: String,
    pub children: Vec<NativePtr>,
    pub vflags: Vec<u8>,
}

pub struct Toolkit {
    next: Cell<usize>,
    objects: RefCell<FxHashMap<usize, FakeObject>>,
    log: RefCell<Vec<String>>,
    notifier: DestroyNotifier,
}

impl Toolkit {
    pub fn new(bridge: &Bridge) -> Rc<Self> {
        Rc::new(Self {
            next: Cell::new(0x1000),
            objects: RefCell::new(FxHashMap::default()),
            log: RefCell::new(Vec::new()),
            notifier: bridge.notifier(),
        })
    }

    /// `new Label()`
    pub fn alloc(&self, label: &str) -> NativePtr {
        let addr = self.next.get();
        self.next.set(addr + 0x100);
        self.objects.borrow_mut().insert(
            addr,
            FakeObject {
                label: label.to_string(),
                children: Vec::new(),
                vflags: Vec::new(),
            },
        );
        NativePtr::new(addr).expect("fake addresses are non-zero")
    }

    /// Make `parent` delete `child` when it is deleted
    pub fn adopt(&self, parent: NativePtr, child: NativePtr) {
        if let Some(p) = self.objects.borrow_mut().get_mut(&parent.addr()) {
            p.children.push(child);
        }
    }

    /// `delete ptr`
    pub fn delete(&self, ptr: NativePtr) {
        let Some(obj) = self.objects.borrow_mut().remove(&ptr.addr()) else {
            return;
        };
        self.log.borrow_mut().push(format!("~{}", obj.label));
        for child in obj.children {
            self.delete(child);
        }
        self.notifier.notify(ptr);
    }

    pub fn is_alive(&self, ptr: NativePtr) -> bool {
        self.objects.borrow().contains_key(&ptr.addr())
    }

    pub fn live_objects(&self) -> usize {
        self.objects.borrow().len()
    }

    pub fn vflags(&self, ptr: NativePtr) -> Vec<u8> {
        self.objects
            .borrow()
            .get(&ptr.addr())
            .map(|o| o.vflags.clone())
            .unwrap_or_default()
    }

    pub fn log(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    /// Class builder wired to this toolkit's destructor and flag storage
    pub fn class(self: &Rc<Self>, name: &str) -> ClassBuilder {
        let dtor = Rc::clone(self);
        let sync = Rc::clone(self);
        ClassBuilder::new(name)
            .destructor(move |ptr| dtor.delete(ptr))
            .sync_flags(move |ptr, flags: &OverrideFlags| {
                if let Some(o) = sync.objects.borrow_mut().get_mut(&ptr.addr()) {
                    o.vflags = flags.to_bytes(8);
                }
            })
    }
}
