//! Refcounted handle table
//!
//! Native code can hold on to arbitrary host objects through opaque handle
//! tokens. Each entry keeps its object alive while its count is positive;
//! the entry disappears when the count drops to zero or below.
//!
//! The table is shared (`Rc<RefCell<..>>`) between the bridge, the C entry
//! points and every [`HandleScope`], so native code can adjust counts while
//! a bridge call is in progress.

use crate::defaults::FIRST_HANDLE_TOKEN;
use ferrule_sdk::{BridgeError, BridgeResult, ObjectKey, Value};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;

/// Shared handle to a refcount table
pub type SharedRefcounts = Rc<RefCell<RefcountTable>>;

struct RefEntry {
    count: i64,
    handle: usize,
    object: Value,
}

/// Map from object identity to (count, handle, object)
pub struct RefcountTable {
    entries: FxHashMap<ObjectKey, RefEntry>,
    by_handle: FxHashMap<usize, ObjectKey>,
    next_handle: usize,
}

impl Default for RefcountTable {
    fn default() -> Self {
        Self {
            entries: FxHashMap::default(),
            by_handle: FxHashMap::default(),
            next_handle: FIRST_HANDLE_TOKEN,
        }
    }
}

impl RefcountTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty shared table
    pub fn shared() -> SharedRefcounts {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Take one reference on `object`, creating its entry if needed
    ///
    /// Returns the object's handle token, stable for as long as the entry
    /// exists.
    pub fn acquire(&mut self, object: &Value) -> BridgeResult<usize> {
        let key = object
            .identity()
            .ok_or_else(|| BridgeError::NoIdentity(object.kind().name().to_string()))?;
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.count += 1;
            return Ok(entry.handle);
        }
        let handle = self.next_handle;
        self.next_handle += 1;
        self.entries.insert(
            key,
            RefEntry {
                count: 1,
                handle,
                object: object.clone(),
            },
        );
        self.by_handle.insert(handle, key);
        Ok(handle)
    }

    /// Add `delta` to the count of the entry behind `handle`
    ///
    /// The entry is removed once its count is zero or negative. Returns the
    /// new count.
    pub fn adjust_refcount(&mut self, handle: usize, delta: i64) -> BridgeResult<i64> {
        let key = *self
            .by_handle
            .get(&handle)
            .ok_or(BridgeError::InvalidHandle(handle))?;
        let remaining = match self.entries.get_mut(&key) {
            Some(entry) => {
                entry.count += delta;
                entry.count
            }
            None => return Err(BridgeError::InvalidHandle(handle)),
        };
        if remaining <= 0 {
            self.entries.remove(&key);
            self.by_handle.remove(&handle);
        }
        Ok(remaining)
    }

    /// Object behind a handle
    pub fn from_handle(&self, handle: usize) -> Option<Value> {
        self.by_handle
            .get(&handle)
            .and_then(|key| self.entries.get(key))
            .map(|e| e.object.clone())
    }

    /// Current count of `object`, if it has an entry
    pub fn count(&self, object: &Value) -> Option<i64> {
        let key = object.identity()?;
        self.entries.get(&key).map(|e| e.count)
    }

    /// Handle of `object`, if it has an entry
    pub fn handle_of(&self, object: &Value) -> Option<usize> {
        let key = object.identity()?;
        self.entries.get(&key).map(|e| e.handle)
    }

    /// Objects currently kept alive by the table
    pub fn objects(&self) -> impl Iterator<Item = &Value> + '_ {
        self.entries.values().map(|e| &e.object)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.entries.clear();
        self.by_handle.clear();
    }
}

/// Scoped reference: +1 on creation, -1 when dropped
///
/// Scopes nest; each one releases exactly the reference it took.
pub struct HandleScope {
    table: SharedRefcounts,
    handle: usize,
}

impl HandleScope {
    /// Take a reference on `object` for the lifetime of the scope
    pub fn new(table: &SharedRefcounts, object: &Value) -> BridgeResult<Self> {
        let handle = table.borrow_mut().acquire(object)?;
        Ok(Self {
            table: Rc::clone(table),
            handle,
        })
    }

    /// The handle token to pass to native code
    pub fn handle(&self) -> usize {
        self.handle
    }
}

impl Drop for HandleScope {
    fn drop(&mut self) {
        let Ok(mut table) = self.table.try_borrow_mut() else {
            tracing::warn!(handle = self.handle, "refcount table busy, handle scope leaked");
            return;
        };
        if let Err(e) = table.adjust_refcount(self.handle, -1) {
            tracing::debug!(handle = self.handle, error = %e, "handle released twice");
        }
    }
}
