//! Native Handle Table
//!
//! Native code never holds managed values directly; it holds opaque `u64`
//! handles. Each handle is bound to a [`GuestValue`] inside a scope, and
//! dies when the scope is closed, unless explicitly pinned, which promotes
//! it to process lifetime (the protect/unprotect contract). Use of a dead
//! handle is a typed [`BridgeError::DeadHandle`], never a dangling read.

use std::collections::HashMap;

use crate::error::{BridgeError, BridgeResult};
use crate::value::GuestValue;

/// Opaque identity native code holds for a managed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeHandle(pub u64);

/// Handle table scoped to one downcall chain.
///
/// Scopes nest: `open_scope` before a downcall, `close_scope` after control
/// returns to managed code. Closing a scope invalidates every handle created
/// inside it except the pinned ones.
pub struct HandleTable {
    entries: HashMap<u64, Entry>,
    next_id: u64,
    /// Scope depth at which each live handle was created; depth 0 is the
    /// process scope.
    depth: u32,
}

struct Entry {
    value: GuestValue,
    depth: u32,
    pinned: bool,
}

impl HandleTable {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            next_id: 1,
            depth: 0,
        }
    }

    pub fn scope_depth(&self) -> u32 {
        self.depth
    }

    /// Bind `value` to a fresh handle in the current scope.
    pub fn bind(&mut self, value: GuestValue) -> NativeHandle {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert(
            id,
            Entry {
                value,
                depth: self.depth,
                pinned: false,
            },
        );
        NativeHandle(id)
    }

    /// Resolve a handle to its managed value.
    pub fn resolve(&self, handle: NativeHandle) -> BridgeResult<&GuestValue> {
        self.entries
            .get(&handle.0)
            .map(|e| &e.value)
            .ok_or(BridgeError::DeadHandle(handle.0))
    }

    /// Rebind an existing handle to a new value (in-place mutation as native
    /// code sees it).
    pub fn rebind(&mut self, handle: NativeHandle, value: GuestValue) -> BridgeResult<()> {
        match self.entries.get_mut(&handle.0) {
            Some(entry) => {
                entry.value = value;
                Ok(())
            }
            None => Err(BridgeError::DeadHandle(handle.0)),
        }
    }

    /// Pin a handle so it survives scope closure. Pinning is the documented
    /// escape hatch for native code that retains values across calls; the
    /// pin lasts until [`HandleTable::unpin`] or process shutdown.
    pub fn pin(&mut self, handle: NativeHandle) -> BridgeResult<()> {
        match self.entries.get_mut(&handle.0) {
            Some(entry) => {
                entry.pinned = true;
                Ok(())
            }
            None => Err(BridgeError::DeadHandle(handle.0)),
        }
    }

    pub fn unpin(&mut self, handle: NativeHandle) -> BridgeResult<()> {
        match self.entries.get_mut(&handle.0) {
            Some(entry) => {
                entry.pinned = false;
                Ok(())
            }
            None => Err(BridgeError::DeadHandle(handle.0)),
        }
    }

    /// Open a nested scope for one downcall.
    pub fn open_scope(&mut self) {
        self.depth += 1;
    }

    /// Close the current scope, invalidating its unpinned handles.
    ///
    /// Scopes must balance; closing at depth 0 would reclaim process-scope
    /// handles, so it panics in every build.
    pub fn close_scope(&mut self) {
        assert!(self.depth > 0, "close_scope without open_scope");
        let depth = self.depth;
        self.entries
            .retain(|_, entry| entry.pinned || entry.depth < depth);
        self.depth -= 1;
    }

    /// Number of live handles, pinned included.
    pub fn live_count(&self) -> usize {
        self.entries.len()
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}
