//! Native Memory View
//!
//! Projects one managed element array as a native-addressable buffer for the
//! duration of a single downcall. Construction snapshots the backing array
//! into a scratch buffer whose address is stable for the call; any mutable
//! access marks the view dirty, and a dirty view copies the scratch back into
//! the backing array when it is released. Clean views skip the copy-back.
//!
//! Release is tied to scope: the view borrows its backing array mutably, so
//! it cannot outlive the array, the array cannot be read while the view is
//! live, and copy-back runs on every exit path including early returns and
//! panics. Native code that stashes the scratch address past the call is
//! out of contract; nothing in this API hands out an owned pointer that
//! survives the view.

use std::marker::PhantomData;

/// A writable projection of a managed array, valid for one downcall.
pub struct NativeView<'a, T: Copy> {
    backing: &'a mut [T],
    scratch: Vec<T>,
    dirty: bool,
    // Views are call-local; keep them off other threads.
    _not_send: PhantomData<*mut T>,
}

impl<'a, T: Copy> NativeView<'a, T> {
    /// Snapshot `backing` into a fresh scratch buffer.
    pub fn new(backing: &'a mut [T]) -> Self {
        let scratch = backing.to_vec();
        Self {
            backing,
            scratch,
            dirty: false,
            _not_send: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.scratch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scratch.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Read access to the snapshot; does not mark the view dirty.
    pub fn as_slice(&self) -> &[T] {
        &self.scratch
    }

    /// Native-visible base address for read-only use.
    pub fn as_ptr(&self) -> *const T {
        self.scratch.as_ptr()
    }

    /// Write access to the snapshot. Marks the view dirty: the scratch will
    /// be copied back into the backing array on release.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        self.dirty = true;
        &mut self.scratch
    }

    /// Native-visible base address for in-place mutation. Marks the view
    /// dirty.
    pub fn as_mut_ptr(&mut self) -> *mut T {
        self.dirty = true;
        self.scratch.as_mut_ptr()
    }

    /// Drop the view without copying back, even if native code wrote through
    /// it. Used when a native call reports failure and its partial output
    /// must not become visible to managed code.
    pub fn cancel(mut self) {
        self.dirty = false;
    }
}

impl<T: Copy> Drop for NativeView<'_, T> {
    fn drop(&mut self) {
        if self.dirty {
            // Same length by construction; the scratch is never reallocated.
            self.backing.copy_from_slice(&self.scratch);
        }
    }
}

/// A read-only projection. No dirty tracking, no copy-back; the snapshot
/// only provides a stable address for the call.
pub struct ReadOnlyView<T: Copy> {
    scratch: Vec<T>,
    _not_send: PhantomData<*mut T>,
}

impl<T: Copy> ReadOnlyView<T> {
    pub fn new(backing: &[T]) -> Self {
        Self {
            scratch: backing.to_vec(),
            _not_send: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.scratch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scratch.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.scratch
    }

    pub fn as_ptr(&self) -> *const T {
        self.scratch.as_ptr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_view_skips_copy_back() {
        let mut backing = vec![1i32, 2, 3];
        {
            let view = NativeView::new(&mut backing);
            assert_eq!(view.as_slice(), &[1, 2, 3]);
            assert!(!view.is_dirty());
        }
        assert_eq!(backing, vec![1, 2, 3]);
    }

    #[test]
    fn test_dirty_view_copies_back() {
        let mut backing = vec![0.0f64; 4];
        {
            let mut view = NativeView::new(&mut backing);
            view.as_mut_slice().copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
            assert!(view.is_dirty());
        }
        assert_eq!(backing, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_cancel_discards_writes() {
        let mut backing = vec![9u8, 9, 9];
        let mut view = NativeView::new(&mut backing);
        view.as_mut_slice()[0] = 1;
        view.cancel();
        assert_eq!(backing, vec![9, 9, 9]);
    }

    #[test]
    fn test_empty_view_round_trip() {
        let mut backing: Vec<i32> = Vec::new();
        {
            let mut view = NativeView::new(&mut backing);
            assert!(view.is_empty());
            let _ = view.as_mut_ptr();
        }
        assert!(backing.is_empty());
    }
}
