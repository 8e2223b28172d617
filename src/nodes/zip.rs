//! Compression downcall nodes.
//!
//! Each node performs exactly one native call per invocation. The guest
//! destination buffer is marshaled through a [`NativeView`]; on a non-zero
//! status the view is cancelled so no partial output reaches the managed
//! array.

use std::sync::Arc;

use crate::error::zip_status;
use crate::view::{NativeView, ReadOnlyView};

use super::ZipOps;

pub struct ZipCompressNode {
    ops: Arc<dyn ZipOps>,
}

impl ZipCompressNode {
    pub fn new(ops: Arc<dyn ZipOps>) -> Self {
        Self { ops }
    }

    /// Compress `src` into `dest`. Returns the zlib status and, on success,
    /// the number of bytes written; `dest` keeps its length either way.
    pub fn execute(&self, dest: &mut [u8], src: &[u8]) -> (i32, u64) {
        let src_view = ReadOnlyView::new(src);
        let mut dest_view = NativeView::new(dest);
        let mut dest_len = dest_view.len() as u64;
        let status = self.ops.compress(
            dest_view.as_mut_slice(),
            &mut dest_len,
            src_view.as_slice(),
            src_view.len() as u64,
        );
        if !zip_status::is_ok(status) {
            dest_view.cancel();
            return (status, 0);
        }
        (status, dest_len)
    }
}

pub struct ZipUncompressNode {
    ops: Arc<dyn ZipOps>,
}

impl ZipUncompressNode {
    pub fn new(ops: Arc<dyn ZipOps>) -> Self {
        Self { ops }
    }

    /// Decompress `src` into `dest`. Same status/copy-back contract as
    /// [`ZipCompressNode::execute`].
    pub fn execute(&self, dest: &mut [u8], src: &[u8]) -> (i32, u64) {
        let src_view = ReadOnlyView::new(src);
        let mut dest_view = NativeView::new(dest);
        let mut dest_len = dest_view.len() as u64;
        let status = self.ops.uncompress(
            dest_view.as_mut_slice(),
            &mut dest_len,
            src_view.as_slice(),
            src_view.len() as u64,
        );
        if !zip_status::is_ok(status) {
            dest_view.cancel();
            return (status, 0);
        }
        (status, dest_len)
    }
}
