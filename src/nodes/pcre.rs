//! Pattern group downcall nodes.

use std::sync::Arc;

use thiserror::Error;

use crate::view::NativeView;

use super::PcreOps;

/// Pattern compilation failure: error text plus the byte offset within the
/// pattern where compilation stopped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at offset {offset}")]
pub struct PcreCompileError {
    pub message: String,
    pub offset: usize,
}

pub struct PcreExecNode {
    ops: Arc<dyn PcreOps>,
}

impl PcreExecNode {
    pub fn new(ops: Arc<dyn PcreOps>) -> Self {
        Self { ops }
    }

    /// Run a compiled pattern against `subject`, filling the guest ovector
    /// in place. Returns the raw match count / status from the pattern
    /// engine.
    pub fn execute(
        &self,
        code: usize,
        subject: &str,
        start: i32,
        options: u32,
        ovector: &mut [i32],
    ) -> i32 {
        let mut view = NativeView::new(ovector);
        self.ops
            .exec(code, subject, start, options, view.as_mut_slice())
    }
}
