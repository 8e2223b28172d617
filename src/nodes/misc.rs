//! Misc group downcall nodes.

use std::sync::Arc;

use crate::view::ReadOnlyView;

use super::MiscOps;

pub struct ExactSumNode {
    ops: Arc<dyn MiscOps>,
}

impl ExactSumNode {
    pub fn new(ops: Arc<dyn MiscOps>) -> Self {
        Self { ops }
    }

    /// Compensated sum over the guest array; the input is read-only, so the
    /// view needs no copy-back.
    pub fn execute(&self, values: &[f64], has_na: bool, na_rm: bool) -> f64 {
        let view = ReadOnlyView::new(values);
        self.ops.exact_sum(view.as_slice(), has_na, na_rm)
    }
}
