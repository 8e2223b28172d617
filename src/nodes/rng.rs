//! User RNG downcall node.

use std::sync::Arc;

use crate::view::NativeView;

use super::RngOps;

/// Wraps the user-supplied RNG contract: seed it, draw uniforms, expose the
/// seed vector.
pub struct RngNode {
    ops: Arc<dyn RngOps>,
}

impl RngNode {
    pub fn new(ops: Arc<dyn RngOps>) -> Self {
        Self { ops }
    }

    pub fn init(&self, seed: i32) {
        self.ops.init(seed);
    }

    /// One uniform draw in [0, 1).
    pub fn rand(&self) -> f64 {
        self.ops.rand()
    }

    pub fn n_seed(&self) -> i32 {
        self.ops.n_seed()
    }

    /// Copy the generator's seed vector into the guest array.
    pub fn seeds(&self, out: &mut [i32]) {
        let mut view = NativeView::new(out);
        self.ops.seeds(view.as_mut_slice());
    }
}
