//! Linear algebra downcall nodes.
//!
//! Arrays mutate in place: the node projects the guest array through a
//! [`NativeView`], the native kernel writes through it, and the result is
//! copied back when the view drops.

use std::sync::Arc;

use crate::view::NativeView;

use super::LapackOps;

pub struct LapackDpotrfNode {
    ops: Arc<dyn LapackOps>,
}

impl LapackDpotrfNode {
    pub fn new(ops: Arc<dyn LapackOps>) -> Self {
        Self { ops }
    }

    /// Cholesky-factor `a` (column-major, `n` x `n`, leading dimension
    /// `lda`) in place. Returns LAPACK `info`.
    pub fn execute(&self, uplo: u8, n: i32, a: &mut [f64], lda: i32) -> i32 {
        let mut view = NativeView::new(a);
        self.ops.dpotrf(uplo, n, view.as_mut_slice(), lda)
    }
}

pub struct LapackDqrdc2Node {
    ops: Arc<dyn LapackOps>,
}

impl LapackDqrdc2Node {
    pub fn new(ops: Arc<dyn LapackOps>) -> Self {
        Self { ops }
    }

    /// QR with tolerance-based column pivoting; every output array mutates
    /// in place. Returns the detected rank.
    #[allow(clippy::too_many_arguments)]
    pub fn execute(
        &self,
        x: &mut [f64],
        ldx: i32,
        n: i32,
        p: i32,
        tol: f64,
        qraux: &mut [f64],
        pivot: &mut [i32],
        work: &mut [f64],
    ) -> i32 {
        let mut x_view = NativeView::new(x);
        let mut qraux_view = NativeView::new(qraux);
        let mut pivot_view = NativeView::new(pivot);
        let mut work_view = NativeView::new(work);
        let mut rank = 0;
        self.ops.dqrdc2(
            x_view.as_mut_slice(),
            ldx,
            n,
            p,
            tol,
            &mut rank,
            qraux_view.as_mut_slice(),
            pivot_view.as_mut_slice(),
            work_view.as_mut_slice(),
        );
        rank
    }
}
