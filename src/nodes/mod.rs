//! Downcall Dispatch Nodes
//!
//! One family per native group: compression, linear algebra, user
//! randomness, pattern matching, misc, and dynamic loading. Each group is a
//! trait with one operation per native entry point; the active backend
//! supplies the implementation and the node wrappers in the submodules
//! marshal managed arrays through [`NativeView`](crate::view::NativeView)
//! for the call's duration.
//!
//! Contract notes, inherited from the underlying native libraries:
//! - lengths are always passed explicitly alongside buffers, never inferred
//!   from buffer metadata;
//! - argument shapes are not validated; malformed input is the caller's
//!   responsibility, exactly as with the raw native entry points;
//! - compute groups mutate arrays in place; the compression group returns a
//!   status code the caller must classify.

pub mod lapack;
pub mod misc;
pub mod pcre;
pub mod rng;
pub mod zip;

pub use lapack::{LapackDpotrfNode, LapackDqrdc2Node};
pub use misc::ExactSumNode;
pub use pcre::{PcreCompileError, PcreExecNode};
pub use rng::RngNode;
pub use zip::{ZipCompressNode, ZipUncompressNode};

use std::path::Path;
use std::sync::Arc;

use crate::error::BridgeResult;
use crate::loader::{Module, SymbolAddr};

/// Compression group (zlib convention). `dest_len` is in/out: capacity on
/// entry, bytes produced on a zero status.
pub trait ZipOps: Send + Sync {
    fn compress(&self, dest: &mut [u8], dest_len: &mut u64, src: &[u8], src_len: u64) -> i32;
    fn uncompress(&self, dest: &mut [u8], dest_len: &mut u64, src: &[u8], src_len: u64) -> i32;
}

/// Linear algebra group: LAPACK entry points plus the `dqrdc2` QR kernel
/// the guest runtime factored out of its applied-statistics library.
pub trait LapackOps: Send + Sync {
    /// LAPACK version triple.
    fn ilaver(&self, version: &mut [i32; 3]);

    /// Cholesky factorization of a symmetric positive-definite matrix,
    /// in place, column-major. Returns `info`: 0 on success, `i > 0` when
    /// the leading minor of order `i` is not positive definite.
    fn dpotrf(&self, uplo: u8, n: i32, a: &mut [f64], lda: i32) -> i32;

    /// QR decomposition with tolerance-based column pivoting. All arrays
    /// mutate in place; `rank` receives the detected rank.
    #[allow(clippy::too_many_arguments)]
    fn dqrdc2(
        &self,
        x: &mut [f64],
        ldx: i32,
        n: i32,
        p: i32,
        tol: f64,
        rank: &mut i32,
        qraux: &mut [f64],
        pivot: &mut [i32],
        work: &mut [f64],
    );
}

/// User-supplied random number generator contract.
pub trait RngOps: Send + Sync {
    fn init(&self, seed: i32);
    fn rand(&self) -> f64;
    fn n_seed(&self) -> i32;
    fn seeds(&self, out: &mut [i32]);
}

/// Pattern group, PCRE calling convention: compiled patterns are opaque
/// handles, `exec` fills an ovector of match offsets.
pub trait PcreOps: Send + Sync {
    /// Build locale character tables; opaque handle, 0 for the default.
    fn maketables(&self) -> usize;

    /// Compile a pattern. On failure reports the error text and the byte
    /// offset within the pattern.
    fn compile(&self, pattern: &str, options: u32, tables: usize)
        -> Result<usize, PcreCompileError>;

    /// Number of capture groups in a compiled pattern.
    fn capture_count(&self, code: usize) -> i32;

    /// Match `subject` from `start`. Returns the match count (captures + 1),
    /// 0 when the ovector was too small, or a negative status (-1 no match).
    /// `ovector` receives (start, end) offset pairs.
    fn exec(&self, code: usize, subject: &str, start: i32, options: u32, ovector: &mut [i32])
        -> i32;
}

/// Misc group: entry points with no better home.
pub trait MiscOps: Send + Sync {
    /// Compensated (error-free accumulation) summation. `has_na` marks the
    /// input as possibly containing NA (encoded as NaN); with `na_rm` those
    /// elements are skipped, otherwise they poison the sum.
    fn exact_sum(&self, values: &[f64], has_na: bool, na_rm: bool) -> f64;
}

/// Dynamic loading surfaced as a downcall group, so the evaluator reaches
/// dlopen/dlsym through the same node contract as every other native call.
pub trait DllOps: Send + Sync {
    fn dlopen(&self, path: &Path) -> BridgeResult<Arc<Module>>;
    fn dlsym(&self, module: &Module, name: &str) -> BridgeResult<SymbolAddr>;
}
