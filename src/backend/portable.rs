//! Portable Backend
//!
//! Reimplements the native-library entry points in-process, so no companion
//! compiled artifact is needed. Compression goes through flate2, the user
//! RNG through ChaCha20, pattern matching through the regex crate, and the
//! linear algebra kernels are written out directly. Semantics follow the
//! native originals down to their status-code conventions.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};
use parking_lot::Mutex;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use regex::Regex;

use crate::config::BackendKind;
use crate::error::{zip_status, BridgeResult};
use crate::loader::{LibraryRegistry, Module, SymbolAddr};
use crate::nodes::{
    DllOps, LapackOps, MiscOps, PcreCompileError, PcreOps, RngOps, ZipOps,
};

use super::{Backend, RegistryDll};

pub struct PortableBackend {
    zip: Arc<PortableZip>,
    lapack: Arc<PortableLapack>,
    rng: Arc<PortableRng>,
    pcre: Arc<PortablePcre>,
    misc: Arc<PortableMisc>,
    dll: Arc<RegistryDll>,
}

impl PortableBackend {
    pub fn new(libraries: Arc<LibraryRegistry>) -> Self {
        Self {
            zip: Arc::new(PortableZip),
            lapack: Arc::new(PortableLapack),
            rng: Arc::new(PortableRng::new()),
            pcre: Arc::new(PortablePcre::new()),
            misc: Arc::new(PortableMisc),
            dll: Arc::new(RegistryDll::new(libraries)),
        }
    }
}

impl Backend for PortableBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Portable
    }

    fn zip(&self) -> Arc<dyn ZipOps> {
        Arc::clone(&self.zip) as Arc<dyn ZipOps>
    }

    fn lapack(&self) -> Arc<dyn LapackOps> {
        Arc::clone(&self.lapack) as Arc<dyn LapackOps>
    }

    fn rng(&self) -> Arc<dyn RngOps> {
        Arc::clone(&self.rng) as Arc<dyn RngOps>
    }

    fn pcre(&self) -> Arc<dyn PcreOps> {
        Arc::clone(&self.pcre) as Arc<dyn PcreOps>
    }

    fn misc(&self) -> Arc<dyn MiscOps> {
        Arc::clone(&self.misc) as Arc<dyn MiscOps>
    }

    fn dll(&self) -> Arc<dyn DllOps> {
        Arc::clone(&self.dll) as Arc<dyn DllOps>
    }
}

// =============================================================================
// Compression
// =============================================================================

struct PortableZip;

impl ZipOps for PortableZip {
    fn compress(&self, dest: &mut [u8], dest_len: &mut u64, src: &[u8], src_len: u64) -> i32 {
        let src = &src[..src_len as usize];
        let cap = (*dest_len as usize).min(dest.len());
        let mut stream = Compress::new(Compression::default(), true);
        match stream.compress(src, &mut dest[..cap], FlushCompress::Finish) {
            Ok(Status::StreamEnd) => {
                *dest_len = stream.total_out();
                zip_status::OK
            }
            // Finish without StreamEnd means the output did not fit.
            Ok(_) => zip_status::BUF_ERROR,
            Err(_) => zip_status::MEM_ERROR,
        }
    }

    fn uncompress(&self, dest: &mut [u8], dest_len: &mut u64, src: &[u8], src_len: u64) -> i32 {
        let src = &src[..src_len as usize];
        let cap = (*dest_len as usize).min(dest.len());
        let mut stream = Decompress::new(true);
        match stream.decompress(src, &mut dest[..cap], FlushDecompress::Finish) {
            Ok(Status::StreamEnd) => {
                *dest_len = stream.total_out();
                zip_status::OK
            }
            Ok(_) => zip_status::BUF_ERROR,
            Err(_) => zip_status::DATA_ERROR,
        }
    }
}

// =============================================================================
// Linear algebra
// =============================================================================

struct PortableLapack;

impl LapackOps for PortableLapack {
    fn ilaver(&self, version: &mut [i32; 3]) {
        // Version the portable kernels claim compatibility with.
        *version = [3, 10, 1];
    }

    fn dpotrf(&self, uplo: u8, n: i32, a: &mut [f64], lda: i32) -> i32 {
        let n = n as usize;
        let lda = lda as usize;
        let upper = uplo == b'U' || uplo == b'u';
        // Up-looking Cholesky, column-major, touching only the factor
        // triangle like the reference routine.
        for j in 0..n {
            let mut diag = a[j + j * lda];
            for k in 0..j {
                let v = if upper { a[k + j * lda] } else { a[j + k * lda] };
                diag -= v * v;
            }
            if diag <= 0.0 || !diag.is_finite() {
                return (j + 1) as i32;
            }
            let diag = diag.sqrt();
            a[j + j * lda] = diag;
            for i in (j + 1)..n {
                let mut s = if upper { a[j + i * lda] } else { a[i + j * lda] };
                for k in 0..j {
                    s -= if upper {
                        a[k + i * lda] * a[k + j * lda]
                    } else {
                        a[i + k * lda] * a[j + k * lda]
                    };
                }
                let v = s / diag;
                if upper {
                    a[j + i * lda] = v;
                } else {
                    a[i + j * lda] = v;
                }
            }
        }
        0
    }

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
    ) {
        let ldx = ldx as usize;
        let n = n as usize;
        let p = p as usize;

        let col_norm = |x: &[f64], from_row: usize, col: usize| -> f64 {
            let mut s = 0.0;
            for i in from_row..n {
                let v = x[i + col * ldx];
                s += v * v;
            }
            s.sqrt()
        };

        // Original column norms; `work` keeps them for the tolerance test.
        for j in 0..p {
            qraux[j] = col_norm(x, 0, j);
            work[j] = qraux[j];
            pivot[j] = (j + 1) as i32;
        }

        let lup = n.min(p);
        let mut k = p;
        let mut l = 0;
        while l < lup.min(k) {
            // Cycle negligible columns to the right; they no longer take
            // part in the factorization.
            while l < k && qraux[l] < work[l] * tol {
                for i in 0..n {
                    let moved = x[i + l * ldx];
                    for j in l..(p - 1) {
                        x[i + j * ldx] = x[i + (j + 1) * ldx];
                    }
                    x[i + (p - 1) * ldx] = moved;
                }
                let moved_piv = pivot[l];
                let moved_qraux = qraux[l];
                let moved_work = work[l];
                for j in l..(p - 1) {
                    pivot[j] = pivot[j + 1];
                    qraux[j] = qraux[j + 1];
                    work[j] = work[j + 1];
                }
                pivot[p - 1] = moved_piv;
                qraux[p - 1] = moved_qraux;
                work[p - 1] = moved_work;
                k -= 1;
            }
            if l >= k {
                break;
            }

            // Householder reflection for column l.
            let mut nrmxl = col_norm(x, l, l);
            if nrmxl != 0.0 {
                if x[l + l * ldx] < 0.0 {
                    nrmxl = -nrmxl;
                }
                for i in l..n {
                    x[i + l * ldx] /= nrmxl;
                }
                x[l + l * ldx] += 1.0;
                for j in (l + 1)..p {
                    let mut t = 0.0;
                    for i in l..n {
                        t += x[i + l * ldx] * x[i + j * ldx];
                    }
                    t = -t / x[l + l * ldx];
                    for i in l..n {
                        x[i + j * ldx] += t * x[i + l * ldx];
                    }
                    qraux[j] = col_norm(x, l + 1, j);
                }
                qraux[l] = x[l + l * ldx];
                x[l + l * ldx] = -nrmxl;
            }
            l += 1;
        }
        *rank = k.min(lup) as i32;
    }
}

// =============================================================================
// User RNG
// =============================================================================

struct PortableRng {
    state: Mutex<RngState>,
}

struct RngState {
    rng: ChaCha20Rng,
    seed_vec: [i32; 8],
}

impl PortableRng {
    fn new() -> Self {
        Self {
            state: Mutex::new(RngState::from_seed(0)),
        }
    }
}

impl RngState {
    fn from_seed(seed: i32) -> Self {
        // Spread the scalar seed across the generator's seed vector the way
        // the reference user RNG scrambles its seed array.
        let mut seed_vec = [0i32; 8];
        let mut s = seed as u32;
        for slot in seed_vec.iter_mut() {
            s = s.wrapping_mul(69069).wrapping_add(1);
            *slot = s as i32;
        }
        let mut bytes = [0u8; 32];
        for (chunk, v) in bytes.chunks_exact_mut(4).zip(seed_vec.iter()) {
            chunk.copy_from_slice(&v.to_le_bytes());
        }
        Self {
            rng: ChaCha20Rng::from_seed(bytes),
            seed_vec,
        }
    }
}

impl RngOps for PortableRng {
    fn init(&self, seed: i32) {
        *self.state.lock() = RngState::from_seed(seed);
    }

    fn rand(&self) -> f64 {
        // 53-bit uniform in [0, 1).
        let bits = self.state.lock().rng.next_u64() >> 11;
        bits as f64 / (1u64 << 53) as f64
    }

    fn n_seed(&self) -> i32 {
        8
    }

    fn seeds(&self, out: &mut [i32]) {
        let state = self.state.lock();
        for (dst, src) in out.iter_mut().zip(state.seed_vec.iter()) {
            *dst = *src;
        }
    }
}

// =============================================================================
// Pattern matching
// =============================================================================

/// PCRE option bit understood by the portable engine.
pub const PCRE_CASELESS: u32 = 0x1;

struct PortablePcre {
    patterns: Mutex<PatternTable>,
}

struct PatternTable {
    by_code: HashMap<usize, Regex>,
    next_code: usize,
}

impl PortablePcre {
    fn new() -> Self {
        Self {
            patterns: Mutex::new(PatternTable {
                by_code: HashMap::new(),
                next_code: 1,
            }),
        }
    }
}

impl PcreOps for PortablePcre {
    fn maketables(&self) -> usize {
        // The portable engine is locale-independent; the default tables are
        // the only tables.
        0
    }

    fn compile(
        &self,
        pattern: &str,
        options: u32,
        _tables: usize,
    ) -> Result<usize, PcreCompileError> {
        let translated = if options & PCRE_CASELESS != 0 {
            format!("(?i){}", pattern)
        } else {
            pattern.to_string()
        };
        match Regex::new(&translated) {
            Ok(regex) => {
                let mut table = self.patterns.lock();
                let code = table.next_code;
                table.next_code += 1;
                table.by_code.insert(code, regex);
                Ok(code)
            }
            Err(err) => Err(PcreCompileError {
                message: err.to_string(),
                // The portable engine does not track the failing position;
                // report the pattern end like PCRE does for truncation
                // errors.
                offset: pattern.len(),
            }),
        }
    }

    fn capture_count(&self, code: usize) -> i32 {
        match self.patterns.lock().by_code.get(&code) {
            Some(regex) => (regex.captures_len() - 1) as i32,
            None => -1,
        }
    }

    fn exec(
        &self,
        code: usize,
        subject: &str,
        start: i32,
        _options: u32,
        ovector: &mut [i32],
    ) -> i32 {
        let table = self.patterns.lock();
        let regex = match table.by_code.get(&code) {
            Some(regex) => regex,
            None => return -2,
        };
        let start = (start.max(0) as usize).min(subject.len());
        let captures = match regex.captures_at(subject, start) {
            Some(captures) => captures,
            None => return -1,
        };
        let groups = captures.len();
        let pairs = ovector.len() / 2;
        for slot in 0..pairs.min(groups) {
            match captures.get(slot) {
                Some(m) => {
                    ovector[2 * slot] = m.start() as i32;
                    ovector[2 * slot + 1] = m.end() as i32;
                }
                None => {
                    ovector[2 * slot] = -1;
                    ovector[2 * slot + 1] = -1;
                }
            }
        }
        if groups > pairs {
            // PCRE convention: 0 means the ovector was too small.
            0
        } else {
            groups as i32
        }
    }
}

// =============================================================================
// Misc
// =============================================================================

struct PortableMisc;

impl MiscOps for PortableMisc {
    fn exact_sum(&self, values: &[f64], has_na: bool, na_rm: bool) -> f64 {
        // Neumaier compensated summation; NA travels as NaN.
        let mut sum = 0.0;
        let mut comp = 0.0;
        for &v in values {
            if has_na && v.is_nan() {
                if na_rm {
                    continue;
                }
                return f64::NAN;
            }
            let t = sum + v;
            if sum.abs() >= v.abs() {
                comp += (sum - t) + v;
            } else {
                comp += (v - t) + sum;
            }
            sum = t;
        }
        sum + comp
    }
}

// =============================================================================
// Dynamic loading (shared with the native backend)
// =============================================================================

impl DllOps for RegistryDll {
    fn dlopen(&self, path: &Path) -> BridgeResult<Arc<Module>> {
        self.libraries().load(path)
    }

    fn dlsym(&self, module: &Module, name: &str) -> BridgeResult<SymbolAddr> {
        module.lookup(name)
    }
}
