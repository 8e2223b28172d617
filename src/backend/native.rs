//! Direct Native-Call Backend
//!
//! Executes every downcall group through the companion runtime library
//! (`ferrulert`), a compiled artifact shipped under the installation root.
//! The library is loaded once per process with global symbol visibility so
//! extension modules loaded later can resolve the symbols it defines,
//! following classic dynamic-library resolution semantics.
//!
//! Every required entry point is resolved at construction; a missing
//! library or symbol fails construction with a typed error, so a partially
//! wired backend can never be observed.

use std::ffi::{c_char, CString};
use std::path::Path;
use std::sync::Arc;

use crate::config::BackendKind;
use crate::error::BridgeResult;
use crate::loader::{LibPaths, LibraryRegistry, Module};
use crate::nodes::{
    DllOps, LapackOps, MiscOps, PcreCompileError, PcreOps, RngOps, ZipOps,
};

use super::{Backend, RegistryDll};

// Companion runtime ABI. Rust FFI requires the exact signature at compile
// time; each entry point gets its own typed alias, resolved by address and
// transmuted once at construction.
type CompressFn = unsafe extern "C" fn(*mut u8, *mut u64, *const u8, u64) -> i32;
type IlaverFn = unsafe extern "C" fn(*mut i32, *mut i32, *mut i32);
type DpotrfFn =
    unsafe extern "C" fn(*const c_char, *const i32, *mut f64, *const i32, *mut i32);
type Dqrdc2Fn = unsafe extern "C" fn(
    *mut f64,
    *const i32,
    *const i32,
    *const i32,
    *const f64,
    *mut i32,
    *mut f64,
    *mut i32,
    *mut f64,
);
type UnifInitFn = unsafe extern "C" fn(i32);
type UnifRandFn = unsafe extern "C" fn() -> *const f64;
type UnifNseedFn = unsafe extern "C" fn() -> *const i32;
type UnifSeedlocFn = unsafe extern "C" fn() -> *const i32;
type PcreMaketablesFn = unsafe extern "C" fn() -> *const u8;
type PcreCompileFn = unsafe extern "C" fn(
    *const c_char,
    i32,
    *mut *const c_char,
    *mut i32,
    *const u8,
) -> *const ();
type PcreFullinfoFn =
    unsafe extern "C" fn(*const (), *const (), i32, *mut i32) -> i32;
type PcreExecFn = unsafe extern "C" fn(
    *const (),
    *const (),
    *const c_char,
    i32,
    i32,
    i32,
    *mut i32,
    i32,
) -> i32;
type ExactSumFn = unsafe extern "C" fn(*const f64, i32, i32, i32) -> f64;

const PCRE_INFO_CAPTURECOUNT: i32 = 2;

pub struct NativeBackend {
    zip: Arc<NativeZip>,
    lapack: Arc<NativeLapack>,
    rng: Arc<NativeRng>,
    pcre: Arc<NativePcre>,
    misc: Arc<NativeMisc>,
    dll: Arc<RegistryDll>,
    // Keeps the companion library module (and thus the transmuted fn
    // pointers) alive for the backend's lifetime.
    _runtime: Arc<Module>,
}

impl NativeBackend {
    /// Load the companion runtime library and resolve every entry point.
    pub fn new(paths: &LibPaths, libraries: Arc<LibraryRegistry>) -> BridgeResult<Self> {
        let runtime = libraries.load(&paths.builtin_lib("ferrulert"))?;
        Self::from_runtime(runtime, libraries)
    }

    /// Wire the backend against an already-loaded runtime module (the
    /// bootstrap path hands its module in directly).
    pub fn from_runtime(
        runtime: Arc<Module>,
        libraries: Arc<LibraryRegistry>,
    ) -> BridgeResult<Self> {
        // Resolution order follows group construction; the first missing
        // symbol aborts with SymbolNotFound.
        let zip = Arc::new(NativeZip {
            compress: resolve(&runtime, "ferrule_compress")?,
            uncompress: resolve(&runtime, "ferrule_uncompress")?,
        });
        let lapack = Arc::new(NativeLapack {
            ilaver: resolve(&runtime, "ilaver_")?,
            dpotrf: resolve(&runtime, "dpotrf_")?,
            dqrdc2: resolve(&runtime, "dqrdc2_")?,
        });
        let rng = Arc::new(NativeRng {
            init: resolve(&runtime, "user_unif_init")?,
            rand: resolve(&runtime, "user_unif_rand")?,
            nseed: resolve(&runtime, "user_unif_nseed")?,
            seedloc: resolve(&runtime, "user_unif_seedloc")?,
        });
        let pcre = Arc::new(NativePcre {
            maketables: resolve(&runtime, "pcre_maketables")?,
            compile: resolve(&runtime, "pcre_compile")?,
            fullinfo: resolve(&runtime, "pcre_fullinfo")?,
            exec: resolve(&runtime, "pcre_exec")?,
        });
        let misc = Arc::new(NativeMisc {
            exact_sum: resolve(&runtime, "ferrule_exact_sum")?,
        });
        Ok(Self {
            zip,
            lapack,
            rng,
            pcre,
            misc,
            dll: Arc::new(RegistryDll::new(libraries)),
            _runtime: runtime,
        })
    }
}

/// Resolve `name` in the runtime module and reinterpret the address as the
/// entry point's function type.
fn resolve<F: Copy>(runtime: &Module, name: &str) -> BridgeResult<F> {
    assert_eq!(
        std::mem::size_of::<F>(),
        std::mem::size_of::<usize>(),
        "entry point type must be a bare function pointer"
    );
    let addr = runtime.lookup(name)?;
    // Safety: the address came from the dynamic linker for this symbol; the
    // signature contract is the companion library's ABI.
    Ok(unsafe { std::mem::transmute_copy::<usize, F>(&addr) })
}

struct NativeZip {
    compress: CompressFn,
    uncompress: CompressFn,
}

impl ZipOps for NativeZip {
    fn compress(&self, dest: &mut [u8], dest_len: &mut u64, src: &[u8], src_len: u64) -> i32 {
        unsafe { (self.compress)(dest.as_mut_ptr(), dest_len, src.as_ptr(), src_len) }
    }

    fn uncompress(&self, dest: &mut [u8], dest_len: &mut u64, src: &[u8], src_len: u64) -> i32 {
        unsafe { (self.uncompress)(dest.as_mut_ptr(), dest_len, src.as_ptr(), src_len) }
    }
}

struct NativeLapack {
    ilaver: IlaverFn,
    dpotrf: DpotrfFn,
    dqrdc2: Dqrdc2Fn,
}

impl LapackOps for NativeLapack {
    fn ilaver(&self, version: &mut [i32; 3]) {
        let mut major = 0;
        let mut minor = 0;
        let mut patch = 0;
        unsafe { (self.ilaver)(&mut major, &mut minor, &mut patch) };
        *version = [major, minor, patch];
    }

    fn dpotrf(&self, uplo: u8, n: i32, a: &mut [f64], lda: i32) -> i32 {
        let uplo = uplo as c_char;
        let mut info = 0;
        unsafe { (self.dpotrf)(&uplo, &n, a.as_mut_ptr(), &lda, &mut info) };
        info
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
        unsafe {
            (self.dqrdc2)(
                x.as_mut_ptr(),
                &ldx,
                &n,
                &p,
                &tol,
                rank,
                qraux.as_mut_ptr(),
                pivot.as_mut_ptr(),
                work.as_mut_ptr(),
            )
        };
    }
}

struct NativeRng {
    init: UnifInitFn,
    rand: UnifRandFn,
    nseed: UnifNseedFn,
    seedloc: UnifSeedlocFn,
}

impl RngOps for NativeRng {
    fn init(&self, seed: i32) {
        unsafe { (self.init)(seed) };
    }

    fn rand(&self) -> f64 {
        // The user RNG contract returns a pointer to the draw.
        unsafe { *(self.rand)() }
    }

    fn n_seed(&self) -> i32 {
        unsafe { *(self.nseed)() }
    }

    fn seeds(&self, out: &mut [i32]) {
        let n = self.n_seed().max(0) as usize;
        let loc = unsafe { (self.seedloc)() };
        for (i, slot) in out.iter_mut().take(n).enumerate() {
            *slot = unsafe { *loc.add(i) };
        }
    }
}

struct NativePcre {
    maketables: PcreMaketablesFn,
    compile: PcreCompileFn,
    fullinfo: PcreFullinfoFn,
    exec: PcreExecFn,
}

impl PcreOps for NativePcre {
    fn maketables(&self) -> usize {
        unsafe { (self.maketables)() as usize }
    }

    fn compile(
        &self,
        pattern: &str,
        options: u32,
        tables: usize,
    ) -> Result<usize, PcreCompileError> {
        let c_pattern = CString::new(pattern).map_err(|_| PcreCompileError {
            message: "pattern contains NUL".to_string(),
            offset: 0,
        })?;
        let mut error: *const c_char = std::ptr::null();
        let mut offset: i32 = 0;
        let code = unsafe {
            (self.compile)(
                c_pattern.as_ptr(),
                options as i32,
                &mut error,
                &mut offset,
                tables as *const u8,
            )
        };
        if code.is_null() {
            let message = if error.is_null() {
                "pattern compilation failed".to_string()
            } else {
                unsafe { std::ffi::CStr::from_ptr(error) }
                    .to_string_lossy()
                    .into_owned()
            };
            return Err(PcreCompileError {
                message,
                offset: offset.max(0) as usize,
            });
        }
        Ok(code as usize)
    }

    fn capture_count(&self, code: usize) -> i32 {
        let mut count = 0;
        let rc = unsafe {
            (self.fullinfo)(
                code as *const (),
                std::ptr::null(),
                PCRE_INFO_CAPTURECOUNT,
                &mut count,
            )
        };
        if rc != 0 {
            return -1;
        }
        count
    }

    fn exec(
        &self,
        code: usize,
        subject: &str,
        start: i32,
        options: u32,
        ovector: &mut [i32],
    ) -> i32 {
        unsafe {
            (self.exec)(
                code as *const (),
                std::ptr::null(),
                subject.as_ptr() as *const c_char,
                subject.len() as i32,
                start,
                options as i32,
                ovector.as_mut_ptr(),
                ovector.len() as i32,
            )
        }
    }
}

struct NativeMisc {
    exact_sum: ExactSumFn,
}

impl MiscOps for NativeMisc {
    fn exact_sum(&self, values: &[f64], has_na: bool, na_rm: bool) -> f64 {
        unsafe {
            (self.exact_sum)(
                values.as_ptr(),
                values.len() as i32,
                has_na as i32,
                na_rm as i32,
            )
        }
    }
}

impl Backend for NativeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Native
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
