//! Library Loader & Symbol Registry
//!
//! Loads native extension modules and resolves their symbols. Loading is a
//! process-wide, one-time, idempotent side effect: repeated loads of the same
//! path return the cached [`Module`] and touch the dynamic linker exactly
//! once. On Unix, libraries are opened with `RTLD_NOW | RTLD_GLOBAL` because
//! extension modules routinely reference symbols defined by previously
//! loaded modules; local visibility would break that resolution chain.
//!
//! Bootstrapping: the companion runtime library backs the loader's own
//! native implementation, so it cannot be loaded through the generic
//! registry; [`LibraryRegistry::bootstrap`] is the single hand-written
//! exception that loads it while constructing the registry itself.

mod paths;

pub use paths::{LibPaths, LIB_PREFIX, LIB_SUFFIX};

use std::collections::HashMap;
use std::ffi::CString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::RwLock;

use crate::error::{BridgeError, BridgeResult};

/// Resolved address of a native symbol.
pub type SymbolAddr = usize;

/// A symbol registered by a module's init routine, with its call arity.
#[derive(Debug, Clone)]
pub struct DynamicSymbol {
    pub name: String,
    pub addr: SymbolAddr,
    pub arity: usize,
}

/// How raw modules are opened. The production opener goes through
/// `libloading`; tests substitute a counting fake.
pub trait ModuleOpener: Send + Sync {
    fn open(&self, path: &Path) -> BridgeResult<Box<dyn OpenedModule>>;
}

/// An opened native module, queried for symbol addresses.
pub trait OpenedModule: Send + Sync {
    fn symbol(&self, name: &str) -> Option<SymbolAddr>;
}

/// Production opener backed by the platform dynamic linker.
pub struct DlOpener;

impl ModuleOpener for DlOpener {
    fn open(&self, path: &Path) -> BridgeResult<Box<dyn OpenedModule>> {
        let library = open_global(path)?;
        Ok(Box::new(DlModule { library }))
    }
}

struct DlModule {
    library: libloading::Library,
}

impl OpenedModule for DlModule {
    fn symbol(&self, name: &str) -> Option<SymbolAddr> {
        let c_name = CString::new(name).ok()?;
        // Safety: the symbol is only used as an opaque address; typing is
        // enforced at the call site by the downcall node signatures.
        let symbol: libloading::Symbol<'_, *const ()> =
            unsafe { self.library.get(c_name.as_bytes_with_nul()).ok()? };
        Some(*symbol as SymbolAddr)
    }
}

/// Open a library with global symbol visibility where the platform supports
/// it.
fn open_global(path: &Path) -> BridgeResult<libloading::Library> {
    let load_error = |e: libloading::Error| BridgeError::LoadError {
        path: path.display().to_string(),
        reason: e.to_string(),
    };

    #[cfg(unix)]
    {
        use libloading::os::unix::Library as UnixLibrary;
        // Safety: loading a shared library runs its initializers; the path
        // comes from the configured installation root.
        let library = unsafe {
            UnixLibrary::open(Some(path), libc::RTLD_NOW | libc::RTLD_GLOBAL)
                .map_err(load_error)?
        };
        Ok(library.into())
    }

    #[cfg(not(unix))]
    {
        // Windows has no RTLD_GLOBAL equivalent; extension modules there
        // link against the runtime import library instead.
        let library = unsafe { libloading::Library::new(path).map_err(load_error)? };
        Ok(library)
    }
}

/// A loaded native module with its symbol tables.
///
/// The dlsym-backed table is cached per name and effectively immutable: a
/// name either resolves to the same address for the process lifetime or
/// never resolves at all. Dynamic symbols (registered by the module's init
/// routine) are installed exactly once.
pub struct Module {
    name: String,
    path: PathBuf,
    handle: Box<dyn OpenedModule>,
    symbol_cache: RwLock<HashMap<String, SymbolAddr>>,
    dynamic_symbols: OnceCell<HashMap<String, DynamicSymbol>>,
}

impl Module {
    fn new(name: String, path: PathBuf, handle: Box<dyn OpenedModule>) -> Self {
        Self {
            name,
            path,
            handle,
            symbol_cache: RwLock::new(HashMap::new()),
            dynamic_symbols: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolve a symbol, preferring dynamically registered symbols over the
    /// linker table. A miss is a typed error; the registry never substitutes
    /// a stub.
    pub fn lookup(&self, name: &str) -> BridgeResult<SymbolAddr> {
        if let Some(dynamic) = self.dynamic_symbols.get() {
            if let Some(sym) = dynamic.get(name) {
                return Ok(sym.addr);
            }
        }
        if let Some(&addr) = self.symbol_cache.read().get(name) {
            return Ok(addr);
        }
        match self.handle.symbol(name) {
            Some(addr) => {
                self.symbol_cache.write().insert(name.to_string(), addr);
                Ok(addr)
            }
            None => Err(BridgeError::SymbolNotFound {
                name: name.to_string(),
                module: self.name.clone(),
            }),
        }
    }

    /// Dynamic symbol registered by the module's init routine, with arity.
    pub fn dynamic_symbol(&self, name: &str) -> Option<&DynamicSymbol> {
        self.dynamic_symbols.get().and_then(|m| m.get(name))
    }

    /// Install the module's dynamically registered symbols. One-shot: the
    /// table is immutable once built, and a second registration attempt is
    /// an error.
    pub fn register_dynamic_symbols(&self, symbols: Vec<DynamicSymbol>) -> BridgeResult<()> {
        let table: HashMap<String, DynamicSymbol> = symbols
            .into_iter()
            .map(|s| (s.name.clone(), s))
            .collect();
        self.dynamic_symbols
            .set(table)
            .map_err(|_| BridgeError::LoadError {
                path: self.path.display().to_string(),
                reason: "dynamic symbols already registered".to_string(),
            })
    }
}

/// Process-wide module registry. `load` is idempotent per path.
pub struct LibraryRegistry {
    opener: Box<dyn ModuleOpener>,
    modules: RwLock<ModuleTable>,
}

/// Loaded modules, indexed by path and kept in load order for global
/// symbol resolution.
#[derive(Default)]
struct ModuleTable {
    by_path: HashMap<PathBuf, Arc<Module>>,
    order: Vec<Arc<Module>>,
}

impl ModuleTable {
    fn insert(&mut self, path: PathBuf, module: Arc<Module>) {
        self.by_path.insert(path, Arc::clone(&module));
        self.order.push(module);
    }
}

impl LibraryRegistry {
    pub fn new(opener: Box<dyn ModuleOpener>) -> Self {
        Self {
            opener,
            modules: RwLock::new(ModuleTable::default()),
        }
    }

    /// Construct the registry and load the companion runtime library in one
    /// step. This is the bootstrap path: the runtime library must be present
    /// before any generic load can run, so it cannot itself go through
    /// [`LibraryRegistry::load`].
    pub fn bootstrap(
        opener: Box<dyn ModuleOpener>,
        runtime_path: &Path,
    ) -> BridgeResult<(Self, Arc<Module>)> {
        let handle = opener.open(runtime_path)?;
        let module = Arc::new(Module::new(
            "ferrulert".to_string(),
            runtime_path.to_path_buf(),
            handle,
        ));
        let registry = Self::new(opener);
        registry
            .modules
            .write()
            .insert(runtime_path.to_path_buf(), Arc::clone(&module));
        Ok((registry, module))
    }

    /// Load a module, or return the cached one for an already-loaded path.
    pub fn load(&self, path: &Path) -> BridgeResult<Arc<Module>> {
        if let Some(module) = self.modules.read().by_path.get(path) {
            return Ok(Arc::clone(module));
        }
        // Re-check under the write lock so a concurrent load of the same
        // path cannot hit the dynamic linker twice.
        let mut modules = self.modules.write();
        if let Some(module) = modules.by_path.get(path) {
            return Ok(Arc::clone(module));
        }
        let handle = self.opener.open(path)?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let name = name.strip_prefix(LIB_PREFIX).unwrap_or(&name).to_string();
        let module = Arc::new(Module::new(name, path.to_path_buf(), handle));
        modules.insert(path.to_path_buf(), Arc::clone(&module));
        Ok(module)
    }

    /// Module previously loaded from `path`, if any.
    pub fn get(&self, path: &Path) -> Option<Arc<Module>> {
        self.modules.read().by_path.get(path).cloned()
    }

    /// Find a loaded module by its logical name, earliest load first.
    pub fn find_by_name(&self, name: &str) -> Option<Arc<Module>> {
        self.modules
            .read()
            .order
            .iter()
            .find(|m| m.name() == name)
            .cloned()
    }

    /// Resolve `name` across all loaded modules in load order. Mirrors the
    /// global-visibility lookup native code gets from the dynamic linker:
    /// when two modules export the same symbol, the earlier load wins.
    pub fn lookup_global(&self, name: &str) -> BridgeResult<SymbolAddr> {
        for module in self.modules.read().order.iter() {
            if let Ok(addr) = module.lookup(name) {
                return Ok(addr);
            }
        }
        Err(BridgeError::SymbolNotFound {
            name: name.to_string(),
            module: "<any>".to_string(),
        })
    }

    pub fn loaded_count(&self) -> usize {
        self.modules.read().order.len()
    }
}
