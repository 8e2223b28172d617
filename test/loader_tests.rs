//! Library registry behavior through the public opener seam.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ferrule::loader::{
    DynamicSymbol, LibPaths, LibraryRegistry, ModuleOpener, OpenedModule, SymbolAddr,
};
use ferrule::{BridgeConfig, BridgeContext, BridgeError, BridgeResult, BridgeState};

/// Opener that counts real loads and serves a fixed symbol table.
struct CountingOpener {
    loads: Arc<AtomicUsize>,
    symbols: HashMap<String, SymbolAddr>,
}

impl CountingOpener {
    fn new(symbols: &[(&str, SymbolAddr)]) -> (Self, Arc<AtomicUsize>) {
        let loads = Arc::new(AtomicUsize::new(0));
        (
            Self {
                loads: Arc::clone(&loads),
                symbols: symbols.iter().map(|(n, a)| (n.to_string(), *a)).collect(),
            },
            loads,
        )
    }
}

impl ModuleOpener for CountingOpener {
    fn open(&self, _path: &Path) -> BridgeResult<Box<dyn OpenedModule>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(TableModule {
            symbols: self.symbols.clone(),
        }))
    }
}

struct TableModule {
    symbols: HashMap<String, SymbolAddr>,
}

impl OpenedModule for TableModule {
    fn symbol(&self, name: &str) -> Option<SymbolAddr> {
        self.symbols.get(name).copied()
    }
}

/// Opener that always fails, for load-error surface checks.
struct FailingOpener;

impl ModuleOpener for FailingOpener {
    fn open(&self, path: &Path) -> BridgeResult<Box<dyn OpenedModule>> {
        Err(BridgeError::LoadError {
            path: path.display().to_string(),
            reason: "no such file".to_string(),
        })
    }
}

#[test]
fn repeated_loads_resolve_identically_with_one_real_load() {
    let (opener, loads) = CountingOpener::new(&[("dqrdc2_", 0xABC0), ("dpotrf_", 0xABC8)]);
    let registry = LibraryRegistry::new(Box::new(opener));
    let path = Path::new("/opt/ferrule/lib/libappl.so");

    let a = registry.load(path).unwrap();
    let b = registry.load(path).unwrap();

    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert_eq!(a.lookup("dqrdc2_").unwrap(), b.lookup("dqrdc2_").unwrap());
    assert_eq!(a.lookup("dpotrf_").unwrap(), b.lookup("dpotrf_").unwrap());
    assert_eq!(registry.loaded_count(), 1);
}

#[test]
fn distinct_paths_load_distinct_modules() {
    let (opener, loads) = CountingOpener::new(&[("entry", 0x1)]);
    let registry = LibraryRegistry::new(Box::new(opener));
    registry.load(Path::new("/opt/ferrule/lib/liba.so")).unwrap();
    registry.load(Path::new("/opt/ferrule/lib/libb.so")).unwrap();
    assert_eq!(loads.load(Ordering::SeqCst), 2);
    assert_eq!(registry.loaded_count(), 2);
}

#[test]
fn load_failure_is_typed_and_not_cached() {
    let registry = LibraryRegistry::new(Box::new(FailingOpener));
    let path = Path::new("/opt/ferrule/lib/libmissing.so");
    match registry.load(path) {
        Err(BridgeError::LoadError { path: p, .. }) => {
            assert!(p.contains("libmissing"));
        }
        other => panic!("expected LoadError, got {:?}", other.map(|m| m.name().to_string())),
    }
    assert_eq!(registry.loaded_count(), 0);
}

#[test]
fn missing_symbol_never_yields_a_stub() {
    let (opener, _) = CountingOpener::new(&[("real_entry", 0x2)]);
    let registry = LibraryRegistry::new(Box::new(opener));
    let module = registry.load(Path::new("/opt/ferrule/lib/libx.so")).unwrap();
    match module.lookup("imaginary_entry") {
        Err(BridgeError::SymbolNotFound { name, module }) => {
            assert_eq!(name, "imaginary_entry");
            assert_eq!(module, "x");
        }
        other => panic!("expected SymbolNotFound, got {:?}", other),
    }
}

#[test]
fn dynamic_symbols_carry_arity_and_shadow_the_linker_table() {
    let (opener, _) = CountingOpener::new(&[("pkg_init", 0x30)]);
    let registry = LibraryRegistry::new(Box::new(opener));
    let module = registry.load(Path::new("/opt/ferrule/lib/libstats.so")).unwrap();

    module
        .register_dynamic_symbols(vec![
            DynamicSymbol {
                name: "c_filter".to_string(),
                addr: 0x40,
                arity: 3,
            },
            DynamicSymbol {
                name: "pkg_init".to_string(),
                addr: 0x50,
                arity: 0,
            },
        ])
        .unwrap();

    assert_eq!(module.lookup("c_filter").unwrap(), 0x40);
    assert_eq!(module.dynamic_symbol("c_filter").unwrap().arity, 3);
    // registered address wins over the linker's
    assert_eq!(module.lookup("pkg_init").unwrap(), 0x50);
}

#[test]
fn contexts_sharing_one_state_share_the_module_cache() {
    let (opener, loads) = CountingOpener::new(&[("entry", 0x1)]);
    let state = BridgeState::with_opener(BridgeConfig::default(), Box::new(opener)).unwrap();
    let a = BridgeContext::from_state(Arc::clone(&state));
    let b = BridgeContext::from_state(state);

    let path = Path::new("/opt/ferrule/lib/libshared.so");
    a.libraries().load(path).unwrap();
    b.libraries().load(path).unwrap();

    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert!(Arc::ptr_eq(a.libraries(), b.libraries()));
    // one backend singleton behind both contexts
    assert!(Arc::ptr_eq(&a.backend().unwrap(), &b.backend().unwrap()));
}

#[test]
fn bootstrap_is_the_single_prepaved_load() {
    let (opener, loads) = CountingOpener::new(&[("ferrule_compress", 0x60)]);
    let paths = LibPaths::new("/opt/ferrule");
    let runtime_path = paths.builtin_lib("ferrulert");

    let (registry, runtime) =
        LibraryRegistry::bootstrap(Box::new(opener), &runtime_path).unwrap();
    assert_eq!(runtime.name(), "ferrulert");
    assert_eq!(loads.load(Ordering::SeqCst), 1);

    // generic loads of the same path stay cached
    let again = registry.load(&runtime_path).unwrap();
    assert!(Arc::ptr_eq(&runtime, &again));
    assert_eq!(loads.load(Ordering::SeqCst), 1);
}
