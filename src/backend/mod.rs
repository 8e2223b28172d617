//! Backend Abstraction
//!
//! One contract, interchangeable execution strategies. A [`Backend`] hands
//! out the typed downcall groups; whether a group executes as a direct
//! native call through the companion runtime library or as an in-process
//! reimplementation is the backend's business and invisible to the
//! dispatch nodes.
//!
//! Backends are process-lifetime singletons. Selection happens once, at
//! context startup, through [`BackendRegistry::initialize`]: construction
//! runs under a single-acquisition lock and the result is cached for every
//! later accessor call. Construction failure is fatal to the requesting
//! call and is never silently retried.

mod native;
mod portable;

pub use native::NativeBackend;
pub use portable::{PortableBackend, PCRE_CASELESS};

use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::config::{BackendKind, BridgeConfig};
use crate::error::{BridgeError, BridgeResult};
use crate::loader::{LibPaths, LibraryRegistry};
use crate::nodes::{DllOps, LapackOps, MiscOps, PcreOps, RngOps, ZipOps};

/// The downcall-strategy contract: one accessor per native group.
pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;
    fn zip(&self) -> Arc<dyn ZipOps>;
    fn lapack(&self) -> Arc<dyn LapackOps>;
    fn rng(&self) -> Arc<dyn RngOps>;
    fn pcre(&self) -> Arc<dyn PcreOps>;
    fn misc(&self) -> Arc<dyn MiscOps>;
    fn dll(&self) -> Arc<dyn DllOps>;
}

/// Dynamic-loading group shared by both backends: the library registry is
/// process-wide state, so dlopen/dlsym behave identically regardless of how
/// the other groups execute.
pub struct RegistryDll {
    libraries: Arc<LibraryRegistry>,
}

impl RegistryDll {
    pub fn new(libraries: Arc<LibraryRegistry>) -> Self {
        Self { libraries }
    }

    pub fn libraries(&self) -> &LibraryRegistry {
        &self.libraries
    }
}

/// Initialize-once backend registry.
///
/// Contexts sharing one process share native state (symbol tables, globally
/// visible loaded libraries), so the backend cannot be duplicated per
/// context: construction is guarded by a lock acquired exactly once, and
/// every context after the first gets the cached instance.
pub struct BackendRegistry {
    cell: OnceCell<Arc<dyn Backend>>,
    init_lock: Mutex<()>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            cell: OnceCell::new(),
            init_lock: Mutex::new(()),
        }
    }

    /// Construct the configured backend. Errors if already initialized or if
    /// backend construction fails; a failed initialization leaves the
    /// registry empty and is not retried by this layer.
    pub fn initialize(
        &self,
        config: &BridgeConfig,
        libraries: Arc<LibraryRegistry>,
    ) -> BridgeResult<()> {
        let _guard = self.init_lock.lock();
        if self.cell.get().is_some() {
            return Err(BridgeError::BackendState("already initialized"));
        }
        let backend: Arc<dyn Backend> = match config.backend.kind {
            BackendKind::Portable => Arc::new(PortableBackend::new(libraries)),
            BackendKind::Native => {
                let paths = LibPaths::new(config.install.root.clone());
                Arc::new(NativeBackend::new(&paths, libraries)?)
            }
        };
        // Still under the guard; the cell cannot have been set concurrently.
        let _ = self.cell.set(backend);
        Ok(())
    }

    /// The active backend. Typed error before initialization; never
    /// constructs on demand.
    pub fn active(&self) -> BridgeResult<Arc<dyn Backend>> {
        self.cell
            .get()
            .cloned()
            .ok_or(BridgeError::BackendState("not initialized"))
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::tests::FakeOpener;

    fn test_registry() -> Arc<LibraryRegistry> {
        Arc::new(LibraryRegistry::new(Box::new(FakeOpener::new(&[]))))
    }

    #[test]
    fn test_initialize_once() {
        let backends = BackendRegistry::new();
        assert!(!backends.is_initialized());
        assert!(matches!(
            backends.active(),
            Err(BridgeError::BackendState("not initialized"))
        ));

        let config = BridgeConfig::default();
        backends.initialize(&config, test_registry()).unwrap();
        assert_eq!(backends.active().unwrap().kind(), BackendKind::Portable);

        let again = backends.initialize(&config, test_registry());
        assert!(matches!(
            again,
            Err(BridgeError::BackendState("already initialized"))
        ));
    }

    #[test]
    fn test_accessors_return_cached_groups() {
        let backends = BackendRegistry::new();
        backends
            .initialize(&BridgeConfig::default(), test_registry())
            .unwrap();
        let backend = backends.active().unwrap();
        let zip_a = backend.zip();
        let zip_b = backend.zip();
        assert!(Arc::ptr_eq(&zip_a, &zip_b));
    }
}
