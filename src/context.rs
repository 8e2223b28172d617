//! Bridge Context
//!
//! Native state is process-wide: loaded libraries stay loaded, their symbols
//! are globally visible, and the backend is a singleton. [`BridgeState`]
//! owns that shared layer (configuration, library registry, backend); every
//! [`BridgeContext`] in the process hands out the same state, so a path is
//! loaded through the dynamic linker once no matter how many contexts ask.
//!
//! What is per context is the re-entry machinery: the upcall table and the
//! handle table for the context's single managed thread. The context owns no
//! evaluator state; upcalls that need the evaluator receive an
//! [`EvalDelegate`] per dispatch.

use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::backend::{Backend, BackendRegistry};
use crate::config::BridgeConfig;
use crate::error::BridgeResult;
use crate::handles::HandleTable;
use crate::loader::{DlOpener, LibPaths, LibraryRegistry, ModuleOpener};
use crate::upcall::{EvalDelegate, NativeArg, UpcallContext, UpcallResult, UpcallTable};

static PROCESS_STATE: OnceCell<Arc<BridgeState>> = OnceCell::new();

/// The process-wide half of the bridge: configuration, the library
/// registry, and the backend constructed at startup.
pub struct BridgeState {
    config: BridgeConfig,
    lib_paths: LibPaths,
    libraries: Arc<LibraryRegistry>,
    backends: BackendRegistry,
}

impl BridgeState {
    /// Build a state with a custom module opener. Contexts created from one
    /// state share its registry and backend; production code goes through
    /// [`BridgeContext::new`], which caches the state for the process.
    pub fn with_opener(
        config: BridgeConfig,
        opener: Box<dyn ModuleOpener>,
    ) -> BridgeResult<Arc<Self>> {
        let lib_paths = LibPaths::new(config.install.root.clone());
        let libraries = Arc::new(LibraryRegistry::new(opener));
        let backends = BackendRegistry::new();
        backends.initialize(&config, Arc::clone(&libraries))?;
        Ok(Arc::new(Self {
            config,
            lib_paths,
            libraries,
            backends,
        }))
    }

    /// The state shared by every context in the process, created on the
    /// first call. The first context's configuration wins; later calls get
    /// the cached state regardless of the configuration they pass.
    fn global(config: BridgeConfig) -> BridgeResult<Arc<Self>> {
        PROCESS_STATE
            .get_or_try_init(|| Self::with_opener(config, Box::new(DlOpener)))
            .cloned()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn lib_paths(&self) -> &LibPaths {
        &self.lib_paths
    }

    pub fn libraries(&self) -> &Arc<LibraryRegistry> {
        &self.libraries
    }

    /// The backend constructed at startup.
    pub fn backend(&self) -> BridgeResult<Arc<dyn Backend>> {
        self.backends.active()
    }
}

/// One guest context's view of the bridge: the shared process state plus
/// this context's upcall table and handle table.
pub struct BridgeContext {
    state: Arc<BridgeState>,
    upcalls: UpcallTable,
    handles: HandleTable,
}

impl BridgeContext {
    /// Build a context against the process-wide state, creating it on first
    /// use with the platform dynamic linker. The configured backend is
    /// constructed then, at startup, not on first use.
    pub fn new(config: BridgeConfig) -> BridgeResult<Self> {
        Ok(Self::from_state(BridgeState::global(config)?))
    }

    /// Build a context over an isolated state with a custom module opener
    /// (test seam; production contexts share the process state).
    pub fn with_opener(
        config: BridgeConfig,
        opener: Box<dyn ModuleOpener>,
    ) -> BridgeResult<Self> {
        Ok(Self::from_state(BridgeState::with_opener(config, opener)?))
    }

    /// Build a context sharing an existing state.
    pub fn from_state(state: Arc<BridgeState>) -> Self {
        Self {
            state,
            upcalls: UpcallTable::new(),
            handles: HandleTable::new(),
        }
    }

    pub fn state(&self) -> &Arc<BridgeState> {
        &self.state
    }

    pub fn config(&self) -> &BridgeConfig {
        self.state.config()
    }

    pub fn lib_paths(&self) -> &LibPaths {
        self.state.lib_paths()
    }

    pub fn libraries(&self) -> &Arc<LibraryRegistry> {
        self.state.libraries()
    }

    /// The backend constructed at startup.
    pub fn backend(&self) -> BridgeResult<Arc<dyn Backend>> {
        self.state.backend()
    }

    pub fn handles(&mut self) -> &mut HandleTable {
        &mut self.handles
    }

    /// Dispatch an upcall arriving from native code, re-entering the
    /// evaluator synchronously on the current stack.
    pub fn upcall(
        &mut self,
        eval: &mut dyn EvalDelegate,
        index: u32,
        args: &[NativeArg],
    ) -> BridgeResult<UpcallResult> {
        let mut ctx = UpcallContext::new(&mut self.handles, eval);
        self.upcalls.dispatch(&mut ctx, index, args)
    }
}
