//! Ferrule Native Interface Bridge
//!
//! The FFI layer of the Ferrule managed runtime: lets the evaluator call
//! into natively compiled extension libraries (downcalls) and lets native
//! code call back into the managed runtime (upcalls), behind interchangeable
//! execution backends.
//!
//! # Architecture
//!
//! ```text
//! Managed evaluator
//!       │ downcall (blocks the calling thread)
//!       ▼
//! Dispatch node (zip / lapack / rng / pcre / misc / dll)
//!       │ marshals arrays through NativeView
//!       ▼
//! Backend ──► native: companion runtime library via the loader
//!        └──► portable: in-process reimplementation, no artifact
//!       │
//!       ▼ upcall (index + marshaled args, same stack)
//! Upcall table ──► managed operation ──► wrapped result
//! ```
//!
//! # Backends
//!
//! - **Native**: every group resolves to `extern "C"` entry points in the
//!   companion `ferrulert` library, loaded once per process with global
//!   symbol visibility.
//! - **Portable**: every group is reimplemented in Rust; nothing to load.
//!
//! The backend is selected by configuration and constructed once at context
//! startup; see [`backend::BackendRegistry`].
//!
//! # Example
//!
//! ```rust
//! use ferrule::config::BridgeConfig;
//! use ferrule::context::BridgeContext;
//! use ferrule::error::zip_status;
//! use ferrule::nodes::{ZipCompressNode, ZipUncompressNode};
//!
//! let ctx = BridgeContext::new(BridgeConfig::default()).unwrap();
//! let backend = ctx.backend().unwrap();
//!
//! let payload = b"ferrule ferrule ferrule".repeat(8);
//! let mut compressed = vec![0u8; 256];
//! let (status, len) = ZipCompressNode::new(backend.zip())
//!     .execute(&mut compressed, &payload);
//! assert!(zip_status::is_ok(status));
//!
//! let mut restored = vec![0u8; payload.len()];
//! let (status, _) = ZipUncompressNode::new(backend.zip())
//!     .execute(&mut restored, &compressed[..len as usize]);
//! assert!(zip_status::is_ok(status));
//! assert_eq!(restored, payload);
//! ```

pub mod backend;
pub mod config;
pub mod context;
pub mod error;
pub mod handles;
pub mod loader;
pub mod nodes;
pub mod pairlist;
pub mod upcall;
pub mod value;
pub mod view;

pub use backend::{Backend, BackendRegistry};
pub use config::{BackendKind, BridgeConfig};
pub use context::{BridgeContext, BridgeState};
pub use error::{zip_status, BridgeError, BridgeResult};
pub use handles::{HandleTable, NativeHandle};
pub use loader::{LibPaths, LibraryRegistry, Module};
pub use upcall::{EvalDelegate, NativeArg, UpcallId, UpcallResult, UpcallTable};
pub use value::{ArgList, GuestList, GuestValue};
pub use view::{NativeView, ReadOnlyView};
