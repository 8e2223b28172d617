//! Bridge Error Taxonomy
//!
//! Every failure the bridge can produce is a typed error. Internal errors
//! abort the current managed call chain; none of them is retried by any layer
//! in this crate. Status codes returned by native calls (see [`zip_status`])
//! are data, not errors, and must be classified by the caller.

use thiserror::Error;

/// Error type for all native-interface bridge operations.
#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    /// Failed to load a native library.
    #[error("failed to load library '{path}': {reason}")]
    LoadError { path: String, reason: String },

    /// Symbol not found in a loaded module. The registry never substitutes
    /// a stub for a missing symbol.
    #[error("symbol '{name}' not found in module '{module}'")]
    SymbolNotFound { name: String, module: String },

    /// Native code invoked an upcall index with no registered callback.
    /// Coverage gaps fail loudly at the call site.
    #[error("unimplemented upcall index {0}")]
    UnimplementedUpcall(u32),

    /// A pairlist-family accessor was invoked on a representation it does
    /// not support. Well-formed native code never triggers this; the
    /// reference runtime would segfault instead.
    #[error("{op} does not work on {found}")]
    UnsupportedRepresentation {
        op: &'static str,
        found: &'static str,
    },

    /// A native handle was used after its scope was closed.
    #[error("native handle {0} used outside its scope")]
    DeadHandle(u64),

    /// An upcall argument could not be unwrapped to the expected managed
    /// representation.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// Native code addressed a vector element past the end. Writes are
    /// never silently dropped.
    #[error("index {index} out of bounds for length {length}")]
    IndexOutOfBounds { index: usize, length: usize },

    /// The backend registry was consulted before initialization, or
    /// initialized twice.
    #[error("backend registry: {0}")]
    BackendState(&'static str),

    /// Configuration could not be read or parsed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result alias used throughout the bridge.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Status codes for the compression downcall group, following the zlib
/// convention. A non-zero status means the destination buffer holds no
/// usable output; the caller decides whether to escalate.
pub mod zip_status {
    /// Operation completed.
    pub const OK: i32 = 0;
    /// Not enough memory.
    pub const MEM_ERROR: i32 = -2;
    /// Input data was corrupted or incomplete.
    pub const DATA_ERROR: i32 = -3;
    /// Destination buffer was too small for the output.
    pub const BUF_ERROR: i32 = -5;

    pub fn is_ok(status: i32) -> bool {
        status == OK
    }

    /// Human-readable classification for surfacing to guest code.
    pub fn classify(status: i32) -> &'static str {
        match status {
            OK => "ok",
            MEM_ERROR => "out of memory",
            DATA_ERROR => "data error",
            BUF_ERROR => "buffer too small",
            _ => "unknown zlib status",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BridgeError::SymbolNotFound {
            name: "dpotrf_".to_string(),
            module: "ferrulert".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "symbol 'dpotrf_' not found in module 'ferrulert'"
        );

        let err = BridgeError::UnimplementedUpcall(91);
        assert_eq!(err.to_string(), "unimplemented upcall index 91");
    }

    #[test]
    fn test_zip_status_classification() {
        assert!(zip_status::is_ok(zip_status::OK));
        assert!(!zip_status::is_ok(zip_status::BUF_ERROR));
        assert_eq!(zip_status::classify(zip_status::BUF_ERROR), "buffer too small");
        assert_eq!(zip_status::classify(zip_status::DATA_ERROR), "data error");
        assert_eq!(zip_status::classify(7), "unknown zlib status");
    }
}
