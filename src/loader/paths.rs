//! Library Path Resolution
//!
//! A logical library name resolves through the configured installation root
//! to a platform-specific path: `<root>/lib/<prefix><name><suffix>`. The
//! loader never searches arbitrary filesystem locations outside that root.

use std::path::{Path, PathBuf};

/// Platform shared-library prefix.
#[cfg(unix)]
pub const LIB_PREFIX: &str = "lib";
#[cfg(windows)]
pub const LIB_PREFIX: &str = "";

/// Platform shared-library suffix.
#[cfg(target_os = "macos")]
pub const LIB_SUFFIX: &str = ".dylib";
#[cfg(all(unix, not(target_os = "macos")))]
pub const LIB_SUFFIX: &str = ".so";
#[cfg(windows)]
pub const LIB_SUFFIX: &str = ".dll";

/// Resolves logical library names under one installation root.
#[derive(Debug, Clone)]
pub struct LibPaths {
    root: PathBuf,
}

impl LibPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Platform path of a built-in library, e.g. `ferrulert` ->
    /// `<root>/lib/libferrulert.so`.
    pub fn builtin_lib(&self, name: &str) -> PathBuf {
        self.root
            .join("lib")
            .join(format!("{}{}{}", LIB_PREFIX, name, LIB_SUFFIX))
    }

    /// Platform path of an installed extension package's native library:
    /// `<root>/lib/<package>/libs/<prefix><package><suffix>`.
    pub fn package_lib(&self, package: &str) -> PathBuf {
        self.root
            .join("lib")
            .join(package)
            .join("libs")
            .join(format!("{}{}{}", LIB_PREFIX, package, LIB_SUFFIX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(all(unix, not(target_os = "macos")))]
    fn test_builtin_lib_path() {
        let paths = LibPaths::new("/opt/ferrule");
        assert_eq!(
            paths.builtin_lib("ferrulert"),
            PathBuf::from("/opt/ferrule/lib/libferrulert.so")
        );
    }

    #[test]
    fn test_package_lib_stays_under_root() {
        let paths = LibPaths::new("/opt/ferrule");
        let lib = paths.package_lib("stats");
        assert!(lib.starts_with("/opt/ferrule/lib/stats"));
    }
}
