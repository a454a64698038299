//! Dynamic library loading.
//!
//! [`DynamicLoader`] is the seam between the bootstrap state machine and the
//! platform loader. [`SystemLoader`] maps libraries into the process with
//! `libloading` (`dlopen(RTLD_NOW | RTLD_LOCAL)` on Unix, `LoadLibraryExW`
//! on Windows).
//!
//! Library handles are kept alive by the owning
//! [`NativeLoader`](crate::loader::NativeLoader); dropping one unloads it.

use libloading::Library;
use std::path::Path;
use tracing::debug;

/// Loads shared libraries into the current process.
pub trait DynamicLoader: Send + Sync {
    /// Handle that keeps a loaded library resident.
    type Library: Send;

    /// Loads the library at an absolute `path`.
    ///
    /// Returns a human-readable reason on failure.
    fn open_path(&self, path: &Path) -> Result<Self::Library, String>;

    /// Loads a library by platform file name through the system search path.
    fn open_by_name(&self, file_name: &str) -> Result<Self::Library, String>;
}

/// [`DynamicLoader`] backed by the platform loader.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLoader;

impl DynamicLoader for SystemLoader {
    type Library = Library;

    fn open_path(&self, path: &Path) -> Result<Library, String> {
        debug!("Loading native library from {}", path.display());
        // SAFETY: Loading runs the library's initializers in this process.
        // The caller has verified the file's digest against the packaged
        // bytes, and making that code resident is the purpose of the call.
        unsafe { Library::new(path) }.map_err(|e| e.to_string())
    }

    fn open_by_name(&self, file_name: &str) -> Result<Library, String> {
        debug!("Loading native library {} from system search path", file_name);
        // SAFETY: As above; a bare file name makes the platform loader
        // consult its standard search path.
        unsafe { Library::new(file_name) }.map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_library_reports_reason() {
        let err = SystemLoader
            .open_by_name("libnative-bootstrap-does-not-exist.so")
            .err()
            .unwrap_or_default();
        assert!(!err.is_empty());
    }

    #[test]
    fn test_garbage_file_is_rejected() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("libgarbage.so");
        std::fs::write(&path, b"not a shared object").unwrap();

        assert!(SystemLoader.open_path(&path).is_err());
    }
}
