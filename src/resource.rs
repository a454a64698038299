//! # Package Resources
//!
//! A [`ResourceSource`] answers "give me the bytes stored at this package
//! path". Two sources are provided:
//!
//! - [`EmbeddedResources`]: binaries compiled into the executable with
//!   `include_bytes!`, the usual way to ship a native library inside a Rust
//!   application.
//! - [`DirectoryResources`]: an unpacked package on disk, e.g. a `resources/`
//!   directory shipped next to the executable.
//!
//! ## Example
//!
//! ```rust,ignore
//! use native_bootstrap::EmbeddedResources;
//!
//! let resources = EmbeddedResources::new().with(
//!     "/libs/x86_64-linux/libexample-1.0.0.so",
//!     include_bytes!("../native/libexample-1.0.0.so"),
//! );
//! ```

use crate::error::{Error, Result};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Read access to binaries stored inside an application package.
pub trait ResourceSource: Send + Sync {
    /// Opens the resource at `path` (always `/`-separated and absolute).
    ///
    /// Returns [`Error::ResourceNotFound`] if nothing is stored there.
    fn open(&self, path: &str) -> Result<Box<dyn Read + Send + '_>>;
}

// =============================================================================
// Embedded Resources
// =============================================================================

/// Resources compiled into the binary.
#[derive(Debug, Clone, Default)]
pub struct EmbeddedResources {
    entries: Vec<(String, &'static [u8])>,
}

impl EmbeddedResources {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `bytes` at `path`, replacing any earlier entry for the same path.
    pub fn with(mut self, path: &str, bytes: &'static [u8]) -> Self {
        self.entries.retain(|(existing, _)| existing != path);
        self.entries.push((path.to_string(), bytes));
        self
    }

    /// Returns true if a resource is stored at `path`.
    pub fn contains(&self, path: &str) -> bool {
        self.entries.iter().any(|(p, _)| p == path)
    }
}

impl ResourceSource for EmbeddedResources {
    fn open(&self, path: &str) -> Result<Box<dyn Read + Send + '_>> {
        self.entries
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, bytes)| Box::new(*bytes) as Box<dyn Read + Send>)
            .ok_or_else(|| Error::ResourceNotFound {
                resource: path.to_string(),
            })
    }
}

// =============================================================================
// Directory Resources
// =============================================================================

/// Resources stored in a directory tree on disk.
#[derive(Debug, Clone)]
pub struct DirectoryResources {
    root: PathBuf,
}

impl DirectoryResources {
    /// Serves resources from below `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a package path onto the filesystem.
    ///
    /// # Security
    ///
    /// Rejects `..`, `.`, empty components and backslashes so a crafted
    /// library name or resource root cannot read outside `root`.
    pub fn resolve(&self, path: &str) -> Result<PathBuf> {
        let invalid = |reason: &str| Error::InvalidResourcePath {
            path: path.to_string(),
            reason: reason.to_string(),
        };

        let relative = path
            .strip_prefix('/')
            .ok_or_else(|| invalid("resource paths must be absolute"))?;
        if relative.contains('\\') {
            return Err(invalid("backslash in resource path"));
        }

        let mut resolved = self.root.clone();
        for component in relative.split('/') {
            match component {
                "" | "." | ".." => return Err(invalid("path traversal detected")),
                c => resolved.push(c),
            }
        }
        Ok(resolved)
    }
}

impl ResourceSource for DirectoryResources {
    fn open(&self, path: &str) -> Result<Box<dyn Read + Send + '_>> {
        let resolved = self.resolve(path)?;
        if !resolved.is_file() {
            return Err(Error::ResourceNotFound {
                resource: path.to_string(),
            });
        }
        let file = File::open(&resolved).map_err(|_| Error::ResourceNotFound {
            resource: path.to_string(),
        })?;
        Ok(Box::new(file))
    }
}
