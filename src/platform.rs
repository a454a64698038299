//! Platform detection and native library naming.
//!
//! Detects the architecture and OS of the running process and derives the
//! package-relative location of an embedded library from them:
//!
//! ```text
//! /libs/{arch}-{os}/{native file name}
//! /libs/x86_64-linux/libexample-1.0.0.so
//! /libs/aarch64-macos/libexample-1.0.0.dylib
//! /libs/x86_64-windows/example-1.0.0.dll
//! ```

use crate::constants::{RESOURCE_ROOT, validate_library_name};
use crate::error::{Error, Result};

/// Normalized architecture and OS tags of a target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Platform {
    /// Architecture tag, e.g. `x86_64`.
    arch: String,
    /// Operating system tag, e.g. `linux`.
    os: String,
}

/// Shared library naming convention, selected from the OS tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
    /// ELF platforms: `lib{name}.so`.
    Unix,
    /// Apple platforms: `lib{name}.dylib`.
    Darwin,
    /// Windows: `{name}.dll`.
    Windows,
}

impl Os {
    /// Picks the naming convention for a normalized OS tag.
    fn from_tag(os: &str) -> Self {
        if os.starts_with("windows") {
            Os::Windows
        } else if matches!(os, "macos" | "darwin" | "mac_os_x" | "ios") {
            Os::Darwin
        } else {
            Os::Unix
        }
    }
}

impl Platform {
    /// Detects the platform of the running process.
    pub fn detect() -> Self {
        Self::new(std::env::consts::ARCH, std::env::consts::OS)
    }

    /// Creates a platform from explicit tags, normalizing both.
    pub fn new(arch: &str, os: &str) -> Self {
        Self {
            arch: normalize_tag(arch),
            os: normalize_tag(os),
        }
    }

    /// Returns the architecture tag.
    pub fn arch(&self) -> &str {
        &self.arch
    }

    /// Returns the OS tag.
    pub fn os(&self) -> &str {
        &self.os
    }

    /// Returns the naming convention for this platform.
    pub fn naming(&self) -> Os {
        Os::from_tag(&self.os)
    }

    /// Returns the `{arch}-{os}` directory segment.
    pub fn resource_dir(&self) -> String {
        format!("{}-{}", self.arch, self.os)
    }

    /// Maps a logical library name to its platform file name.
    pub fn library_filename(&self, name: &str) -> String {
        match self.naming() {
            Os::Unix => format!("lib{}.so", name),
            Os::Darwin => format!("lib{}.dylib", name),
            Os::Windows => format!("{}.dll", name),
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.arch, self.os)
    }
}

/// Lowercases a tag and replaces spaces with underscores.
fn normalize_tag(tag: &str) -> String {
    tag.replace(' ', "_").to_lowercase()
}

// =============================================================================
// Library Spec
// =============================================================================

/// Where a logical library lives in the package and on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibrarySpec {
    name: String,
    file_name: String,
    resource_path: String,
}

impl LibrarySpec {
    /// Builds the spec for `name` under the default `/libs` root.
    pub fn new(name: &str, platform: &Platform) -> Result<Self> {
        Self::with_root(name, platform, RESOURCE_ROOT)
    }

    /// Builds the spec for `name` under a custom resource root.
    pub fn with_root(name: &str, platform: &Platform, root: &str) -> Result<Self> {
        validate_library_name(name).map_err(|reason| Error::InvalidLibraryName {
            name: name.to_string(),
            reason: reason.to_string(),
        })?;

        let file_name = platform.library_filename(name);
        let root = root.trim_end_matches('/');
        let resource_path = format!("{}/{}/{}", root, platform.resource_dir(), file_name);

        Ok(Self {
            name: name.to_string(),
            file_name,
            resource_path,
        })
    }

    /// Logical library name, e.g. `example-1.0.0`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Platform file name, e.g. `libexample-1.0.0.so`.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Package path of the embedded binary.
    pub fn resource_path(&self) -> &str {
        &self.resource_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_detection() {
        let platform = Platform::detect();

        assert_eq!(platform.arch(), std::env::consts::ARCH);
        assert_eq!(platform.os(), std::env::consts::OS);
    }

    #[test]
    fn test_tags_are_normalized() {
        let platform = Platform::new("AMD64", "Mac OS X");

        assert_eq!(platform.arch(), "amd64");
        assert_eq!(platform.os(), "mac_os_x");
        assert_eq!(platform.naming(), Os::Darwin);
        assert_eq!(platform.resource_dir(), "amd64-mac_os_x");
    }

    #[test]
    fn test_library_spec_linux() {
        let platform = Platform::new("x86_64", "linux");
        let spec = LibrarySpec::new("example-1.0.0", &platform).unwrap();

        assert_eq!(spec.file_name(), "libexample-1.0.0.so");
        assert_eq!(
            spec.resource_path(),
            "/libs/x86_64-linux/libexample-1.0.0.so"
        );
    }

    #[test]
    fn test_library_spec_rejects_traversal() {
        let platform = Platform::new("x86_64", "linux");

        assert!(LibrarySpec::new("../../etc/passwd", &platform).is_err());
    }
}
