//! Loader configuration.
//!
//! [`LoaderConfig`] carries the static inputs of a bootstrap: which libraries
//! to load and in which order, where they live in the package, and the bounds
//! used while staging them. Defaults come from [`crate::constants`];
//! [`LoaderConfig::from_env`] applies environment overrides on top.

use crate::constants::{
    COPY_BUFFER_SIZE, ENV_DISABLE_FALLBACK, ENV_TEMP_ROOT, MAX_STAGING_ATTEMPTS, RESOURCE_ROOT,
    validate_library_name,
};
use crate::error::{Error, Result};
use std::path::PathBuf;

/// Static configuration for a [`NativeLoader`](crate::loader::NativeLoader).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Logical library names, loaded in order.
    pub libraries: Vec<String>,
    /// Package directory holding the `{arch}-{os}` subdirectories.
    pub resource_root: String,
    /// Staging root; `None` uses the system temporary directory.
    pub temp_root: Option<PathBuf>,
    /// Bound on staging directory name collisions.
    pub max_staging_attempts: u32,
    /// Chunk size when copying a resource to disk.
    pub copy_buffer_size: usize,
    /// Whether to try the system search path when extraction fails.
    pub fallback: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            libraries: Vec::new(),
            resource_root: RESOURCE_ROOT.to_string(),
            temp_root: None,
            max_staging_attempts: MAX_STAGING_ATTEMPTS,
            copy_buffer_size: COPY_BUFFER_SIZE,
            fallback: true,
        }
    }
}

impl LoaderConfig {
    /// Creates a configuration loading `libraries` in order.
    pub fn new<I, S>(libraries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            libraries: libraries.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Applies `NATIVE_BOOTSTRAP_TMPDIR` and `NATIVE_BOOTSTRAP_DISABLE_FALLBACK`.
    pub fn from_env(self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(root) = lookup(ENV_TEMP_ROOT).filter(|v| !v.is_empty()) {
            self.temp_root = Some(PathBuf::from(root));
        }
        if let Some(value) = lookup(ENV_DISABLE_FALLBACK) {
            self.fallback = !matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
        self
    }

    /// Appends a library to the load order.
    pub fn with_library(mut self, name: impl Into<String>) -> Self {
        self.libraries.push(name.into());
        self
    }

    /// Sets the package resource root.
    pub fn with_resource_root(mut self, root: impl Into<String>) -> Self {
        self.resource_root = root.into();
        self
    }

    /// Stages libraries below `root` instead of the system temp directory.
    pub fn with_temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(root.into());
        self
    }

    /// Sets the staging collision bound.
    pub fn with_max_staging_attempts(mut self, attempts: u32) -> Self {
        self.max_staging_attempts = attempts;
        self
    }

    /// Sets the copy chunk size.
    pub fn with_copy_buffer_size(mut self, size: usize) -> Self {
        self.copy_buffer_size = size;
        self
    }

    /// Enables or disables the system search-path fallback.
    pub fn with_fallback(mut self, enabled: bool) -> Self {
        self.fallback = enabled;
        self
    }

    /// Checks bounds and library names.
    pub fn validate(&self) -> Result<()> {
        if self.max_staging_attempts == 0 {
            return Err(Error::InvalidConfig(
                "max_staging_attempts must be at least 1".to_string(),
            ));
        }
        if self.copy_buffer_size == 0 {
            return Err(Error::InvalidConfig(
                "copy_buffer_size must be at least 1".to_string(),
            ));
        }
        if !self.resource_root.starts_with('/') {
            return Err(Error::InvalidConfig(format!(
                "resource_root '{}' must be an absolute package path",
                self.resource_root
            )));
        }
        for name in &self.libraries {
            validate_library_name(name).map_err(|reason| Error::InvalidLibraryName {
                name: name.clone(),
                reason: reason.to_string(),
            })?;
        }
        Ok(())
    }

    /// Returns the directory staging directories are created in.
    pub fn resolve_temp_root(&self) -> Result<PathBuf> {
        let root = self.temp_root.clone().unwrap_or_else(std::env::temp_dir);
        if root.as_os_str().is_empty() || !root.is_dir() {
            return Err(Error::TempDirCreationFailure {
                root,
                reason: "unable to find system temporary directory".to_string(),
            });
        }
        Ok(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_constants() {
        let config = LoaderConfig::default();

        assert_eq!(config.max_staging_attempts, 100);
        assert_eq!(config.copy_buffer_size, 64 * 1024);
        assert_eq!(config.resource_root, "/libs");
        assert!(config.fallback);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let config = LoaderConfig::new(["example"]).apply_overrides(|key| match key {
            ENV_TEMP_ROOT => Some("/var/tmp/app".to_string()),
            ENV_DISABLE_FALLBACK => Some("TRUE".to_string()),
            _ => None,
        });

        assert_eq!(config.temp_root, Some(PathBuf::from("/var/tmp/app")));
        assert!(!config.fallback);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(LoaderConfig::default().with_max_staging_attempts(0).validate().is_err());
        assert!(LoaderConfig::default().with_copy_buffer_size(0).validate().is_err());
        assert!(LoaderConfig::default().with_resource_root("libs").validate().is_err());
        assert!(matches!(
            LoaderConfig::new(["../x"]).validate(),
            Err(Error::InvalidLibraryName { .. })
        ));
    }

    #[test]
    fn test_missing_temp_root() {
        let config = LoaderConfig::default().with_temp_root("/nonexistent/native-bootstrap-root");

        assert!(matches!(
            config.resolve_temp_root(),
            Err(Error::TempDirCreationFailure { .. })
        ));
    }
}
