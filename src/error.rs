//! Error types for the bootstrap loader.

use std::path::PathBuf;

/// Result type alias for bootstrap operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while making a native library resident.
///
/// Payloads are plain strings rather than wrapped I/O errors so a failed
/// attempt can be cloned and replayed to every caller that waited on it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    // =========================================================================
    // Extraction Errors
    // =========================================================================
    /// Embedded binary is absent from the package. Triggers the fallback.
    #[error("native library resource not found: {resource}")]
    ResourceNotFound { resource: String },

    /// Temp root unusable or no fresh staging directory could be claimed.
    #[error("failed to create staging directory under {root}: {reason}")]
    TempDirCreationFailure { root: PathBuf, reason: String },

    /// Owner-only permissions could not be applied or confirmed.
    #[error("failed to restrict permissions on {path}: {reason}")]
    PermissionSettingFailure { path: PathBuf, reason: String },

    /// Staging directory held content that could not be cleared, or the
    /// staged file changed after it was written.
    #[error("tampering detected in {path}: {reason}")]
    TamperDetected { path: PathBuf, reason: String },

    /// Copying the resource into the staged file failed.
    #[error("failed to write staged library {path}: {reason}")]
    IoWriteFailure { path: PathBuf, reason: String },

    // =========================================================================
    // Load Errors
    // =========================================================================
    /// The platform loader rejected the staged file.
    #[error("failed to load {path}: {reason}")]
    DynamicLoadFailure { path: PathBuf, reason: String },

    /// Loading by name from the system search path also failed.
    ///
    /// `cause` is the primary (extraction) failure, reported through
    /// `source()`; `reason` describes the secondary fallback failure.
    #[error("failed to load native library '{library}' (system fallback: {reason})")]
    FallbackLoadFailure {
        library: String,
        reason: String,
        #[source]
        cause: Box<Error>,
    },

    // =========================================================================
    // Validation Errors
    // =========================================================================
    /// Library name cannot be turned into a safe path.
    #[error("invalid library name '{name}': {reason}")]
    InvalidLibraryName { name: String, reason: String },

    /// Resource path escapes its source root.
    #[error("invalid resource path '{path}': {reason}")]
    InvalidResourcePath { path: String, reason: String },

    /// Loader configuration rejected.
    #[error("invalid loader configuration: {0}")]
    InvalidConfig(String),

    // =========================================================================
    // Process-Wide Loader Errors
    // =========================================================================
    /// A process-wide loader was already installed.
    #[error("a process-wide native loader is already installed")]
    AlreadyInstalled,

    /// `ensure_loaded()` was called before a loader was installed.
    #[error("no process-wide native loader installed")]
    NotInstalled,

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal error (should not happen).
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns the innermost primary failure.
    ///
    /// For [`Error::FallbackLoadFailure`] this is the extraction error that
    /// made the fallback necessary; every other variant is its own root.
    pub fn root_cause(&self) -> &Error {
        let mut current = self;
        while let Self::FallbackLoadFailure { cause, .. } = current {
            current = cause;
        }
        current
    }

    /// Returns true if this failure may be recovered by loading from the
    /// system search path.
    ///
    /// Configuration and internal errors are not: they would fail the same
    /// way for every library.
    pub fn is_fallback_eligible(&self) -> bool {
        matches!(
            self,
            Self::ResourceNotFound { .. }
                | Self::TempDirCreationFailure { .. }
                | Self::PermissionSettingFailure { .. }
                | Self::TamperDetected { .. }
                | Self::IoWriteFailure { .. }
                | Self::DynamicLoadFailure { .. }
                | Self::InvalidResourcePath { .. }
        )
    }
}
