//! # Bootstrap Constants
//!
//! Defines the bounds, layout, and permission values used while extracting
//! and loading embedded native libraries. These constants are the **single
//! source of truth** for security-critical bounds throughout the crate.
//!
//! ## Security Rationale
//!
//! The staging path sits in a world-writable temporary directory shared with
//! other local users. Each constant documents its value and units, and the
//! attack it bounds where there is one.
//!
//! ## Cross-References
//!
//! - [`crate::staging`]: Uses attempt bounds, buffer size, and modes
//! - [`crate::platform`]: Uses the name validation rules
//! - [`crate::config`]: Uses the defaults for [`LoaderConfig`](crate::config::LoaderConfig)

// =============================================================================
// Staging Limits
// =============================================================================
//
// A staging directory name carries a random v4 UUID, so a collision is either
// astronomically unlikely or a sign that someone is pre-creating names.
// The attempt bound turns the second case into a clear failure instead of
// an unbounded loop.
// =============================================================================

/// Maximum attempts to claim a fresh staging directory.
///
/// **Security**: Each attempt uses a new random name and an exclusive
/// `create_dir`, so an existing path is never reused.
///
/// **Attack Vector**: A local user flooding the temp root with guessed names.
pub const MAX_STAGING_ATTEMPTS: u32 = 100;

/// Buffer size for streaming a resource into the staged file (64 KiB).
pub const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Prefix for staging directory names, so stale directories are recognizable.
pub const STAGING_DIR_PREFIX: &str = "native-bootstrap-";

// =============================================================================
// Permissions
// =============================================================================

/// Mode applied to the staging directory: owner `rwx`, nothing for group/other.
///
/// **Security**: Applied and re-read before any byte of the library is
/// written, so no other user can swap the file between write and load.
pub const STAGING_DIR_MODE: u32 = 0o700;

/// Mode for the staged library file itself.
pub const STAGED_FILE_MODE: u32 = 0o700;

/// Bits that must be clear on the staging directory after hardening.
pub const GROUP_OTHER_MASK: u32 = 0o077;

// =============================================================================
// Package Layout
// =============================================================================
//
// Embedded binaries live at `{RESOURCE_ROOT}/{arch}-{os}/{file}` where
// `{file}` follows the host's shared library naming convention.
// =============================================================================

/// Root of native binaries inside the application package.
pub const RESOURCE_ROOT: &str = "/libs";

// =============================================================================
// Configuration Keys
// =============================================================================

/// Environment variable overriding the temporary root used for staging.
pub const ENV_TEMP_ROOT: &str = "NATIVE_BOOTSTRAP_TMPDIR";

/// Environment variable disabling the system search-path fallback.
pub const ENV_DISABLE_FALLBACK: &str = "NATIVE_BOOTSTRAP_DISABLE_FALLBACK";

// =============================================================================
// Validation
// =============================================================================

/// Maximum logical library name length in bytes.
pub const MAX_LIBRARY_NAME_LEN: usize = 128;

/// Validates a logical library name before it is turned into a path.
///
/// # Security
///
/// The name becomes a file name inside the staging directory and part of a
/// resource path, so it must not be able to escape either:
/// - Non-empty and at most `MAX_LIBRARY_NAME_LEN` bytes
/// - No `/`, `\` or NUL characters
/// - Not `.` or `..`
///
/// # Returns
///
/// `Ok(())` if valid, `Err(reason)` with a description of the failure.
#[inline]
#[must_use = "validation result must be checked before building paths from the name"]
pub fn validate_library_name(name: &str) -> std::result::Result<(), &'static str> {
    if name.is_empty() {
        return Err("library name cannot be empty");
    }
    if name.len() > MAX_LIBRARY_NAME_LEN {
        return Err("library name exceeds maximum length");
    }
    if name.contains(['/', '\\', '\0']) {
        return Err("library name contains a path separator or NUL");
    }
    if name == "." || name == ".." {
        return Err("library name cannot be a relative path component");
    }
    Ok(())
}
