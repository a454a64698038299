//! # Staging Directories
//!
//! Extracts an embedded library into a private directory under the system
//! temporary root so the platform loader can map it from a real file.
//!
//! ## Staging Model
//!
//! ```text
//! $TMPDIR/
//! └── native-bootstrap-3f2a9c.../    (0700, created exclusively)
//!     └── libexample-1.0.0.so        (0700, created with O_EXCL)
//! ```
//!
//! ## Security Model
//!
//! The temporary root is shared with every local user, so each step assumes
//! another process is trying to get its own code loaded in our place.
//!
//! ### Exclusive Creation
//!
//! [`StagingDirectory::claim`] uses `create_dir`, which fails if the path
//! exists. A directory someone else created is never adopted; the loader
//! retries with a fresh random name, bounded by
//! [`MAX_STAGING_ATTEMPTS`](crate::constants::MAX_STAGING_ATTEMPTS).
//!
//! ### Permission Hardening
//!
//! [`StagingDirectory::restrict_permissions`] applies `0700` and then reads
//! the metadata back: the path must still be a real directory (not a
//! symlink), owned by the effective user, with no group/other bits.
//! On non-unix targets no mode is applied; see the method docs.
//!
//! ### Scrubbing
//!
//! [`StagingDirectory::scrub`] removes anything found inside the directory
//! before the library is written. Symlinks are unlinked, never followed.
//! An entry that cannot be removed fails with [`Error::TamperDetected`].
//!
//! ### Integrity Re-check
//!
//! The SHA-256 of the resource is computed while streaming it to disk. The
//! staged file is then hashed again from disk; a mismatch means the file was
//! replaced between write and load, and the staged copy is discarded.
//!
//! ## Resource Cleanup
//!
//! [`StagingDirectory`] removes itself on drop unless ownership has been
//! handed to a [`CleanupAction`] via [`StagedLibrary::into_cleanup`]. Every
//! failure path before the dynamic load therefore leaves nothing behind.

use crate::cleanup::CleanupAction;
#[cfg(unix)]
use crate::constants::{GROUP_OTHER_MASK, STAGED_FILE_MODE};
use crate::constants::{STAGING_DIR_MODE, STAGING_DIR_PREFIX};
use crate::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A freshly claimed, private directory under the temporary root.
#[derive(Debug)]
pub struct StagingDirectory {
    path: PathBuf,
    /// Cleared once a [`CleanupAction`] owns the directory.
    armed: bool,
}

impl StagingDirectory {
    /// Claims, hardens and scrubs a new staging directory under `root`.
    pub fn create(root: &Path, max_attempts: u32) -> Result<Self> {
        let dir = Self::claim(root, max_attempts, random_name)?;
        dir.restrict_permissions()?;
        dir.scrub()?;
        Ok(dir)
    }

    /// Creates a directory under `root` using names from `next_name`.
    ///
    /// A name that already exists is skipped, never reused. Fails with
    /// [`Error::TempDirCreationFailure`] after `max_attempts` collisions or
    /// on any other creation error.
    pub fn claim(
        root: &Path,
        max_attempts: u32,
        mut next_name: impl FnMut() -> String,
    ) -> Result<Self> {
        let failure = |reason: String| Error::TempDirCreationFailure {
            root: root.to_path_buf(),
            reason,
        };

        if !root.is_dir() {
            return Err(failure(
                "temporary root does not exist or is not a directory".to_string(),
            ));
        }

        for attempt in 1..=max_attempts {
            let path = root.join(next_name());
            match create_private_dir(&path) {
                Ok(()) => {
                    debug!("Claimed staging directory {}", path.display());
                    return Ok(Self { path, armed: true });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    warn!(
                        "Staging directory {} already exists (attempt {}/{}), retrying",
                        path.display(),
                        attempt,
                        max_attempts
                    );
                }
                Err(e) => return Err(failure(e.to_string())),
            }
        }

        Err(failure(format!(
            "no unused directory name after {} attempts",
            max_attempts
        )))
    }

    /// Returns the directory path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Restricts the directory to its owner and confirms the result.
    #[cfg(unix)]
    pub fn restrict_permissions(&self) -> Result<()> {
        use std::os::unix::fs::{MetadataExt, PermissionsExt};

        let failure = |reason: String| Error::PermissionSettingFailure {
            path: self.path.clone(),
            reason,
        };

        fs::set_permissions(&self.path, fs::Permissions::from_mode(STAGING_DIR_MODE))
            .map_err(|e| failure(e.to_string()))?;

        // SECURITY: Re-read without following symlinks; the path must still
        // be the directory we created.
        let meta = fs::symlink_metadata(&self.path).map_err(|e| failure(e.to_string()))?;
        if !meta.file_type().is_dir() {
            return Err(failure("path is no longer a directory".to_string()));
        }

        let mode = meta.permissions().mode() & 0o777;
        if mode & GROUP_OTHER_MASK != 0 || mode != STAGING_DIR_MODE {
            return Err(failure(format!("mode is {:o}, expected {:o}", mode, STAGING_DIR_MODE)));
        }

        // SAFETY: geteuid has no preconditions and cannot fail
        let euid = unsafe { libc::geteuid() };
        if meta.uid() != euid {
            return Err(failure(format!(
                "owned by uid {}, expected {}",
                meta.uid(),
                euid
            )));
        }

        debug!("Restricted {} to mode {:o}", self.path.display(), STAGING_DIR_MODE);
        Ok(())
    }

    /// Checks the directory without restricting it.
    ///
    /// Without POSIX modes nothing is applied and owner-only access is not
    /// confirmed: the directory keeps the ACL inherited from the temporary
    /// root (per-user on Windows). Only its type and writability are
    /// checked, so a shared temp root on these targets is not protected.
    #[cfg(not(unix))]
    pub fn restrict_permissions(&self) -> Result<()> {
        let failure = |reason: String| Error::PermissionSettingFailure {
            path: self.path.clone(),
            reason,
        };

        let meta = fs::symlink_metadata(&self.path).map_err(|e| failure(e.to_string()))?;
        if !meta.file_type().is_dir() {
            return Err(failure("path is no longer a directory".to_string()));
        }
        if meta.permissions().readonly() {
            return Err(failure("directory is read-only".to_string()));
        }

        debug!(
            "Staging directory {} uses inherited ACL (mode {:o} not applicable)",
            self.path.display(),
            STAGING_DIR_MODE
        );
        Ok(())
    }

    /// Removes every entry in the directory, returning how many were found.
    pub fn scrub(&self) -> Result<usize> {
        let tamper = |path: &Path, reason: String| Error::TamperDetected {
            path: path.to_path_buf(),
            reason,
        };

        let entries = fs::read_dir(&self.path).map_err(|e| tamper(&self.path, e.to_string()))?;

        let mut removed = 0;
        for entry in entries {
            let entry = entry.map_err(|e| tamper(&self.path, e.to_string()))?;
            let path = entry.path();
            // file_type() does not follow symlinks
            let file_type = entry.file_type().map_err(|e| tamper(&path, e.to_string()))?;

            let result = if file_type.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            result.map_err(|e| tamper(&path, format!("unexpected entry could not be removed: {}", e)))?;
            removed += 1;
        }

        if removed > 0 {
            warn!(
                "Removed {} unexpected entries from staging directory {}",
                removed,
                self.path.display()
            );
        }
        Ok(removed)
    }

    /// Streams `reader` into `file_name` inside this directory.
    ///
    /// On failure the partial file is removed here and the directory when
    /// `self` is dropped.
    pub fn stage(
        self,
        file_name: &str,
        reader: impl Read,
        buffer_size: usize,
    ) -> Result<StagedLibrary> {
        let file = self.path.join(file_name);

        let (digest, size) = match write_exclusive(&file, reader, buffer_size) {
            Ok(written) => written,
            Err(e) => {
                let _ = fs::remove_file(&file);
                return Err(e);
            }
        };

        if let Err(e) = verify_digest(&file, &digest, buffer_size) {
            let _ = fs::remove_file(&file);
            return Err(e);
        }

        debug!("Staged {} ({} bytes, sha256:{})", file.display(), size, digest);
        Ok(StagedLibrary {
            dir: self,
            file,
            digest,
            size,
        })
    }

    /// Hands ownership of the directory to someone else.
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for StagingDirectory {
    fn drop(&mut self) {
        if self.armed
            && let Err(e) = fs::remove_dir_all(&self.path)
        {
            debug!("Failed to remove staging directory {}: {}", self.path.display(), e);
        }
    }
}

// =============================================================================
// Staged Library
// =============================================================================

/// A library binary written and verified inside a [`StagingDirectory`].
#[derive(Debug)]
pub struct StagedLibrary {
    dir: StagingDirectory,
    file: PathBuf,
    digest: String,
    size: u64,
}

impl StagedLibrary {
    /// Path of the staged file.
    pub fn path(&self) -> &Path {
        &self.file
    }

    /// Directory holding the staged file.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Hex SHA-256 of the staged bytes.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Size of the staged file in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Transfers removal of the file and directory to a [`CleanupAction`].
    pub fn into_cleanup(mut self) -> CleanupAction {
        self.dir.disarm();
        CleanupAction::new(self.file.clone(), self.dir.path.clone())
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Generates an unguessable staging directory name.
fn random_name() -> String {
    format!("{}{}", STAGING_DIR_PREFIX, uuid::Uuid::new_v4().simple())
}

/// Creates a single directory, failing if it exists.
fn create_private_dir(path: &Path) -> std::io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(STAGING_DIR_MODE);
    }
    builder.create(path)
}

/// Copies `reader` into a new file at `path`, returning its digest and size.
fn write_exclusive(path: &Path, mut reader: impl Read, buffer_size: usize) -> Result<(String, u64)> {
    let failure = |reason: String| Error::IoWriteFailure {
        path: path.to_path_buf(),
        reason,
    };

    let mut options = OpenOptions::new();
    // SECURITY: create_new refuses to open a file planted at this path
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(STAGED_FILE_MODE);
    }
    let mut file = options.open(path).map_err(|e| failure(e.to_string()))?;

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; buffer_size.max(1)];
    let mut size = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(failure(format!("reading resource: {}", e))),
        };
        let chunk = &buf[..n];
        file.write_all(chunk).map_err(|e| failure(e.to_string()))?;
        hasher.update(chunk);
        size += n as u64;
    }

    file.sync_all().map_err(|e| failure(e.to_string()))?;
    Ok((hex::encode(hasher.finalize()), size))
}

/// Re-hashes the staged file and compares it with the streamed digest.
fn verify_digest(path: &Path, expected: &str, buffer_size: usize) -> Result<()> {
    let tamper = |reason: String| Error::TamperDetected {
        path: path.to_path_buf(),
        reason,
    };

    let meta = fs::symlink_metadata(path).map_err(|e| tamper(e.to_string()))?;
    if !meta.file_type().is_file() {
        return Err(tamper("staged library is not a regular file".to_string()));
    }

    let mut file = File::open(path).map_err(|e| tamper(e.to_string()))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; buffer_size.max(1)];
    loop {
        let n = match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(tamper(e.to_string())),
        };
        hasher.update(&buf[..n]);
    }

    let actual = hex::encode(hasher.finalize());
    if actual != expected {
        return Err(tamper(format!(
            "digest mismatch: wrote {}, found {}",
            expected, actual
        )));
    }
    Ok(())
}
