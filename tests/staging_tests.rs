//! Tests for staging directories.
//!
//! Validates exclusive creation, owner-only permissions, scrubbing of
//! pre-placed content, and removal of partial or failed copies.

use native_bootstrap::{Error, StagingDirectory};
use std::fs;
use std::io::{self, Read};
use tempfile::TempDir;

/// Reader that yields some bytes and then fails.
struct FailingReader {
    sent: bool,
}

impl Read for FailingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.sent {
            return Err(io::Error::other("resource stream truncated"));
        }
        self.sent = true;
        let n = buf.len().min(4);
        buf[..n].copy_from_slice(&b"\x7fELF"[..n]);
        Ok(n)
    }
}

fn names(list: &[&str]) -> impl FnMut() -> String {
    let mut names: Vec<String> = list.iter().rev().map(|s| s.to_string()).collect();
    move || names.pop().unwrap_or_else(|| "exhausted".to_string())
}

// =============================================================================
// Creation Tests
// =============================================================================

#[test]
fn test_create_staging_directory() {
    let temp = TempDir::new().unwrap();

    let dir = StagingDirectory::create(temp.path(), 100).unwrap();

    assert!(dir.path().is_dir());
    assert!(dir.path().starts_with(temp.path()));
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0, "should start empty");
}

#[test]
fn test_create_in_missing_root_fails() {
    let temp = TempDir::new().unwrap();

    let result = StagingDirectory::create(&temp.path().join("missing"), 100);

    assert!(matches!(result, Err(Error::TempDirCreationFailure { .. })));
}

#[test]
fn test_consecutive_directories_are_unique() {
    let temp = TempDir::new().unwrap();

    let first = StagingDirectory::create(temp.path(), 100).unwrap();
    let second = StagingDirectory::create(temp.path(), 100).unwrap();

    assert_ne!(first.path(), second.path());
}

#[test]
fn test_claim_skips_existing_directory() {
    let temp = TempDir::new().unwrap();
    let taken = temp.path().join("taken");
    fs::create_dir(&taken).unwrap();
    fs::write(taken.join("libexample.so"), b"planted").unwrap();

    let dir = StagingDirectory::claim(temp.path(), 100, names(&["taken", "fresh"])).unwrap();

    assert_eq!(dir.path(), temp.path().join("fresh"));
    // The pre-existing directory is neither adopted nor touched
    assert_eq!(fs::read(taken.join("libexample.so")).unwrap(), b"planted");
}

#[test]
fn test_claim_gives_up_after_bound() {
    let temp = TempDir::new().unwrap();
    fs::create_dir(temp.path().join("taken")).unwrap();

    let result = StagingDirectory::claim(temp.path(), 3, || "taken".to_string());

    match result {
        Err(Error::TempDirCreationFailure { reason, .. }) => {
            assert!(reason.contains("3 attempts"), "reason: {}", reason);
        }
        other => panic!("expected TempDirCreationFailure, got {:?}", other),
    }
}

#[test]
fn test_dropped_directory_is_removed() {
    let temp = TempDir::new().unwrap();
    let dir = StagingDirectory::create(temp.path(), 100).unwrap();
    let path = dir.path().to_path_buf();

    drop(dir);

    assert!(!path.exists());
}

// =============================================================================
// Permission Tests
// =============================================================================

#[cfg(unix)]
mod permissions {
    use super::*;
    use std::os::unix::fs::{PermissionsExt, symlink};

    fn mode(path: &std::path::Path) -> u32 {
        fs::metadata(path).unwrap().permissions().mode() & 0o777
    }

    #[test]
    fn test_created_directory_is_owner_only() {
        let temp = TempDir::new().unwrap();

        let dir = StagingDirectory::create(temp.path(), 100).unwrap();

        assert_eq!(mode(dir.path()), 0o700);
    }

    #[test]
    fn test_restrict_permissions_tightens_mode() {
        let temp = TempDir::new().unwrap();
        let dir = StagingDirectory::claim(temp.path(), 1, names(&["stage"])).unwrap();
        fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o777)).unwrap();

        dir.restrict_permissions().unwrap();

        assert_eq!(mode(dir.path()), 0o700);
    }

    #[test]
    fn test_restrict_permissions_rejects_swapped_symlink() {
        let temp = TempDir::new().unwrap();
        let elsewhere = temp.path().join("elsewhere");
        fs::create_dir(&elsewhere).unwrap();

        let dir = StagingDirectory::claim(temp.path(), 1, names(&["stage"])).unwrap();
        fs::remove_dir(dir.path()).unwrap();
        symlink(&elsewhere, dir.path()).unwrap();

        let result = dir.restrict_permissions();

        assert!(matches!(result, Err(Error::PermissionSettingFailure { .. })));
    }

    #[test]
    fn test_scrub_unlinks_symlinks_without_following() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("victim.txt");
        fs::write(&target, b"keep me").unwrap();

        let dir = StagingDirectory::claim(temp.path(), 1, names(&["stage"])).unwrap();
        symlink(&target, dir.path().join("libexample.so")).unwrap();

        assert_eq!(dir.scrub().unwrap(), 1);
        assert_eq!(fs::read(&target).unwrap(), b"keep me");
    }

    #[test]
    fn test_scrub_fails_on_unremovable_entry() {
        // SAFETY: geteuid has no preconditions
        if unsafe { libc::geteuid() } == 0 {
            // root ignores permission bits, nothing is unremovable
            return;
        }

        let temp = TempDir::new().unwrap();
        let dir = StagingDirectory::claim(temp.path(), 1, names(&["stage"])).unwrap();
        let locked = dir.path().join("locked");
        fs::create_dir(&locked).unwrap();
        fs::write(locked.join("libexample.so"), b"planted").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o500)).unwrap();

        let result = dir.scrub();

        // Restore so the directory can be cleaned up
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o700)).unwrap();
        match result {
            Err(Error::TamperDetected { path, .. }) => assert!(path.starts_with(dir.path())),
            other => panic!("expected TamperDetected, got {:?}", other),
        }
    }

    #[test]
    fn test_staged_file_is_owner_only() {
        let temp = TempDir::new().unwrap();
        let dir = StagingDirectory::create(temp.path(), 100).unwrap();

        let staged = dir.stage("libexample.so", &b"\x7fELF"[..], 1024).unwrap();

        assert_eq!(mode(staged.path()) & 0o077, 0);
    }
}

#[cfg(not(unix))]
#[test]
fn test_restrict_permissions_accepts_fresh_directory() {
    let temp = TempDir::new().unwrap();
    let dir = StagingDirectory::claim(temp.path(), 1, names(&["stage"])).unwrap();

    assert!(dir.restrict_permissions().is_ok());
}

// =============================================================================
// Tamper Tests
// =============================================================================

#[test]
fn test_scrub_removes_planted_entries() {
    let temp = TempDir::new().unwrap();
    let dir = StagingDirectory::claim(temp.path(), 1, names(&["stage"])).unwrap();

    // Simulate another actor racing between creation and hardening
    fs::write(dir.path().join("libexample.so"), b"malicious").unwrap();
    fs::create_dir(dir.path().join("nested")).unwrap();
    fs::write(dir.path().join("nested").join("payload"), b"x").unwrap();

    let removed = dir.scrub().unwrap();

    assert_eq!(removed, 2);
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_stage_refuses_planted_file() {
    let temp = TempDir::new().unwrap();
    let dir = StagingDirectory::create(temp.path(), 100).unwrap();
    let dir_path = dir.path().to_path_buf();
    fs::write(dir_path.join("libexample.so"), b"malicious").unwrap();

    let result = dir.stage("libexample.so", &b"\x7fELF"[..], 1024);

    assert!(matches!(result, Err(Error::IoWriteFailure { .. })));
    assert!(!dir_path.exists(), "untrusted directory should be discarded");
}

// =============================================================================
// Copy Tests
// =============================================================================

#[test]
fn test_stage_copies_in_chunks() {
    let temp = TempDir::new().unwrap();
    let dir = StagingDirectory::create(temp.path(), 100).unwrap();
    let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();

    let staged = dir.stage("libexample.so", payload.as_slice(), 64 * 1024).unwrap();

    assert_eq!(staged.size(), payload.len() as u64);
    assert_eq!(fs::read(staged.path()).unwrap(), payload);
    assert_eq!(staged.path().parent(), Some(staged.dir()));
}

#[test]
fn test_failed_copy_leaves_nothing_behind() {
    let temp = TempDir::new().unwrap();
    let dir = StagingDirectory::create(temp.path(), 100).unwrap();
    let dir_path = dir.path().to_path_buf();

    let result = dir.stage("libexample.so", FailingReader { sent: false }, 1024);

    match result {
        Err(Error::IoWriteFailure { reason, .. }) => {
            assert!(reason.contains("truncated"));
        }
        other => panic!("expected IoWriteFailure, got {:?}", other),
    }
    assert!(!dir_path.join("libexample.so").exists());
    assert!(!dir_path.exists());
}

#[test]
fn test_into_cleanup_transfers_ownership() {
    let temp = TempDir::new().unwrap();
    let dir = StagingDirectory::create(temp.path(), 100).unwrap();
    let staged = dir.stage("libexample.so", &b"\x7fELF"[..], 1024).unwrap();
    let file = staged.path().to_path_buf();

    let action = staged.into_cleanup();

    assert!(file.exists(), "file must survive until the action runs");
    action.run();
    assert!(!file.exists());
    assert!(!file.parent().unwrap().exists());
}
