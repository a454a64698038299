//! Process-exit cleanup of staged libraries.
//!
//! Each successfully staged library is turned into a [`CleanupAction`] and
//! registered with a [`CleanupRegistry`]. The process-wide registry runs all
//! pending actions from an `atexit` handler, so staged files are removed on
//! normal exit (`return` from `main` or `std::process::exit`).
//!
//! Cleanup is best-effort: errors are logged at debug level and otherwise
//! ignored, and nothing in this module panics.

use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tracing::debug;

/// Removal of one staged file and its directory. Runs at most once.
#[derive(Debug)]
pub struct CleanupAction {
    file: PathBuf,
    dir: PathBuf,
    done: AtomicBool,
}

impl CleanupAction {
    /// Creates an action removing `file` and then `dir`.
    pub fn new(file: PathBuf, dir: PathBuf) -> Self {
        Self {
            file,
            dir,
            done: AtomicBool::new(false),
        }
    }

    /// Staged file path.
    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Staging directory path.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns true once the action has run.
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Deletes the file, then the directory. Later calls do nothing.
    pub fn run(&self) {
        if self.done.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Err(e) = fs::remove_file(&self.file) {
            debug!("Cleanup of {} skipped: {}", self.file.display(), e);
        }
        if let Err(e) = fs::remove_dir_all(&self.dir) {
            debug!("Cleanup of {} skipped: {}", self.dir.display(), e);
        }
    }
}

/// Set of cleanup actions to run together.
#[derive(Debug, Default)]
pub struct CleanupRegistry {
    actions: Mutex<Vec<Arc<CleanupAction>>>,
}

static PROCESS_REGISTRY: OnceLock<Arc<CleanupRegistry>> = OnceLock::new();

impl CleanupRegistry {
    /// Creates a registry that only runs when [`run`](Self::run) is called.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true once [`process`](Self::process) has been called.
    pub fn process_initialized() -> bool {
        PROCESS_REGISTRY.get().is_some()
    }

    /// Returns the process-wide registry, installing its exit hook on first use.
    pub fn process() -> Arc<CleanupRegistry> {
        PROCESS_REGISTRY
            .get_or_init(|| {
                install_exit_hook();
                Arc::new(CleanupRegistry::new())
            })
            .clone()
    }

    /// Adds `action`, returning a handle that can run it early.
    ///
    /// Actions that already ran are dropped from the registry here.
    pub fn register(&self, action: CleanupAction) -> Arc<CleanupAction> {
        let action = Arc::new(action);
        let mut actions = self.lock();
        actions.retain(|a| !a.is_done());
        actions.push(Arc::clone(&action));
        drop(actions);
        debug!("Registered exit cleanup for {}", action.file.display());
        action
    }

    /// Runs `action` now and removes it from the registry.
    pub fn run_early(&self, action: &Arc<CleanupAction>) {
        self.lock().retain(|a| !Arc::ptr_eq(a, action));
        action.run();
    }

    /// Number of actions held, including ones already run through their handle.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if no actions are held.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of registered actions that have not run yet.
    pub fn pending(&self) -> usize {
        self.lock().iter().filter(|a| !a.is_done()).count()
    }

    /// Runs and forgets every registered action. Returns how many ran.
    pub fn run(&self) -> usize {
        let actions = std::mem::take(&mut *self.lock());
        let mut ran = 0;
        for action in actions {
            if !action.is_done() {
                action.run();
                ran += 1;
            }
        }
        ran
    }

    /// Locks the action list; a poisoned lock still holds valid paths.
    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Arc<CleanupAction>>> {
        self.actions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(unix)]
extern "C" fn run_process_cleanup() {
    // Unwinding out of an extern "C" fn aborts, so contain any panic here.
    let _ = panic::catch_unwind(AssertUnwindSafe(|| {
        if let Some(registry) = PROCESS_REGISTRY.get() {
            registry.run();
        }
    }));
}

#[cfg(unix)]
fn install_exit_hook() {
    // SAFETY: run_process_cleanup is a plain extern "C" fn that never
    // unwinds; atexit only stores the pointer.
    let ret = unsafe { libc::atexit(run_process_cleanup) };
    if ret != 0 {
        debug!("atexit registration failed; staged libraries will not be removed at exit");
    }
}

/// Loaded DLLs cannot be deleted while the process runs; staged copies stay
/// in the temp root unless the registry is run explicitly.
#[cfg(not(unix))]
fn install_exit_hook() {
    debug!("No exit hook on this platform; staged libraries persist in the temp root");
}
