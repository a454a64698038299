//! # Bootstrap Loader
//!
//! Makes the configured native libraries resident in the process exactly
//! once, no matter how many threads call [`NativeLoader::ensure_loaded`].
//!
//! ## Load Sequence
//!
//! For each library, in configuration order:
//!
//! ```text
//!   LibrarySpec ──► open resource ──► staging dir ──► 0700 ──► scrub
//!                        │                                       │
//!                        │ (any failure)                         ▼
//!                        │                     stream copy + digest re-check
//!                        │                                       │
//!                        │                                       ▼
//!                        │                       register exit cleanup
//!                        │                                       │
//!                        ▼                                       ▼
//!              system search path ◄──── (any failure) ──── dlopen(staged)
//!                        │
//!                        ▼
//!        FallbackLoadFailure { cause: <primary failure> }
//! ```
//!
//! A library failing aborts the remaining sequence; earlier libraries stay
//! resident.
//!
//! ## State Machine
//!
//! ```text
//!   ┌───────────┐  first caller  ┌─────────┐   ok    ┌────────┐
//!   │ NotLoaded │ ─────────────► │ Loading │ ──────► │ Loaded │
//!   └───────────┘                └────┬────┘         └────────┘
//!                                     │ err
//!                                     ▼
//!                                ┌────────┐  next caller
//!                                │ Failed │ ─────────────► Loading
//!                                └────────┘
//! ```
//!
//! `Loaded` is published through an atomic flag so the common case never
//! touches the lock. Callers that were blocked on the lock while an attempt
//! ran receive that attempt's outcome; callers arriving after a failed
//! attempt start a new one. Failure is never permanent.

use crate::cleanup::CleanupRegistry;
use crate::config::LoaderConfig;
use crate::dylib::{DynamicLoader, SystemLoader};
use crate::error::{Error, Result};
use crate::platform::{LibrarySpec, Platform};
use crate::resource::ResourceSource;
use crate::staging::StagingDirectory;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use tracing::{debug, error, info, warn};

/// Progress of the process-wide load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// No attempt has run yet.
    NotLoaded,
    /// An attempt is running.
    Loading,
    /// Every configured library is resident.
    Loaded,
    /// The last attempt failed; the next call retries.
    Failed,
}

/// Which branch made a library resident.
#[derive(Debug, Clone)]
pub enum LoadOutcome {
    /// Extracted from the package and loaded from the staging directory.
    Extracted {
        /// Staged file path.
        path: PathBuf,
        /// Hex SHA-256 of the staged bytes.
        digest: String,
    },
    /// Loaded by name from the system search path.
    SystemPath {
        /// Why extraction could not be used.
        cause: Error,
    },
}

impl LoadOutcome {
    /// Returns true if the library came from the package.
    pub fn is_extracted(&self) -> bool {
        matches!(self, Self::Extracted { .. })
    }
}

/// A library made resident by the loader.
pub struct ResidentLibrary<H> {
    name: String,
    outcome: LoadOutcome,
    handle: H,
}

impl<H> ResidentLibrary<H> {
    /// Logical library name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// How the library was loaded.
    pub fn outcome(&self) -> &LoadOutcome {
        &self.outcome
    }

    /// Loader handle keeping the library mapped.
    pub fn handle(&self) -> &H {
        &self.handle
    }
}

impl<H> std::fmt::Debug for ResidentLibrary<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResidentLibrary")
            .field("name", &self.name)
            .field("outcome", &self.outcome)
            .finish_non_exhaustive()
    }
}

/// State guarded by the loader's lock.
struct LoaderInner<H> {
    state: LoadState,
    resident: Vec<ResidentLibrary<H>>,
    last_failure: Option<Error>,
}

/// Loads a fixed list of native libraries exactly once.
///
/// ## Thread Safety
///
/// `NativeLoader` is `Sync`; share it behind a `static` or an `Arc`. Only
/// one thread ever performs extraction at a time.
///
/// ## Resource Cleanup
///
/// Staged files are removed by the [`CleanupRegistry`] (the process registry
/// by default, which runs at exit). Library handles are released when the
/// loader is dropped; a loader installed with
/// [`install`](crate::global::install) is never dropped.
pub struct NativeLoader<L: DynamicLoader = SystemLoader> {
    config: LoaderConfig,
    platform: Platform,
    resources: Box<dyn ResourceSource>,
    backend: L,
    /// Resolved to the process registry on first use.
    cleanup: OnceLock<Arc<CleanupRegistry>>,
    /// Fast-path flag, set once every library is resident.
    loaded: AtomicBool,
    /// Number of finished attempts, for replaying outcomes to waiters.
    attempts: AtomicU64,
    inner: Mutex<LoaderInner<L::Library>>,
}

impl NativeLoader<SystemLoader> {
    /// Creates a loader using the platform's dynamic loader.
    pub fn new(config: LoaderConfig, resources: impl ResourceSource + 'static) -> Self {
        Self::with_backend(config, resources, SystemLoader)
    }
}

impl<L: DynamicLoader> NativeLoader<L> {
    /// Creates a loader with a custom [`DynamicLoader`].
    pub fn with_backend(
        config: LoaderConfig,
        resources: impl ResourceSource + 'static,
        backend: L,
    ) -> Self {
        Self {
            config,
            platform: Platform::detect(),
            resources: Box::new(resources),
            backend,
            cleanup: OnceLock::new(),
            loaded: AtomicBool::new(false),
            attempts: AtomicU64::new(0),
            inner: Mutex::new(LoaderInner {
                state: LoadState::NotLoaded,
                resident: Vec::new(),
                last_failure: None,
            }),
        }
    }

    /// Overrides the detected platform.
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Registers staged files with `registry` instead of the process registry.
    pub fn with_cleanup(mut self, registry: Arc<CleanupRegistry>) -> Self {
        self.cleanup = OnceLock::from(registry);
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Returns the platform libraries are resolved for.
    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Returns the backend.
    pub fn backend(&self) -> &L {
        &self.backend
    }

    /// Returns the cleanup registry, falling back to the process registry.
    pub fn cleanup(&self) -> &Arc<CleanupRegistry> {
        self.cleanup.get_or_init(CleanupRegistry::process)
    }

    /// Returns true once every configured library is resident.
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    /// Returns the current load state.
    pub fn state(&self) -> Result<LoadState> {
        Ok(self.lock()?.state)
    }

    /// Returns each resident library's name and how it was loaded.
    pub fn outcomes(&self) -> Result<Vec<(String, LoadOutcome)>> {
        Ok(self
            .lock()?
            .resident
            .iter()
            .map(|r| (r.name.clone(), r.outcome.clone()))
            .collect())
    }

    /// Runs `f` over the resident libraries, e.g. to resolve symbols.
    pub fn with_resident<R>(&self, f: impl FnOnce(&[ResidentLibrary<L::Library>]) -> R) -> Result<R> {
        Ok(f(&self.lock()?.resident))
    }

    /// Makes every configured library resident, at most once.
    ///
    /// Idempotent and safe to call from any number of threads. Returns the
    /// failure of the attempt this call performed or waited on.
    pub fn ensure_loaded(&self) -> Result<()> {
        if self.loaded.load(Ordering::Acquire) {
            return Ok(());
        }

        let observed = self.attempts.load(Ordering::Acquire);
        let mut inner = self.lock()?;

        match inner.state {
            LoadState::Loaded => return Ok(()),
            LoadState::Failed if self.attempts.load(Ordering::Acquire) != observed => {
                // An attempt finished while we waited for the lock
                if let Some(failure) = &inner.last_failure {
                    debug!("Replaying native load failure to waiting caller");
                    return Err(failure.clone());
                }
            }
            _ => {}
        }

        inner.state = LoadState::Loading;
        let result = self.load_all(&mut inner);

        match &result {
            Ok(()) => {
                inner.state = LoadState::Loaded;
                inner.last_failure = None;
                self.loaded.store(true, Ordering::Release);
            }
            Err(e) => {
                inner.state = LoadState::Failed;
                inner.last_failure = Some(e.clone());
            }
        }
        self.attempts.fetch_add(1, Ordering::AcqRel);

        result
    }

    /// Loads every configured library that is not resident yet.
    fn load_all(&self, inner: &mut LoaderInner<L::Library>) -> Result<()> {
        self.config.validate()?;

        for name in &self.config.libraries {
            if inner.resident.iter().any(|r| &r.name == name) {
                debug!("Native library '{}' already resident", name);
                continue;
            }

            let (outcome, handle) = self.load_library(name).inspect_err(|e| {
                error!("Native library '{}' could not be loaded: {}", name, e);
            })?;

            inner.resident.push(ResidentLibrary {
                name: name.clone(),
                outcome,
                handle,
            });
        }
        Ok(())
    }

    /// Loads one library: from the package first, then by system search.
    ///
    /// Only called from [`load_all`](Self::load_all) with the lock held.
    fn load_library(&self, name: &str) -> Result<(LoadOutcome, L::Library)> {
        let spec = LibrarySpec::with_root(name, &self.platform, &self.config.resource_root)?;

        let primary = match self.load_embedded(&spec) {
            Ok((path, digest, handle)) => {
                info!("Loaded native library '{}' from {}", name, path.display());
                return Ok((LoadOutcome::Extracted { path, digest }, handle));
            }
            Err(e) => e,
        };

        if !self.config.fallback || !primary.is_fallback_eligible() {
            return Err(primary);
        }

        warn!(
            "Embedded copy of '{}' unusable ({}), trying system search path",
            name, primary
        );
        match self.backend.open_by_name(spec.file_name()) {
            Ok(handle) => {
                info!("Loaded native library '{}' from system search path", name);
                Ok((LoadOutcome::SystemPath { cause: primary }, handle))
            }
            Err(reason) => Err(Error::FallbackLoadFailure {
                library: name.to_string(),
                reason,
                cause: Box::new(primary),
            }),
        }
    }

    /// Extracts, stages and loads the packaged binary for `spec`.
    fn load_embedded(&self, spec: &LibrarySpec) -> Result<(PathBuf, String, L::Library)> {
        let reader = self.resources.open(spec.resource_path())?;
        let root = self.config.resolve_temp_root()?;

        let staging = StagingDirectory::create(&root, self.config.max_staging_attempts)?;
        let staged = staging.stage(spec.file_name(), reader, self.config.copy_buffer_size)?;

        let path = staged.path().to_path_buf();
        let digest = staged.digest().to_string();
        let action = self.cleanup().register(staged.into_cleanup());

        match self.backend.open_path(&path) {
            Ok(handle) => Ok((path, digest, handle)),
            Err(reason) => {
                // Nothing was loaded; do not leave the copy around until exit
                self.cleanup().run_early(&action);
                Err(Error::DynamicLoadFailure { path, reason })
            }
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, LoaderInner<L::Library>>> {
        self.inner
            .lock()
            .map_err(|e| Error::Internal(format!("lock poisoned: {}", e)))
    }
}

impl<L: DynamicLoader> std::fmt::Debug for NativeLoader<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeLoader")
            .field("config", &self.config)
            .field("platform", &self.platform)
            .field("loaded", &self.is_loaded())
            .finish_non_exhaustive()
    }
}
