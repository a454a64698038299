//! # native-bootstrap
//!
//! **Exactly-once loading of native libraries embedded in an application**
//!
//! This crate makes a platform-specific shared library that ships inside the
//! application package resident in the process, once, no matter how many
//! threads ask for it. The embedded binary is extracted to a private,
//! permission-hardened staging directory, verified, and loaded from there;
//! if that is not possible the library is looked up on the system search
//! path instead.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                        native-bootstrap                             │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────────┐    │
//! │  │                     NativeLoader                            │    │
//! │  │   ensure_loaded(): fast path → lock → re-check → attempt    │    │
//! │  └─────────────────────────────────────────────────────────────┘    │
//! │                              │                                      │
//! │  ┌───────────────────────────┼───────────────────────────────┐      │
//! │  │                 Extraction (primary)                      │      │
//! │  │  ResourceSource → StagingDirectory (0700, scrubbed)       │      │
//! │  │  → StagedLibrary (O_EXCL, SHA-256 re-check)               │      │
//! │  │  → CleanupRegistry (atexit) → DynamicLoader::open_path    │      │
//! │  └───────────────────────────┼───────────────────────────────┘      │
//! │                              │ any failure                          │
//! │  ┌───────────────────────────┼───────────────────────────────┐      │
//! │  │                 System search path (fallback)             │      │
//! │  │  DynamicLoader::open_by_name("libexample.so")             │      │
//! │  └───────────────────────────────────────────────────────────┘      │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Package Layout
//!
//! The binary for library `X` is expected at
//! `/libs/{arch}-{os}/{native file name of X}`, with both tags lowercased
//! and spaces replaced by underscores:
//!
//! | Platform         | Resource path                                  |
//! |------------------|------------------------------------------------|
//! | Linux x86_64     | `/libs/x86_64-linux/libexample-1.0.0.so`       |
//! | macOS arm64      | `/libs/aarch64-macos/libexample-1.0.0.dylib`   |
//! | Windows x86_64   | `/libs/x86_64-windows/example-1.0.0.dll`       |
//!
//! # Security Model
//!
//! - **Exclusive staging**: staging directories are created with an
//!   exclusive `create_dir` under a random name; an existing path is never
//!   adopted (see [`staging::StagingDirectory::claim`]).
//! - **Owner-only permissions**: `0700` is applied and read back before any
//!   byte is written. Unix only: elsewhere the directory keeps the ACL of
//!   the temporary root and owner-only access is not verified.
//! - **Scrubbing**: anything found in the directory is removed first, or the
//!   attempt fails with [`Error::TamperDetected`].
//! - **Integrity**: the staged file is re-hashed and compared with the
//!   packaged bytes before it is loaded.
//! - **Cleanup**: staged files are removed at process exit, and immediately
//!   when an attempt fails.
//!
//! # Failure Handling
//!
//! Every extraction failure falls back to the system search path. If that
//! fails too, [`Error::FallbackLoadFailure`] is returned with the extraction
//! failure as its `source()`. Failure is not sticky: a later call retries.
//!
//! # Example
//!
//! ```rust,ignore
//! use native_bootstrap::{EmbeddedResources, LoaderConfig, NativeLoader};
//!
//! static LOADER: std::sync::LazyLock<NativeLoader> = std::sync::LazyLock::new(|| {
//!     NativeLoader::new(
//!         LoaderConfig::new(["example-1.0.0"]),
//!         EmbeddedResources::new().with(
//!             "/libs/x86_64-linux/libexample-1.0.0.so",
//!             include_bytes!("../native/libexample-1.0.0.so"),
//!         ),
//!     )
//! });
//!
//! fn start_engine() -> native_bootstrap::Result<()> {
//!     LOADER.ensure_loaded()?;
//!     // native symbols are now available
//!     Ok(())
//! }
//! ```

pub mod cleanup;
pub mod config;
pub mod constants;
pub mod dylib;
pub mod error;
pub mod global;
pub mod loader;
pub mod platform;
pub mod resource;
pub mod staging;

// Re-exports
pub use cleanup::{CleanupAction, CleanupRegistry};
pub use config::LoaderConfig;
pub use constants::*;
pub use dylib::{DynamicLoader, SystemLoader};
pub use error::{Error, Result};
pub use global::{ensure_loaded, install, is_loaded};
pub use loader::{LoadOutcome, LoadState, NativeLoader, ResidentLibrary};
pub use platform::{LibrarySpec, Os, Platform};
pub use resource::{DirectoryResources, EmbeddedResources, ResourceSource};
pub use staging::{StagedLibrary, StagingDirectory};
