//! Process-wide loader.
//!
//! An application installs one [`NativeLoader`] at startup; components that
//! need the native code call [`ensure_loaded`] before touching it and depend
//! only on that call succeeding.
//!
//! ```rust,ignore
//! use native_bootstrap::{EmbeddedResources, LoaderConfig, NativeLoader};
//!
//! fn main() -> native_bootstrap::Result<()> {
//!     let resources = EmbeddedResources::new().with(
//!         "/libs/x86_64-linux/libexample-1.0.0.so",
//!         include_bytes!("../native/libexample-1.0.0.so"),
//!     );
//!     native_bootstrap::install(NativeLoader::new(
//!         LoaderConfig::new(["example-1.0.0"]).from_env(),
//!         resources,
//!     ))?;
//!
//!     native_bootstrap::ensure_loaded()?;
//!     Ok(())
//! }
//! ```

use crate::error::{Error, Result};
use crate::loader::NativeLoader;
use std::sync::OnceLock;

static LOADER: OnceLock<NativeLoader> = OnceLock::new();

/// Installs the process-wide loader. Only the first call succeeds.
pub fn install(loader: NativeLoader) -> Result<()> {
    LOADER.set(loader).map_err(|_| Error::AlreadyInstalled)
}

/// Returns the installed loader.
pub fn loader() -> Option<&'static NativeLoader> {
    LOADER.get()
}

/// Makes the installed loader's libraries resident, at most once per process.
pub fn ensure_loaded() -> Result<()> {
    LOADER.get().ok_or(Error::NotInstalled)?.ensure_loaded()
}

/// Returns true once the installed loader has loaded everything.
pub fn is_loaded() -> bool {
    LOADER.get().is_some_and(NativeLoader::is_loaded)
}
