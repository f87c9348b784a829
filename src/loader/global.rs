//! The one loader per process.
//!
//! Built lazily from the environment on first use. Only reachable through
//! [`initialize`], [`current_variant`] and [`state`].

use std::sync::OnceLock;

use super::{LoaderState, ProcessLoader, ResolvedLibrary};
use crate::config::LoaderConfig;
use crate::error::LoadResult;
use crate::runtime::RealRuntime;
use crate::variant::{BackendVariant, DriverKind};

static PROCESS_LOADER: OnceLock<ProcessLoader> = OnceLock::new();

fn process_loader(arch: Option<&str>) -> &'static ProcessLoader {
    PROCESS_LOADER.get_or_init(|| {
        let runtime = RealRuntime;
        let mut config = LoaderConfig::from_runtime(&runtime);
        if let Some(arch) = arch {
            config.arch = Some(arch.to_string());
        }
        ProcessLoader::from_config(runtime, &config)
    })
}

/// Resolve and install the Mesa driver for this process.
///
/// Safe to call from several initialization hooks: only the first call does
/// any work, every caller receives the same outcome.
pub fn initialize(preferred: Option<DriverKind>) -> LoadResult<ResolvedLibrary> {
    process_loader(None).initialize(preferred)
}

/// Like [`initialize`], resolving for `arch` instead of the detected
/// architecture. The override only applies if this call creates the loader.
pub fn initialize_for_arch(
    preferred: Option<DriverKind>,
    arch: &str,
) -> LoadResult<ResolvedLibrary> {
    process_loader(Some(arch)).initialize(preferred)
}

/// The variant installed in this process, if [`initialize`] succeeded.
pub fn current_variant() -> Option<BackendVariant> {
    PROCESS_LOADER.get().and_then(|loader| loader.current_variant())
}

pub fn state() -> LoaderState {
    PROCESS_LOADER
        .get()
        .map(|loader| loader.state())
        .unwrap_or(LoaderState::Uninitialized)
}
