//! Installing a resolved library into the process's dynamic-linking state.

use log::{debug, info};
use parking_lot::Mutex;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::error::{LoadError, LoadResult};
use crate::loader::ResolvedLibrary;
use crate::runtime::Runtime;

/// Trait for making a resolved library visible to the host process
#[cfg_attr(test, mockall::automock)]
pub trait LibraryRegistrar: Send + Sync {
    fn register<R: Runtime + 'static>(
        &self,
        runtime: &R,
        library: &ResolvedLibrary,
    ) -> LoadResult<()>;
}

/// Environment variable the platform's dynamic linker searches.
pub fn search_path_var() -> &'static str {
    if cfg!(windows) {
        "PATH"
    } else if cfg!(target_os = "macos") {
        "DYLD_LIBRARY_PATH"
    } else {
        "LD_LIBRARY_PATH"
    }
}

/// Prepends the library directory to the linker search path and, when
/// enabled, preloads the primary library so later lookups by name resolve
/// to the already loaded module.
pub struct SearchPathRegistrar {
    preload: bool,
    // Libraries stay loaded for the lifetime of the process.
    loaded: Mutex<Vec<libloading::Library>>,
}

impl SearchPathRegistrar {
    pub fn new(preload: bool) -> Self {
        Self {
            preload,
            loaded: Mutex::new(Vec::new()),
        }
    }

    pub fn preloaded_count(&self) -> usize {
        self.loaded.lock().len()
    }

    fn prepend_search_path<R: Runtime>(&self, runtime: &R, dir: &Path) -> LoadResult<()> {
        let var = search_path_var();
        let current = runtime.env_var(var).unwrap_or_default();
        let updated = prepend_path(&current, dir)?;

        match updated {
            Some(value) => {
                debug!("Prepending {:?} to {}", dir, var);
                runtime
                    .set_env_var(var, &value)
                    .map_err(|e| registration_failed(dir, &e))
            }
            None => {
                debug!("{:?} already leads {}", dir, var);
                Ok(())
            }
        }
    }

    fn preload_library(&self, path: &Path) -> LoadResult<()> {
        // SAFETY: the library is a Mesa OpenGL driver whose initializers are
        // safe to run at load time; it is never unloaded.
        let library = unsafe { libloading::Library::new(path) }.map_err(|e| {
            LoadError::RegistrationFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }
        })?;
        info!("Preloaded {:?}", path);
        self.loaded.lock().push(library);
        Ok(())
    }
}

impl LibraryRegistrar for SearchPathRegistrar {
    #[tracing::instrument(skip(self, runtime))]
    fn register<R: Runtime + 'static>(
        &self,
        runtime: &R,
        library: &ResolvedLibrary,
    ) -> LoadResult<()> {
        self.prepend_search_path(runtime, &library.directory)?;
        if self.preload {
            self.preload_library(&library.library_path)?;
        }
        Ok(())
    }
}

/// Build a new search-path value with `dir` first, dropping any later copy of it.
/// Returns `None` when `dir` already leads the list.
fn prepend_path(current: &str, dir: &Path) -> LoadResult<Option<OsString>> {
    let existing: Vec<PathBuf> = std::env::split_paths(current).collect();
    if existing.first().is_some_and(|first| first == dir) {
        return Ok(None);
    }

    let entries = std::iter::once(dir.to_path_buf()).chain(
        existing
            .into_iter()
            .filter(|entry| entry != dir && !entry.as_os_str().is_empty()),
    );
    std::env::join_paths(entries)
        .map(Some)
        .map_err(|e| LoadError::RegistrationFailed {
            path: dir.to_path_buf(),
            message: e.to_string(),
        })
}

fn registration_failed(path: &Path, err: &anyhow::Error) -> LoadError {
    LoadError::RegistrationFailed {
        path: path.to_path_buf(),
        message: format!("{:#}", err),
    }
}
