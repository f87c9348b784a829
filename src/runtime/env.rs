//! Environment and system information operations.

use anyhow::{Context, Result};
use std::env;
use std::ffi::OsStr;
use std::path::PathBuf;

use super::RealRuntime;

impl RealRuntime {
    #[tracing::instrument(skip(self))]
    pub(crate) fn env_var_impl(&self, key: &str) -> Result<String, env::VarError> {
        env::var(key)
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn set_env_var_impl(&self, key: &str, value: &OsStr) -> Result<()> {
        // SAFETY: the loader mutates the search path once, from the premain hook,
        // before the host starts the threads that would read the environment.
        unsafe {
            env::set_var(key, value);
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn cache_dir_impl(&self) -> Option<PathBuf> {
        dirs::cache_dir()
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn temp_dir_impl(&self) -> PathBuf {
        env::temp_dir()
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn current_exe_impl(&self) -> Result<PathBuf> {
        env::current_exe().context("Failed to determine the current executable")
    }
}
