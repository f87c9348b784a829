//! Spawning external tools.

use anyhow::{Context, Result, bail};
use log::debug;
use std::ffi::OsString;
use std::path::Path;
use std::process::Command;

use super::RealRuntime;

impl RealRuntime {
    #[tracing::instrument(skip(self))]
    pub(crate) fn run_command_impl(&self, program: &Path, args: &[OsString]) -> Result<()> {
        debug!("Running {:?} {:?}", program, args);
        let status = Command::new(program)
            .args(args)
            .status()
            .with_context(|| format!("Failed to start {:?}", program))?;

        if !status.success() {
            bail!("{:?} exited with {}", program, status);
        }
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use crate::runtime::{RealRuntime, Runtime};
    use std::ffi::OsString;
    use std::path::Path;

    #[test]
    fn test_run_command_success() {
        let args = vec![OsString::from("-c"), OsString::from("exit 0")];
        assert!(RealRuntime.run_command(Path::new("/bin/sh"), &args).is_ok());
    }

    #[test]
    fn test_run_command_non_zero_exit() {
        let args = vec![OsString::from("-c"), OsString::from("exit 3")];
        let err = RealRuntime
            .run_command(Path::new("/bin/sh"), &args)
            .unwrap_err();
        assert!(err.to_string().contains("exited with"));
    }

    #[test]
    fn test_run_command_missing_program() {
        let result = RealRuntime.run_command(Path::new("/nonexistent/7zz"), &[]);
        assert!(result.is_err());
    }
}
