//! The version descriptor stored at the root of every bundle.
//!
//! Format is a single properties line: `loader.version=<version>`.

use anyhow::{Context, Result};
use std::path::Path;

use crate::error::{LoadError, LoadResult};
use crate::runtime::Runtime;

/// Bundle-relative location of the descriptor.
pub const VERSION_FILE: &str = "version.properties";

const VERSION_KEY: &str = "loader.version";

/// Version of this build of the loader, stamped by the build script.
pub const LOADER_VERSION: &str = env!("MESA_LOADER_VERSION");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionDescriptor {
    pub version: String,
}

impl VersionDescriptor {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
        }
    }

    pub fn render(&self) -> String {
        format!("{}={}\n", VERSION_KEY, self.version)
    }

    /// Parse a descriptor. Blank lines and `#`/`!` comments are ignored,
    /// other keys are tolerated.
    pub fn parse(content: &str) -> LoadResult<Self> {
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }

            let Some((key, value)) = line.split_once(['=', ':']) else {
                continue;
            };
            if key.trim() != VERSION_KEY {
                continue;
            }

            let value = value.trim();
            if value.is_empty() {
                return Err(LoadError::InvalidVersionDescriptor(format!(
                    "{} is empty",
                    VERSION_KEY
                )));
            }
            return Ok(Self::new(value));
        }

        Err(LoadError::InvalidVersionDescriptor(format!(
            "{} not found",
            VERSION_KEY
        )))
    }

    /// Write the descriptor into `dir`, creating it if needed.
    #[tracing::instrument(skip(runtime))]
    pub fn save<R: Runtime>(&self, runtime: &R, dir: &Path) -> Result<()> {
        runtime.create_dir_all(dir)?;
        let path = dir.join(VERSION_FILE);
        runtime
            .write(&path, self.render().as_bytes())
            .with_context(|| format!("Failed to write version descriptor {:?}", path))
    }
}
