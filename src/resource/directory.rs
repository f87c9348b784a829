use crate::runtime::Runtime;
use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};

use super::ResourceSource;

/// Bundle laid out as plain files under a root directory
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, relative: &str) -> PathBuf {
        relative
            .split('/')
            .filter(|part| !part.is_empty())
            .fold(self.root.clone(), |path, part| path.join(part))
    }
}

impl ResourceSource for DirectorySource {
    fn locate(&self, relative: &str) -> String {
        self.resolve(relative).display().to_string()
    }

    fn contains<R: Runtime + 'static>(&self, runtime: &R, relative: &str) -> bool {
        let path = self.resolve(relative);
        runtime.exists(&path)
            && !runtime.is_dir(&path)
            && runtime.file_len(&path).is_ok_and(|len| len > 0)
    }

    #[tracing::instrument(skip(self, runtime))]
    fn read<R: Runtime + 'static>(&self, runtime: &R, relative: &str) -> Result<Vec<u8>> {
        let path = self.resolve(relative);
        let bytes = runtime
            .read(&path)
            .with_context(|| format!("Failed to read bundled resource {:?}", path))?;
        if bytes.is_empty() {
            bail!("Bundled resource {:?} is empty", path);
        }
        Ok(bytes)
    }
}
