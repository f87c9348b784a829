//! Extraction cache for bundled libraries.
//!
//! Libraries are materialized under `<root>/<version>/<arch>/<driver>/` so
//! the operating system can load them straight from disk. Writers hold an
//! exclusive lock on `<root>/<version>/.lock` and write every file through a
//! temp-name-then-rename, so concurrent first runs from independent processes
//! never expose a partial file.

use log::{debug, info};
use std::path::{Path, PathBuf};

use crate::error::{LoadError, LoadResult};
use crate::resource::ResourceSource;
use crate::runtime::Runtime;
use crate::variant::BackendVariant;

const LOCK_FILE: &str = ".lock";

/// Mode given to extracted libraries on Unix.
const LIBRARY_MODE: u32 = 0o755;

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionCache {
    root: PathBuf,
}

impl ExtractionCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn variant_dir(&self, version: &str, variant: &BackendVariant) -> PathBuf {
        self.root
            .join(sanitize(version))
            .join(variant.arch.as_str())
            .join(variant.driver.as_str())
    }

    /// Copy every file of `variant` out of `source` into the cache and return
    /// the extracted paths, primary library first.
    ///
    /// Files already present with identical contents are left untouched.
    #[tracing::instrument(skip(self, runtime, source))]
    pub fn materialize<R, S>(
        &self,
        runtime: &R,
        source: &S,
        variant: &BackendVariant,
        version: &str,
    ) -> LoadResult<Vec<PathBuf>>
    where
        R: Runtime + 'static,
        S: ResourceSource,
    {
        let version_dir = self.root.join(sanitize(version));
        let target_dir = self.variant_dir(version, variant);

        runtime
            .create_dir_all(&target_dir)
            .map_err(|e| LoadError::from_write_error(&e, &target_dir))?;

        let lock_path = version_dir.join(LOCK_FILE);
        let _lock = runtime
            .lock_exclusive(&lock_path)
            .map_err(|e| LoadError::from_write_error(&e, &lock_path))?;

        let mut extracted = Vec::new();
        for (relative, file_name) in variant
            .resource_paths()
            .into_iter()
            .zip(variant.driver.library_files())
        {
            let bytes = source.read(runtime, &relative).map_err(|e| {
                debug!("Failed to read {}: {:#}", relative, e);
                LoadError::resource_missing(Some(*variant), source.locate(&relative))
            })?;

            let dest = target_dir.join(file_name);
            if is_current(runtime, &dest, &bytes) {
                debug!("{:?} is already extracted", dest);
            } else {
                info!("Extracting {} to {:?}", relative, dest);
                runtime
                    .write_atomic(&dest, &bytes)
                    .map_err(|e| LoadError::from_write_error(&e, &dest))?;
                #[cfg(unix)]
                if let Err(e) = runtime.set_permissions(&dest, LIBRARY_MODE) {
                    debug!("Failed to set permissions on {:?}: {}", dest, e);
                }
            }
            extracted.push(dest);
        }

        Ok(extracted)
    }
}

fn is_current<R: Runtime>(runtime: &R, path: &Path, expected: &[u8]) -> bool {
    runtime.exists(path)
        && runtime
            .file_len(path)
            .is_ok_and(|len| len == expected.len() as u64)
        && runtime.read(path).is_ok_and(|existing| existing == expected)
}

// Versions come from bundle metadata; keep them to a single path component.
fn sanitize(version: &str) -> String {
    let cleaned: String = version
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '+') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match cleaned.trim_matches('.') {
        "" => "unversioned".to_string(),
        s => s.to_string(),
    }
}
