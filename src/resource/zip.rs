use crate::runtime::Runtime;
use anyhow::{Context, Result, anyhow, bail};
use log::debug;
use parking_lot::Mutex;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use zip::ZipArchive;

use super::ResourceSource;

type Archive = ZipArchive<Cursor<Vec<u8>>>;

/// Largest entry a bundle may hold. Sizes come from the archive itself, so
/// anything above this is treated as corruption.
pub const MAX_ENTRY_SIZE: u64 = 512 * 1024 * 1024;

/// Bundle packaged as a single zip file
pub struct ZipSource {
    path: PathBuf,
    // Parsed once on first use; `None` until then.
    archive: Mutex<Option<Archive>>,
}

impl ZipSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            archive: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load<R: Runtime>(&self, runtime: &R) -> Result<Archive> {
        debug!("Opening zip bundle {:?}...", self.path);
        let file = runtime
            .open(&self.path)
            .with_context(|| format!("Failed to open bundle at {:?}", self.path))?;

        // zip crate requires Read + Seek, but Runtime::open returns Box<dyn Read + Send>
        let mut buffer = Vec::new();
        let mut reader = file;
        reader
            .read_to_end(&mut buffer)
            .with_context(|| format!("Failed to read bundle {:?}", self.path))?;

        ZipArchive::new(Cursor::new(buffer))
            .with_context(|| format!("Failed to parse zip bundle {:?}", self.path))
    }

    fn with_archive<R, T, F>(&self, runtime: &R, f: F) -> Result<T>
    where
        R: Runtime,
        F: FnOnce(&mut Archive) -> Result<T>,
    {
        let mut guard = self.archive.lock();
        if guard.is_none() {
            *guard = Some(self.load(runtime)?);
        }
        let archive = guard
            .as_mut()
            .ok_or_else(|| anyhow!("Bundle {:?} is not loaded", self.path))?;
        f(archive)
    }
}

impl ResourceSource for ZipSource {
    fn locate(&self, relative: &str) -> String {
        format!("{}!/{}", self.path.display(), relative)
    }

    fn contains<R: Runtime + 'static>(&self, runtime: &R, relative: &str) -> bool {
        self.with_archive(runtime, |archive| {
            let entry = archive.by_name(relative)?;
            Ok(entry.is_file() && entry.size() > 0)
        })
        .unwrap_or(false)
    }

    #[tracing::instrument(skip(self, runtime))]
    fn read<R: Runtime + 'static>(&self, runtime: &R, relative: &str) -> Result<Vec<u8>> {
        self.with_archive(runtime, |archive| {
            let mut entry = archive
                .by_name(relative)
                .with_context(|| format!("{} not found in bundle", relative))?;

            let declared = entry.size();
            if declared > MAX_ENTRY_SIZE {
                bail!(
                    "{} declares {} bytes, more than the {} allowed",
                    relative,
                    declared,
                    MAX_ENTRY_SIZE
                );
            }

            let mut bytes = Vec::new();
            entry
                .by_ref()
                .take(declared + 1)
                .read_to_end(&mut bytes)
                .with_context(|| format!("Failed to decompress {}", relative))?;
            if bytes.is_empty() {
                bail!("Bundled resource {} is empty", relative);
            }
            if bytes.len() as u64 != declared {
                bail!(
                    "{} holds {} bytes but declares {}",
                    relative,
                    bytes.len(),
                    declared
                );
            }
            Ok(bytes)
        })
    }
}
