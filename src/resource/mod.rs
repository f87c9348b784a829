//! Where packaged driver libraries come from.
//!
//! A bundle is either an exploded directory or a zip file. Both use the
//! same layout: `<arch>/<driver>/<library>` plus `version.properties` at
//! the root. Paths handed to a source are bundle-relative and always use
//! `/` as separator.

mod directory;
mod zip;

use crate::runtime::Runtime;
use anyhow::Result;
use log::debug;
use std::path::{Path, PathBuf};

pub use directory::DirectorySource;
pub use zip::ZipSource;

/// Trait for reading packaged resources out of a bundle
pub trait ResourceSource: Send + Sync {
    /// Human-readable location of a resource, for error messages.
    fn locate(&self, relative: &str) -> String;

    /// Check whether the bundle contains a non-empty resource at `relative`
    fn contains<R: Runtime + 'static>(&self, runtime: &R, relative: &str) -> bool;

    /// Read a resource completely into memory
    fn read<R: Runtime + 'static>(&self, runtime: &R, relative: &str) -> Result<Vec<u8>>;
}

/// Dispatcher over the supported bundle kinds, chosen by what is on disk.
pub enum BundleSource {
    Directory(DirectorySource),
    Zip(ZipSource),
}

impl BundleSource {
    /// Open the bundle at `path`: a directory is read in place, anything
    /// else is treated as a zip archive.
    pub fn open<R: Runtime>(runtime: &R, path: &Path) -> Self {
        if runtime.is_dir(path) {
            debug!("Using bundle directory {:?}", path);
            BundleSource::Directory(DirectorySource::new(path))
        } else {
            debug!("Using bundle archive {:?}", path);
            BundleSource::Zip(ZipSource::new(path))
        }
    }

    pub fn path(&self) -> PathBuf {
        match self {
            BundleSource::Directory(source) => source.root().to_path_buf(),
            BundleSource::Zip(source) => source.path().to_path_buf(),
        }
    }
}

impl ResourceSource for BundleSource {
    fn locate(&self, relative: &str) -> String {
        match self {
            BundleSource::Directory(source) => source.locate(relative),
            BundleSource::Zip(source) => source.locate(relative),
        }
    }

    fn contains<R: Runtime + 'static>(&self, runtime: &R, relative: &str) -> bool {
        match self {
            BundleSource::Directory(source) => source.contains(runtime, relative),
            BundleSource::Zip(source) => source.contains(runtime, relative),
        }
    }

    fn read<R: Runtime + 'static>(&self, runtime: &R, relative: &str) -> Result<Vec<u8>> {
        match self {
            BundleSource::Directory(source) => source.read(runtime, relative),
            BundleSource::Zip(source) => source.read(runtime, relative),
        }
    }
}
