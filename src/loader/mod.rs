//! Native library loader.
//!
//! Picks the backend variant for the host architecture and driver
//! preference, extracts it into the cache and registers it with the dynamic
//! linker. Resolution runs once per [`Loader`]; every later call returns the
//! cached outcome.
//!
//! The process-wide loader used by the premain hook lives in [`global`].

pub mod global;
mod state;

use log::{debug, info, warn};
use serde::Serialize;
use std::path::PathBuf;

use crate::cache::ExtractionCache;
use crate::config::LoaderConfig;
use crate::error::{LoadError, LoadResult};
use crate::platform::{DefaultPlatformDetector, FixedPlatform, PlatformDetector};
use crate::registrar::{LibraryRegistrar, SearchPathRegistrar};
use crate::resource::{BundleSource, ResourceSource};
use crate::runtime::{RealRuntime, Runtime};
use crate::variant::{Arch, BackendVariant, DriverKind, OPENGL_LIBRARY};
use crate::version::{LOADER_VERSION, VERSION_FILE, VersionDescriptor};

pub use state::{InitCell, LoaderState};

/// The library chosen for this process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedLibrary {
    pub variant: BackendVariant,
    /// Absolute path of the primary OpenGL library.
    pub library_path: PathBuf,
    /// Directory registered with the dynamic linker.
    pub directory: PathBuf,
    /// Every extracted file, primary library first.
    pub files: Vec<PathBuf>,
    /// Version recorded in the bundle's descriptor, if it has one.
    pub loader_version: Option<String>,
}

/// Resolve and extract the library for `arch` without touching process state.
///
/// With an explicit `preferred` driver only that driver is considered.
/// Otherwise the drivers in `default_order` are tried in turn and the first
/// one packaged for `arch` wins.
#[tracing::instrument(skip(runtime, source, cache, default_order))]
pub fn resolve_variant<R, S>(
    runtime: &R,
    source: &S,
    cache: &ExtractionCache,
    arch: &str,
    preferred: Option<DriverKind>,
    default_order: &[DriverKind],
) -> LoadResult<ResolvedLibrary>
where
    R: Runtime + 'static,
    S: ResourceSource,
{
    resolve_for_arch(runtime, source, cache, arch.parse()?, preferred, default_order)
}

fn resolve_for_arch<R, S>(
    runtime: &R,
    source: &S,
    cache: &ExtractionCache,
    arch: Arch,
    preferred: Option<DriverKind>,
    default_order: &[DriverKind],
) -> LoadResult<ResolvedLibrary>
where
    R: Runtime + 'static,
    S: ResourceSource,
{
    let variant = select_variant(runtime, source, arch, preferred, default_order)?;
    info!("Selected Mesa variant {}", variant);

    let descriptor = read_descriptor(runtime, source);
    let version = descriptor
        .as_ref()
        .map(|d| d.version.as_str())
        .unwrap_or(LOADER_VERSION);

    let files = cache.materialize(runtime, source, &variant, version)?;
    let library_path = files
        .first()
        .cloned()
        .ok_or_else(|| LoadError::resource_missing(Some(variant), variant.resource_dir()))?;

    Ok(ResolvedLibrary {
        variant,
        directory: cache.variant_dir(version, &variant),
        library_path,
        files,
        loader_version: descriptor.map(|d| d.version),
    })
}

fn select_variant<R, S>(
    runtime: &R,
    source: &S,
    arch: Arch,
    preferred: Option<DriverKind>,
    default_order: &[DriverKind],
) -> LoadResult<BackendVariant>
where
    R: Runtime + 'static,
    S: ResourceSource,
{
    let candidates: Vec<DriverKind> = match preferred {
        Some(driver) => vec![driver],
        None => default_order.to_vec(),
    };

    for driver in &candidates {
        let variant = BackendVariant::new(arch, *driver);
        let primary = format!("{}/{}", variant.resource_dir(), OPENGL_LIBRARY);
        if source.contains(runtime, &primary) {
            return Ok(variant);
        }
        debug!("{} is not packaged", variant);
    }

    let first = candidates.first().copied().unwrap_or(DriverKind::Llvmpipe);
    let variant = BackendVariant::new(arch, first);
    Err(LoadError::resource_missing(
        Some(variant),
        source.locate(&format!("{}/{}", variant.resource_dir(), OPENGL_LIBRARY)),
    ))
}

// A missing or unreadable descriptor only costs provenance reporting.
fn read_descriptor<R, S>(runtime: &R, source: &S) -> Option<VersionDescriptor>
where
    R: Runtime + 'static,
    S: ResourceSource,
{
    if !source.contains(runtime, VERSION_FILE) {
        debug!("Bundle has no {}", VERSION_FILE);
        return None;
    }

    let parsed = source
        .read(runtime, VERSION_FILE)
        .and_then(|bytes| {
            let content = String::from_utf8_lossy(&bytes);
            Ok(VersionDescriptor::parse(&content)?)
        });

    match parsed {
        Ok(descriptor) => {
            if descriptor.version != LOADER_VERSION {
                warn!(
                    "Bundle was packaged by loader {}, running loader {}",
                    descriptor.version, LOADER_VERSION
                );
            }
            Some(descriptor)
        }
        Err(e) => {
            warn!("Ignoring unreadable {}: {:#}", VERSION_FILE, e);
            None
        }
    }
}

/// A loader with its own resolution state.
pub struct Loader<R, S, P, G> {
    runtime: R,
    source: S,
    platform: P,
    registrar: G,
    cache: ExtractionCache,
    default_order: Vec<DriverKind>,
    cell: InitCell,
}

/// Loader wired to the real system, as used by the premain hook.
pub type ProcessLoader =
    Loader<RealRuntime, BundleSource, Box<dyn PlatformDetector>, SearchPathRegistrar>;

impl<R, S, P, G> Loader<R, S, P, G>
where
    R: Runtime + 'static,
    S: ResourceSource,
    P: PlatformDetector,
    G: LibraryRegistrar,
{
    pub fn new(runtime: R, source: S, platform: P, registrar: G, cache: ExtractionCache) -> Self {
        Self {
            runtime,
            source,
            platform,
            registrar,
            cache,
            default_order: DriverKind::DEFAULT_ORDER.to_vec(),
            cell: InitCell::new(),
        }
    }

    pub fn with_default_order(mut self, order: Vec<DriverKind>) -> Self {
        self.default_order = order;
        self
    }

    pub fn cache(&self) -> &ExtractionCache {
        &self.cache
    }

    /// Resolve, extract and register the library, once.
    ///
    /// Every later call returns the first outcome, whatever preference it
    /// passes. Concurrent callers block until that outcome is available.
    pub fn initialize(&self, preferred: Option<DriverKind>) -> LoadResult<ResolvedLibrary> {
        let outcome = self.cell.get_or_resolve(|| self.resolve(preferred));
        if let (Some(wanted), Ok(library)) = (preferred, &outcome)
            && library.variant.driver != wanted
        {
            debug!(
                "Driver {} requested, but {} was already resolved",
                wanted, library.variant
            );
        }
        outcome
    }

    pub fn current_variant(&self) -> Option<BackendVariant> {
        self.cell.current_variant()
    }

    pub fn state(&self) -> LoaderState {
        self.cell.state()
    }

    #[tracing::instrument(skip(self))]
    fn resolve(&self, preferred: Option<DriverKind>) -> LoadResult<ResolvedLibrary> {
        let platform = self.platform.detect();
        debug!("Host platform: {} {}", platform.os, platform.arch);

        let library = platform
            .variant_arch()
            .and_then(|arch| {
                resolve_for_arch(
                    &self.runtime,
                    &self.source,
                    &self.cache,
                    arch,
                    preferred,
                    &self.default_order,
                )
            })
            .inspect_err(|e| warn!("Failed to resolve a Mesa driver: {}", e))?;

        self.registrar
            .register(&self.runtime, &library)
            .inspect_err(|e| warn!("Failed to install {:?}: {}", library.library_path, e))?;

        info!(
            "Using Mesa {} from {:?}",
            library.variant, library.library_path
        );
        Ok(library)
    }
}

impl ProcessLoader {
    /// Build the loader for the real system from `config`.
    pub fn from_config(runtime: RealRuntime, config: &LoaderConfig) -> Self {
        let bundle = config.resolve_bundle(&runtime);
        let source = BundleSource::open(&runtime, &bundle);
        let platform: Box<dyn PlatformDetector> = match &config.arch {
            Some(arch) => Box::new(FixedPlatform::new(arch.clone())),
            None => Box::new(DefaultPlatformDetector),
        };
        let cache = ExtractionCache::new(config.resolve_cache_dir(&runtime));

        Loader::new(
            runtime,
            source,
            platform,
            SearchPathRegistrar::new(config.preload),
            cache,
        )
        .with_default_order(config.default_order())
    }
}
