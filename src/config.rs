//! Loader configuration read from the process environment.

use log::{debug, warn};
use std::path::PathBuf;

use crate::runtime::Runtime;
use crate::variant::DriverKind;

pub const ENV_BUNDLE: &str = "MESA_LOADER_BUNDLE";
pub const ENV_CACHE_DIR: &str = "MESA_LOADER_CACHE_DIR";
pub const ENV_DRIVER: &str = "MESA_LOADER_DRIVER";
pub const ENV_ARCH: &str = "MESA_LOADER_ARCH";
pub const ENV_PRELOAD: &str = "MESA_LOADER_PRELOAD";

const CACHE_DIR_NAME: &str = "mesa-loader";

#[derive(Debug, Clone, PartialEq)]
pub struct LoaderConfig {
    /// Bundle directory or zip file. Defaults to the directory of the current executable.
    pub bundle: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    /// Driver moved to the front of the default order.
    pub driver: Option<DriverKind>,
    /// Architecture override, bypassing detection.
    pub arch: Option<String>,
    pub preload: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            bundle: None,
            cache_dir: None,
            driver: None,
            arch: None,
            preload: cfg!(windows),
        }
    }
}

impl LoaderConfig {
    #[tracing::instrument(skip(runtime))]
    pub fn from_runtime<R: Runtime>(runtime: &R) -> Self {
        let driver = non_empty(runtime, ENV_DRIVER).and_then(|driver| match driver.parse() {
            Ok(driver) => Some(driver),
            Err(e) => {
                warn!("Ignoring {}: {}", ENV_DRIVER, e);
                None
            }
        });

        let preload = match non_empty(runtime, ENV_PRELOAD) {
            Some(value) => parse_bool(&value).unwrap_or_else(|| {
                warn!("Ignoring {}: not a boolean: {:?}", ENV_PRELOAD, value);
                Self::default().preload
            }),
            None => Self::default().preload,
        };

        let config = Self {
            bundle: non_empty(runtime, ENV_BUNDLE).map(PathBuf::from),
            cache_dir: non_empty(runtime, ENV_CACHE_DIR).map(PathBuf::from),
            driver,
            arch: non_empty(runtime, ENV_ARCH),
            preload,
        };

        debug!("Loader configuration: {:?}", config);
        config
    }

    /// Drivers to try when the caller has no preference.
    pub fn default_order(&self) -> Vec<DriverKind> {
        let mut order = DriverKind::DEFAULT_ORDER.to_vec();
        if let Some(preferred) = self.driver {
            order.retain(|d| *d != preferred);
            order.insert(0, preferred);
        }
        order
    }

    /// Cache directory: configured path, else the user cache dir, else the temp dir.
    pub fn resolve_cache_dir<R: Runtime>(&self, runtime: &R) -> PathBuf {
        if let Some(dir) = &self.cache_dir {
            return dir.clone();
        }
        runtime
            .cache_dir()
            .unwrap_or_else(|| runtime.temp_dir())
            .join(CACHE_DIR_NAME)
    }

    /// Bundle location: configured path, else the directory holding the current executable.
    pub fn resolve_bundle<R: Runtime>(&self, runtime: &R) -> PathBuf {
        if let Some(bundle) = &self.bundle {
            return bundle.clone();
        }
        match runtime.current_exe() {
            Ok(exe) => exe
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            Err(e) => {
                warn!("{:#}; looking for the bundle in the working directory", e);
                PathBuf::from(".")
            }
        }
    }
}

fn non_empty<R: Runtime>(runtime: &R, key: &str) -> Option<String> {
    runtime
        .env_var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
