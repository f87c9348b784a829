//! Typed errors reported by the loader.
//!
//! Every variant is `Clone` because a resolution outcome is cached for the
//! lifetime of the process and handed to every later caller.

use std::io;
use std::path::{Path, PathBuf};

use crate::variant::BackendVariant;

pub type LoadResult<T> = Result<T, LoadError>;

// `Option<BackendVariant>` has no Display; errors about the bundle itself carry no variant.
struct OptionVariant<'a>(&'a Option<BackendVariant>);

impl std::fmt::Display for OptionVariant<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Some(v) => write!(f, "{}", v),
            None => f.write_str("bundle"),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("unsupported architecture: {0:?} (expected one of x86, x64, arm64)")]
    UnsupportedArchitecture(String),

    #[error("packaged resource for {} is missing: {path}", OptionVariant(.variant))]
    ResourceMissing {
        variant: Option<BackendVariant>,
        path: String,
    },

    #[error("failed to extract {}: {message}", .path.display())]
    ExtractionFailed { path: PathBuf, message: String },

    #[error("permission denied while writing to {}", .path.display())]
    PermissionDenied { path: PathBuf },

    #[error("failed to register {} with the dynamic linker: {message}", .path.display())]
    RegistrationFailed { path: PathBuf, message: String },

    #[error("unknown driver: {0:?} (expected one of llvmpipe, d3d12, zink)")]
    InvalidDriver(String),

    #[error("invalid version descriptor: {0}")]
    InvalidVersionDescriptor(String),
}

impl LoadError {
    pub fn resource_missing(variant: Option<BackendVariant>, path: impl Into<String>) -> Self {
        Self::ResourceMissing {
            variant,
            path: path.into(),
        }
    }

    /// Map a failed write under `path` to `PermissionDenied` or `ExtractionFailed`.
    pub fn from_write_error(err: &anyhow::Error, path: &Path) -> Self {
        match io_kind(err) {
            Some(io::ErrorKind::PermissionDenied) | Some(io::ErrorKind::ReadOnlyFilesystem) => {
                Self::PermissionDenied {
                    path: path.to_path_buf(),
                }
            }
            _ => Self::ExtractionFailed {
                path: path.to_path_buf(),
                message: format!("{:#}", err),
            },
        }
    }

    /// Stable numeric code used across the C ABI. Zero is reserved for success.
    pub fn code(&self) -> i32 {
        match self {
            Self::UnsupportedArchitecture(_) => 1,
            Self::ResourceMissing { .. } => 2,
            Self::ExtractionFailed { .. } => 3,
            Self::PermissionDenied { .. } => 4,
            Self::RegistrationFailed { .. } => 5,
            Self::InvalidDriver(_) => 6,
            Self::InvalidVersionDescriptor(_) => 7,
        }
    }
}

/// Find the innermost I/O error kind in an anyhow chain.
pub(crate) fn io_kind(err: &anyhow::Error) -> Option<io::ErrorKind> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<io::Error>())
        .map(io::Error::kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variant::{Arch, DriverKind};
    use anyhow::Context;

    #[test]
    fn test_display_mentions_variant_and_path() {
        let err = LoadError::resource_missing(
            Some(BackendVariant::new(Arch::X64, DriverKind::Zink)),
            "x64/zink/opengl32.dll",
        );
        let msg = err.to_string();
        assert!(msg.contains("x64/zink"));
        assert!(msg.contains("opengl32.dll"));
    }

    #[test]
    fn test_display_without_variant() {
        let err = LoadError::resource_missing(None, "/opt/bundle.zip");
        assert!(err.to_string().contains("bundle"));
    }

    #[test]
    fn test_from_write_error_permission_denied() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "nope");
        let err = Err::<(), _>(io_err)
            .context("Failed to write file")
            .unwrap_err();

        let mapped = LoadError::from_write_error(&err, Path::new("/cache/x64"));
        assert_eq!(
            mapped,
            LoadError::PermissionDenied {
                path: PathBuf::from("/cache/x64")
            }
        );
    }

    #[test]
    fn test_from_write_error_other_io_is_extraction_failure() {
        let io_err = io::Error::other("disk full");
        let err = anyhow::Error::from(io_err);

        let mapped = LoadError::from_write_error(&err, Path::new("/cache/x64"));
        assert!(matches!(mapped, LoadError::ExtractionFailed { .. }));
        assert!(mapped.to_string().contains("disk full"));
    }

    #[test]
    fn test_codes_are_distinct_and_non_zero() {
        let errors = [
            LoadError::UnsupportedArchitecture("mips".into()),
            LoadError::resource_missing(None, "x"),
            LoadError::ExtractionFailed {
                path: PathBuf::new(),
                message: String::new(),
            },
            LoadError::PermissionDenied {
                path: PathBuf::new(),
            },
            LoadError::RegistrationFailed {
                path: PathBuf::new(),
                message: String::new(),
            },
            LoadError::InvalidDriver("x".into()),
            LoadError::InvalidVersionDescriptor("x".into()),
        ];
        let mut codes: Vec<i32> = errors.iter().map(LoadError::code).collect();
        assert!(codes.iter().all(|c| *c != 0));
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }
}
