//! Selects, extracts and installs the bundled Mesa OpenGL driver that fits
//! the host architecture.
//!
//! The process-wide entry points are [`initialize`], [`current_variant`] and
//! [`state`]; native hosts call [`hook::mesa_loader_premain`] instead.

pub mod bundle;
pub mod cache;
pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod hook;
pub mod http;
pub mod loader;
pub mod platform;
pub mod registrar;
pub mod resource;
pub mod runtime;
pub mod variant;
pub mod version;

pub use error::{LoadError, LoadResult};
pub use loader::global::{current_variant, initialize, state};
pub use loader::{LoaderState, ResolvedLibrary};
pub use variant::{Arch, BackendVariant, DriverKind};
