//! Host platform detection
//!
//! This module detects the operating system and CPU architecture of the
//! running process and maps the architecture onto the shipped variants.

mod detection;

pub use detection::{DefaultPlatformDetector, FixedPlatform, Platform, PlatformDetector};
