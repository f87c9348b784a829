use crate::error::LoadResult;
use crate::variant::Arch;

/// Platform information for variant selection
#[derive(Debug, Clone, PartialEq)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl Platform {
    /// Detect the current platform
    pub fn detect() -> Self {
        Self {
            os: Self::detect_os(),
            arch: Self::detect_arch(),
        }
    }

    /// Map the raw architecture onto one of the shipped architectures.
    pub fn variant_arch(&self) -> LoadResult<Arch> {
        self.arch.parse()
    }

    fn detect_os() -> String {
        #[cfg(target_os = "macos")]
        {
            "macos".to_string()
        }
        #[cfg(target_os = "linux")]
        {
            "linux".to_string()
        }
        #[cfg(target_os = "windows")]
        {
            "windows".to_string()
        }
        #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
        {
            std::env::consts::OS.to_string()
        }
    }

    // The arch of the process, not the machine: an x86 process on a 64-bit
    // Windows host must load the x86 driver.
    fn detect_arch() -> String {
        #[cfg(target_arch = "x86_64")]
        {
            "x86_64".to_string()
        }
        #[cfg(target_arch = "aarch64")]
        {
            "aarch64".to_string()
        }
        #[cfg(target_arch = "x86")]
        {
            "i686".to_string()
        }
        #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64", target_arch = "x86")))]
        {
            std::env::consts::ARCH.to_string()
        }
    }
}

/// Trait for platform detection (useful for testing)
pub trait PlatformDetector: Send + Sync {
    fn detect(&self) -> Platform;
}

impl<T: PlatformDetector + ?Sized> PlatformDetector for Box<T> {
    fn detect(&self) -> Platform {
        (**self).detect()
    }
}

/// Default platform detector using compile-time detection
pub struct DefaultPlatformDetector;

impl PlatformDetector for DefaultPlatformDetector {
    fn detect(&self) -> Platform {
        Platform::detect()
    }
}

/// Detector that reports a fixed architecture on the current OS.
/// Backs the `MESA_LOADER_ARCH` override.
pub struct FixedPlatform {
    arch: String,
}

impl FixedPlatform {
    pub fn new(arch: impl Into<String>) -> Self {
        Self { arch: arch.into() }
    }
}

impl PlatformDetector for FixedPlatform {
    fn detect(&self) -> Platform {
        Platform {
            os: Platform::detect().os,
            arch: self.arch.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoadError;

    #[test]
    fn test_platform_detect() {
        let platform = Platform::detect();

        assert!(!platform.os.is_empty());
        assert!(!platform.arch.is_empty());

        #[cfg(target_os = "linux")]
        assert_eq!(platform.os, "linux");

        #[cfg(target_os = "windows")]
        assert_eq!(platform.os, "windows");

        #[cfg(target_arch = "x86_64")]
        assert_eq!(platform.variant_arch().unwrap(), Arch::X64);

        #[cfg(target_arch = "aarch64")]
        assert_eq!(platform.variant_arch().unwrap(), Arch::Arm64);
    }

    #[test]
    fn test_fixed_platform() {
        let detector = FixedPlatform::new("x86");
        let platform = detector.detect();

        assert_eq!(platform.arch, "x86");
        assert_eq!(platform.os, Platform::detect().os);
        assert_eq!(platform.variant_arch().unwrap(), Arch::X86);
    }

    #[test]
    fn test_unmapped_arch() {
        let platform = Platform {
            os: "linux".into(),
            arch: "powerpc64".into(),
        };

        assert_eq!(
            platform.variant_arch().unwrap_err(),
            LoadError::UnsupportedArchitecture("powerpc64".into())
        );
    }

    #[test]
    fn test_default_platform_detector() {
        let detector = DefaultPlatformDetector;
        assert_eq!(detector.detect(), Platform::detect());
    }
}
