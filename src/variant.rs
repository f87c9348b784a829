//! The fixed set of backend variants shipped in a bundle.
//!
//! A variant is an (architecture, driver) pair. The set is known at build
//! time; nothing here is discovered at runtime.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::error::LoadError;

/// Primary OpenGL library shipped for every variant.
pub const OPENGL_LIBRARY: &str = "opengl32.dll";

/// Compiled-shader support library, shipped only with the D3D12 driver.
pub const DXIL_LIBRARY: &str = "dxil.dll";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    X86,
    X64,
    Arm64,
}

impl Arch {
    pub const ALL: [Arch; 3] = [Arch::X86, Arch::X64, Arch::Arm64];

    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::X86 => "x86",
            Arch::X64 => "x64",
            Arch::Arm64 => "arm64",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Arch {
    type Err = LoadError;

    /// Accepts the canonical names plus the aliases used by compilers and
    /// operating systems (`x86_64`, `amd64`, `aarch64`, `i686`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "x86" | "i386" | "i486" | "i586" | "i686" => Ok(Arch::X86),
            "x64" | "x86_64" | "amd64" => Ok(Arch::X64),
            "arm64" | "aarch64" => Ok(Arch::Arm64),
            _ => Err(LoadError::UnsupportedArchitecture(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// Software rasterizer.
    Llvmpipe,
    /// Hardware accelerated through Direct3D 12.
    D3d12,
    /// Hardware accelerated through the Vulkan translation layer.
    Zink,
}

impl DriverKind {
    pub const ALL: [DriverKind; 3] = [DriverKind::Llvmpipe, DriverKind::D3d12, DriverKind::Zink];

    /// Order tried when the caller has no preference: hardware first, software last.
    pub const DEFAULT_ORDER: [DriverKind; 3] =
        [DriverKind::D3d12, DriverKind::Zink, DriverKind::Llvmpipe];

    pub fn as_str(&self) -> &'static str {
        match self {
            DriverKind::Llvmpipe => "llvmpipe",
            DriverKind::D3d12 => "d3d12",
            DriverKind::Zink => "zink",
        }
    }

    /// Library files that make up this driver, primary library first.
    pub fn library_files(&self) -> &'static [&'static str] {
        match self {
            DriverKind::D3d12 => &[OPENGL_LIBRARY, DXIL_LIBRARY],
            DriverKind::Llvmpipe | DriverKind::Zink => &[OPENGL_LIBRARY],
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DriverKind {
    type Err = LoadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "llvmpipe" | "software" => Ok(DriverKind::Llvmpipe),
            "d3d12" | "directx" | "dx12" => Ok(DriverKind::D3d12),
            "zink" | "vulkan" => Ok(DriverKind::Zink),
            _ => Err(LoadError::InvalidDriver(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BackendVariant {
    pub arch: Arch,
    pub driver: DriverKind,
}

impl BackendVariant {
    pub fn new(arch: Arch, driver: DriverKind) -> Self {
        Self { arch, driver }
    }

    /// Every shipped variant, grouped by architecture.
    pub fn all() -> Vec<BackendVariant> {
        Arch::ALL
            .iter()
            .flat_map(|arch| {
                DriverKind::ALL
                    .iter()
                    .map(move |driver| BackendVariant::new(*arch, *driver))
            })
            .collect()
    }

    /// Directory of this variant inside a bundle, `<arch>/<driver>`.
    pub fn resource_dir(&self) -> String {
        format!("{}/{}", self.arch, self.driver)
    }

    /// Bundle-relative paths of every file belonging to this variant.
    pub fn resource_paths(&self) -> Vec<String> {
        self.driver
            .library_files()
            .iter()
            .map(|file| format!("{}/{}", self.resource_dir(), file))
            .collect()
    }

    /// Name of the upstream release archive, without extension.
    pub fn archive_stem(&self, mesa_version: &str) -> String {
        format!("mesa-{}-{}-{}", self.driver, self.arch, mesa_version)
    }
}

impl fmt::Display for BackendVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.arch, self.driver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arch_aliases() {
        assert_eq!("x86_64".parse::<Arch>().unwrap(), Arch::X64);
        assert_eq!("AMD64".parse::<Arch>().unwrap(), Arch::X64);
        assert_eq!("aarch64".parse::<Arch>().unwrap(), Arch::Arm64);
        assert_eq!("i686".parse::<Arch>().unwrap(), Arch::X86);
        assert_eq!(" arm64 ".parse::<Arch>().unwrap(), Arch::Arm64);
    }

    #[test]
    fn test_arch_unknown() {
        let err = "riscv64".parse::<Arch>().unwrap_err();
        assert_eq!(err, LoadError::UnsupportedArchitecture("riscv64".into()));
    }

    #[test]
    fn test_driver_aliases() {
        assert_eq!("software".parse::<DriverKind>().unwrap(), DriverKind::Llvmpipe);
        assert_eq!("DirectX".parse::<DriverKind>().unwrap(), DriverKind::D3d12);
        assert_eq!("vulkan".parse::<DriverKind>().unwrap(), DriverKind::Zink);
        assert!(matches!(
            "swiftshader".parse::<DriverKind>(),
            Err(LoadError::InvalidDriver(_))
        ));
    }

    #[test]
    fn test_canonical_names_parse_back() {
        for variant in BackendVariant::all() {
            assert_eq!(variant.arch.as_str().parse::<Arch>().unwrap(), variant.arch);
            assert_eq!(
                variant.driver.as_str().parse::<DriverKind>().unwrap(),
                variant.driver
            );
        }
    }

    #[test]
    fn test_all_has_nine_unique_variants() {
        let mut all = BackendVariant::all();
        assert_eq!(all.len(), 9);
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 9);
    }

    #[test]
    fn test_only_d3d12_ships_dxil() {
        let d3d12 = BackendVariant::new(Arch::X64, DriverKind::D3d12);
        assert_eq!(
            d3d12.resource_paths(),
            vec!["x64/d3d12/opengl32.dll", "x64/d3d12/dxil.dll"]
        );

        let zink = BackendVariant::new(Arch::Arm64, DriverKind::Zink);
        assert_eq!(zink.resource_paths(), vec!["arm64/zink/opengl32.dll"]);
    }

    #[test]
    fn test_archive_stem() {
        let v = BackendVariant::new(Arch::X86, DriverKind::Llvmpipe);
        assert_eq!(v.archive_stem("25.2.1"), "mesa-llvmpipe-x86-25.2.1");
    }

    #[test]
    fn test_default_order_prefers_hardware() {
        assert_eq!(DriverKind::DEFAULT_ORDER[0], DriverKind::D3d12);
        assert_eq!(DriverKind::DEFAULT_ORDER[2], DriverKind::Llvmpipe);
    }

    #[test]
    fn test_serialize_lowercase() {
        let v = BackendVariant::new(Arch::Arm64, DriverKind::D3d12);
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, r#"{"arch":"arm64","driver":"d3d12"}"#);
    }
}
