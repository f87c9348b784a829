use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use mesa_loader::bundle::{self, BundleRequest};
use mesa_loader::config::LoaderConfig;
use mesa_loader::http::HttpClient;
use mesa_loader::loader::ProcessLoader;
use mesa_loader::runtime::RealRuntime;
use mesa_loader::version::LOADER_VERSION;
use mesa_loader::{Arch, BackendVariant, DriverKind, extract, fetch};
use std::path::PathBuf;

/// mesa-loader - bundled Mesa OpenGL driver tooling
///
/// Builds loader bundles from the prebuilt Mesa release archives and
/// resolves the driver a host would get at startup.
///
/// Examples:
///   mesa-loader fetch --mesa-version 25.2.1
///   mesa-loader extract --mesa-version 25.2.1
///   mesa-loader bundle --mesa-version 25.2.1 --loader-version 1.0.0 --out dist
///   mesa-loader resolve --bundle dist/mesa-loader-1.0.0.zip --json
#[derive(Parser, Debug)]
#[command(author, version = LOADER_VERSION, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Download the Mesa release archives
    Fetch(FetchArgs),

    /// Unpack downloaded archives with 7-Zip
    Extract(ExtractArgs),

    /// Assemble loader bundles from extracted archives
    Bundle(BundleArgs),

    /// Resolve the driver for this machine and print where it was installed
    Resolve(ResolveArgs),

    /// Print the loader version
    Version,
}

#[derive(clap::Args, Debug)]
pub struct WorkArgs {
    /// Mesa release to work with
    #[arg(long, env = "MESA_VERSION", default_value = env!("CARGO_PKG_VERSION"))]
    pub mesa_version: String,

    /// Work directory (defaults to build/download/mesa-<version>)
    #[arg(long, value_name = "PATH")]
    pub dir: Option<PathBuf>,
}

impl WorkArgs {
    fn work_dir(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| fetch::default_work_dir(&self.mesa_version))
    }
}

#[derive(clap::Args, Debug)]
pub struct VariantFilter {
    /// Only these architectures (repeatable; default all)
    #[arg(long = "arch", value_name = "ARCH")]
    pub arches: Vec<Arch>,

    /// Only these drivers (repeatable; default all)
    #[arg(long = "driver", value_name = "DRIVER")]
    pub drivers: Vec<DriverKind>,
}

impl VariantFilter {
    fn variants(&self) -> Vec<BackendVariant> {
        BackendVariant::all()
            .into_iter()
            .filter(|v| self.arches.is_empty() || self.arches.contains(&v.arch))
            .filter(|v| self.drivers.is_empty() || self.drivers.contains(&v.driver))
            .collect()
    }
}

#[derive(clap::Args, Debug)]
pub struct FetchArgs {
    #[command(flatten)]
    pub work: WorkArgs,

    #[command(flatten)]
    pub filter: VariantFilter,

    /// Base URL of the release downloads
    #[arg(long, value_name = "URL", default_value = fetch::DEFAULT_URL_BASE)]
    pub url_base: String,
}

#[derive(clap::Args, Debug)]
pub struct ExtractArgs {
    #[command(flatten)]
    pub work: WorkArgs,

    #[command(flatten)]
    pub filter: VariantFilter,

    /// 7-Zip executable (searched on PATH when omitted)
    #[arg(long, value_name = "PATH")]
    pub seven_zip: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct BundleArgs {
    #[command(flatten)]
    pub work: WorkArgs,

    /// Version recorded in the bundle descriptor
    #[arg(long, default_value = LOADER_VERSION)]
    pub loader_version: String,

    /// Output directory
    #[arg(long, value_name = "PATH")]
    pub out: PathBuf,

    /// Check every DLL is a PE image for its architecture
    #[arg(long)]
    pub verify: bool,
}

#[derive(clap::Args, Debug)]
pub struct ResolveArgs {
    /// Driver to load, without falling back to others
    #[arg(long)]
    pub driver: Option<DriverKind>,

    /// Bundle directory or zip (also via MESA_LOADER_BUNDLE)
    #[arg(long, value_name = "PATH")]
    pub bundle: Option<PathBuf>,

    /// Extraction cache directory (also via MESA_LOADER_CACHE_DIR)
    #[arg(long, value_name = "PATH")]
    pub cache_dir: Option<PathBuf>,

    /// Architecture to resolve for instead of the host's
    #[arg(long)]
    pub arch: Option<String>,

    /// Do not load the library into this process
    #[arg(long)]
    pub no_preload: bool,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

impl ResolveArgs {
    fn apply(&self, mut config: LoaderConfig) -> LoaderConfig {
        if let Some(bundle) = &self.bundle {
            config.bundle = Some(bundle.clone());
        }
        if let Some(cache_dir) = &self.cache_dir {
            config.cache_dir = Some(cache_dir.clone());
        }
        if let Some(arch) = &self.arch {
            config.arch = Some(arch.clone());
        }
        if self.no_preload {
            config.preload = false;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let runtime = RealRuntime;

    match cli.command {
        Commands::Fetch(args) => {
            let http_client = HttpClient::new(reqwest::Client::new());
            let summary = fetch::fetch_archives(
                &runtime,
                &http_client,
                &args.url_base,
                &args.work.work_dir(),
                &args.work.mesa_version,
                &args.filter.variants(),
            )
            .await?;
            println!(
                "Downloaded {}, already present {}",
                summary.downloaded.len(),
                summary.skipped.len()
            );
        }
        Commands::Extract(args) => {
            let seven_zip = match args.seven_zip {
                Some(path) => path,
                None => extract::locate_seven_zip(&runtime)?,
            };
            let extracted = extract::extract_archives(
                &runtime,
                &seven_zip,
                &args.work.work_dir(),
                &args.work.mesa_version,
                &args.filter.variants(),
            )?;
            for dir in extracted {
                println!("{}", dir.display());
            }
        }
        Commands::Bundle(args) => {
            let work_dir = args.work.work_dir();
            let summary = bundle::assemble(
                &runtime,
                &BundleRequest {
                    work_dir: &work_dir,
                    mesa_version: &args.work.mesa_version,
                    loader_version: &args.loader_version,
                    out_dir: &args.out,
                    verify: args.verify,
                },
            )?;
            println!("{}", summary.universal.display());
            for path in summary.per_arch {
                println!("{}", path.display());
            }
        }
        Commands::Resolve(args) => resolve(runtime, &args)?,
        Commands::Version => println!("{}", LOADER_VERSION),
    }
    Ok(())
}

fn resolve(runtime: RealRuntime, args: &ResolveArgs) -> Result<()> {
    let config = args.apply(LoaderConfig::from_runtime(&runtime));
    let loader = ProcessLoader::from_config(runtime, &config);

    let library = match loader.initialize(args.driver) {
        Ok(library) => library,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.code());
        }
    };
    info!("Resolved {}", library.variant);

    if args.json {
        let json = serde_json::to_string_pretty(&library).context("Failed to encode result")?;
        println!("{}", json);
    } else {
        println!("variant: {}", library.variant);
        println!("library: {}", library.library_path.display());
        if let Some(version) = &library.loader_version {
            println!("bundle version: {}", version);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_fetch_parsing() {
        let cli = Cli::try_parse_from([
            "mesa-loader",
            "fetch",
            "--mesa-version",
            "25.1.0",
            "--arch",
            "x64",
            "--driver",
            "zink",
            "--driver",
            "d3d12",
        ])
        .unwrap();
        match cli.command {
            Commands::Fetch(args) => {
                assert_eq!(args.work.mesa_version, "25.1.0");
                assert_eq!(args.url_base, fetch::DEFAULT_URL_BASE);
                assert_eq!(
                    args.work.work_dir(),
                    PathBuf::from("build/download/mesa-25.1.0")
                );
                assert_eq!(
                    args.filter.variants(),
                    vec![
                        BackendVariant::new(Arch::X64, DriverKind::D3d12),
                        BackendVariant::new(Arch::X64, DriverKind::Zink),
                    ]
                );
            }
            _ => panic!("Expected Fetch command"),
        }
    }

    #[test]
    fn test_cli_extract_defaults_to_all_variants() {
        let cli = Cli::try_parse_from(["mesa-loader", "extract", "--dir", "/work"]).unwrap();
        match cli.command {
            Commands::Extract(args) => {
                assert_eq!(args.work.work_dir(), PathBuf::from("/work"));
                assert_eq!(args.filter.variants().len(), 9);
                assert_eq!(args.seven_zip, None);
            }
            _ => panic!("Expected Extract command"),
        }
    }

    #[test]
    fn test_cli_bundle_requires_out() {
        assert!(Cli::try_parse_from(["mesa-loader", "bundle"]).is_err());

        let cli = Cli::try_parse_from(["mesa-loader", "bundle", "--out", "dist", "--verify"])
            .unwrap();
        match cli.command {
            Commands::Bundle(args) => {
                assert_eq!(args.out, PathBuf::from("dist"));
                assert_eq!(args.loader_version, LOADER_VERSION);
                assert!(args.verify);
            }
            _ => panic!("Expected Bundle command"),
        }
    }

    #[test]
    fn test_cli_resolve_overrides_config() {
        let cli = Cli::try_parse_from([
            "mesa-loader",
            "resolve",
            "--driver",
            "software",
            "--bundle",
            "/opt/bundle.zip",
            "--arch",
            "arm64",
            "--no-preload",
        ])
        .unwrap();
        let Commands::Resolve(args) = cli.command else {
            panic!("Expected Resolve command");
        };
        assert_eq!(args.driver, Some(DriverKind::Llvmpipe));

        let config = args.apply(LoaderConfig {
            preload: true,
            ..LoaderConfig::default()
        });
        assert_eq!(config.bundle, Some(PathBuf::from("/opt/bundle.zip")));
        assert_eq!(config.arch.as_deref(), Some("arm64"));
        assert_eq!(config.cache_dir, None);
        assert!(!config.preload);
    }

    #[test]
    fn test_cli_rejects_unknown_driver() {
        assert!(Cli::try_parse_from(["mesa-loader", "resolve", "--driver", "glide"]).is_err());
    }

    #[test]
    fn test_cli_no_subcommand_fails() {
        assert!(Cli::try_parse_from(["mesa-loader"]).is_err());
    }
}
