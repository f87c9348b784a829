//! Unpacking the downloaded `.7z` archives with an external 7-Zip.

use anyhow::{Context, Result, bail};
use log::{debug, info};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::fetch::archive_file_name;
use crate::runtime::Runtime;
use crate::variant::BackendVariant;

#[cfg(windows)]
const SEARCH_NAMES: &[&str] = &["7z.exe"];
#[cfg(not(windows))]
const SEARCH_NAMES: &[&str] = &["7zz", "7z"];

/// Find a 7-Zip executable: the first match on `PATH`, then on Windows the
/// usual install locations under `ProgramFiles`.
pub fn locate_seven_zip<R: Runtime>(runtime: &R) -> Result<PathBuf> {
    let path = runtime.env_var("PATH").unwrap_or_default();
    let dirs: Vec<PathBuf> = std::env::split_paths(&path).collect();

    for name in SEARCH_NAMES {
        if let Some(found) = dirs
            .iter()
            .map(|dir| dir.join(name))
            .find(|candidate| runtime.is_executable(candidate))
        {
            debug!("Using 7-Zip at {:?}", found);
            return Ok(found);
        }
    }

    if cfg!(windows) {
        let program_files = runtime
            .env_var("ProgramFiles")
            .unwrap_or_else(|_| r"C:\Program Files".to_string());
        for install in ["7-Zip", "7-Zip-Zstandard"] {
            let candidate = Path::new(&program_files).join(install).join("7z.exe");
            if runtime.is_executable(&candidate) {
                debug!("Using 7-Zip at {:?}", candidate);
                return Ok(candidate);
            }
        }
    }

    bail!("7z not found in PATH")
}

/// Extract `<dir>/<stem>.7z` into `<dir>/<stem>/` for every variant,
/// replacing whatever a previous run left there.
#[tracing::instrument(skip(runtime, variants))]
pub fn extract_archives<R: Runtime>(
    runtime: &R,
    seven_zip: &Path,
    dir: &Path,
    mesa_version: &str,
    variants: &[BackendVariant],
) -> Result<Vec<PathBuf>> {
    let mut extracted = Vec::with_capacity(variants.len());

    for variant in variants {
        let archive = dir.join(archive_file_name(variant, mesa_version));
        if !runtime.exists(&archive) {
            bail!("Archive {:?} not found; run fetch first", archive);
        }

        let output = dir.join(variant.archive_stem(mesa_version));
        if runtime.exists(&output) {
            runtime
                .remove_dir_all(&output)
                .with_context(|| format!("Failed to clear {:?}", output))?;
        }

        info!("Extracting {:?}...", archive);
        runtime
            .run_command(seven_zip, &seven_zip_args(&archive, &output))
            .with_context(|| format!("Failed to extract {:?}", archive))?;
        extracted.push(output);
    }

    Ok(extracted)
}

fn seven_zip_args(archive: &Path, output: &Path) -> Vec<OsString> {
    let mut out_flag = OsString::from("-o");
    out_flag.push(output);
    vec![
        "x".into(),
        archive.as_os_str().to_owned(),
        out_flag,
        "-y".into(),
    ]
}
