//! Assembling distributable bundles from extracted Mesa archives.
//!
//! Input is the work directory laid out by `extract`:
//!
//! ```text
//! <dir>/mesa-<driver>-<arch>-<mesaVersion>/opengl32.dll
//! <dir>/mesa-d3d12-<arch>-<mesaVersion>/dxil.dll
//! ```
//!
//! Output is one universal zip holding every architecture plus one zip per
//! architecture, each using the runtime bundle layout.

use anyhow::{Context, Result, bail};
use log::{debug, info};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use zip::CompressionMethod;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::runtime::Runtime;
use crate::variant::{Arch, BackendVariant};
use crate::version::{VERSION_FILE, VersionDescriptor};

pub const BUNDLE_PREFIX: &str = "mesa-loader";

#[derive(Debug, Clone)]
pub struct BundleRequest<'a> {
    /// Directory holding the extracted archives.
    pub work_dir: &'a Path,
    pub mesa_version: &'a str,
    pub loader_version: &'a str,
    pub out_dir: &'a Path,
    /// Check that every DLL is a PE image for its architecture.
    pub verify: bool,
}

#[derive(Debug, PartialEq)]
pub struct BundleSummary {
    pub descriptor: PathBuf,
    pub universal: PathBuf,
    pub per_arch: Vec<PathBuf>,
}

pub fn bundle_file_name(loader_version: &str, arch: Option<Arch>) -> String {
    match arch {
        Some(arch) => format!("{}-{}-{}.zip", BUNDLE_PREFIX, loader_version, arch),
        None => format!("{}-{}.zip", BUNDLE_PREFIX, loader_version),
    }
}

/// One file destined for a bundle.
struct BundleEntry {
    name: String,
    contents: Vec<u8>,
}

#[tracing::instrument(skip(runtime))]
pub fn assemble<R: Runtime>(runtime: &R, request: &BundleRequest<'_>) -> Result<BundleSummary> {
    let descriptor = VersionDescriptor::new(request.loader_version);
    descriptor.save(runtime, request.out_dir)?;
    let descriptor_entry = BundleEntry {
        name: VERSION_FILE.to_string(),
        contents: descriptor.render().into_bytes(),
    };

    let mut entries = Vec::new();
    for variant in BackendVariant::all() {
        entries.extend(collect_variant(runtime, request, &variant)?);
    }

    let universal = request
        .out_dir
        .join(bundle_file_name(request.loader_version, None));
    write_bundle(
        runtime,
        &universal,
        std::iter::once(&descriptor_entry).chain(entries.iter().map(|(_, entry)| entry)),
    )?;

    let mut per_arch = Vec::with_capacity(Arch::ALL.len());
    for arch in Arch::ALL {
        let path = request
            .out_dir
            .join(bundle_file_name(request.loader_version, Some(arch)));
        write_bundle(
            runtime,
            &path,
            std::iter::once(&descriptor_entry).chain(
                entries
                    .iter()
                    .filter(|(variant, _)| variant.arch == arch)
                    .map(|(_, entry)| entry),
            ),
        )?;
        per_arch.push(path);
    }

    Ok(BundleSummary {
        descriptor: request.out_dir.join(VERSION_FILE),
        universal,
        per_arch,
    })
}

fn collect_variant<R: Runtime>(
    runtime: &R,
    request: &BundleRequest<'_>,
    variant: &BackendVariant,
) -> Result<Vec<(BackendVariant, BundleEntry)>> {
    let source_dir = request
        .work_dir
        .join(variant.archive_stem(request.mesa_version));

    variant
        .driver
        .library_files()
        .iter()
        .zip(variant.resource_paths())
        .map(|(file, name)| {
            let path = source_dir.join(file);
            let contents = runtime
                .read(&path)
                .with_context(|| format!("Failed to read {:?}; run extract first", path))?;
            if request.verify {
                verify_machine(&contents, variant.arch)
                    .with_context(|| format!("{:?} does not match {}", path, variant.arch))?;
            }
            debug!("Adding {} ({} bytes)", name, contents.len());
            Ok::<_, anyhow::Error>((*variant, BundleEntry { name, contents }))
        })
        .collect()
}

fn write_bundle<'e, R: Runtime>(
    runtime: &R,
    path: &Path,
    entries: impl Iterator<Item = &'e BundleEntry>,
) -> Result<()> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    for entry in entries {
        zip.start_file(entry.name.as_str(), options)
            .with_context(|| format!("Failed to add {} to {:?}", entry.name, path))?;
        zip.write_all(&entry.contents)?;
    }

    let bytes = zip.finish()?.into_inner();
    runtime
        .write_atomic(path, &bytes)
        .with_context(|| format!("Failed to write bundle {:?}", path))?;
    info!("Wrote {:?} ({} bytes)", path, bytes.len());
    Ok(())
}

/// COFF machine type of PE images built for `arch`.
pub fn pe_machine(arch: Arch) -> u16 {
    use goblin::pe::header::{COFF_MACHINE_ARM64, COFF_MACHINE_X86, COFF_MACHINE_X86_64};

    match arch {
        Arch::X86 => COFF_MACHINE_X86,
        Arch::X64 => COFF_MACHINE_X86_64,
        Arch::Arm64 => COFF_MACHINE_ARM64,
    }
}

fn verify_machine(contents: &[u8], arch: Arch) -> Result<()> {
    let pe = goblin::pe::PE::parse(contents).context("Not a PE image")?;
    let machine = pe.header.coff_header.machine;
    if machine != pe_machine(arch) {
        bail!(
            "PE machine {:#06x}, expected {:#06x}",
            machine,
            pe_machine(arch)
        );
    }
    Ok(())
}
