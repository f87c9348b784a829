//! Downloading the prebuilt Mesa archives a bundle is assembled from.

use anyhow::{Context, Result};
use log::{debug, info};
use std::path::{Path, PathBuf};

use crate::http::HttpClient;
use crate::runtime::Runtime;
use crate::variant::BackendVariant;

/// Release page the per-variant `.7z` archives are published under.
pub const DEFAULT_URL_BASE: &str = "https://github.com/mmozeiko/build-mesa/releases/download";

pub const ARCHIVE_EXTENSION: &str = "7z";

/// Default working directory for a Mesa version, relative to the current directory.
pub fn default_work_dir(mesa_version: &str) -> PathBuf {
    Path::new("build")
        .join("download")
        .join(format!("mesa-{}", mesa_version))
}

pub fn archive_file_name(variant: &BackendVariant, mesa_version: &str) -> String {
    format!("{}.{}", variant.archive_stem(mesa_version), ARCHIVE_EXTENSION)
}

pub fn archive_url(url_base: &str, variant: &BackendVariant, mesa_version: &str) -> String {
    format!(
        "{}/{}/{}",
        url_base.trim_end_matches('/'),
        mesa_version,
        archive_file_name(variant, mesa_version)
    )
}

#[derive(Debug, Default, PartialEq)]
pub struct FetchSummary {
    pub downloaded: Vec<PathBuf>,
    /// Archives already present in the work directory.
    pub skipped: Vec<PathBuf>,
}

/// Downloads the archive of every variant into `dir`.
///
/// Existing archives are never overwritten. Each download lands in a `.part`
/// file first and is renamed once complete, so an interrupted run leaves no
/// archive that looks finished.
#[tracing::instrument(skip(runtime, http_client, variants))]
pub async fn fetch_archives<R: Runtime>(
    runtime: &R,
    http_client: &HttpClient,
    url_base: &str,
    dir: &Path,
    mesa_version: &str,
    variants: &[BackendVariant],
) -> Result<FetchSummary> {
    runtime
        .create_dir_all(dir)
        .with_context(|| format!("Failed to create download directory {:?}", dir))?;

    let mut summary = FetchSummary::default();
    for variant in variants {
        let target = dir.join(archive_file_name(variant, mesa_version));
        if runtime.exists(&target) {
            debug!("{:?} already downloaded, skipping", target);
            summary.skipped.push(target);
            continue;
        }

        let url = archive_url(url_base, variant, mesa_version);
        let part = target.with_extension(format!("{}.part", ARCHIVE_EXTENSION));

        info!("Downloading {} from {}...", variant, url);
        let downloaded = http_client
            .download_file(&url, || {
                runtime
                    .create_file(&part)
                    .with_context(|| format!("Failed to create {:?}", part))
            })
            .await;
        if let Err(e) = downloaded {
            if runtime.exists(&part)
                && let Err(cleanup) = runtime.remove_file(&part)
            {
                debug!("Failed to remove {:?}: {}", part, cleanup);
            }
            return Err(e.context(format!("Failed to download {}", url)));
        }

        runtime
            .rename(&part, &target)
            .with_context(|| format!("Failed to move {:?} into place", part))?;
        summary.downloaded.push(target);
    }

    info!(
        "Fetched {} archive(s), {} already present.",
        summary.downloaded.len(),
        summary.skipped.len()
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::MAX_RETRIES;
    use crate::runtime::MockRuntime;
    use crate::variant::{Arch, DriverKind};
    use mockall::predicate::eq;
    use reqwest::Client;
    use std::time::Duration;

    fn http_client() -> HttpClient {
        HttpClient::new(Client::new()).with_retry_delay(Duration::from_millis(1))
    }

    #[test]
    fn test_archive_url() {
        let variant = BackendVariant::new(Arch::Arm64, DriverKind::D3d12);
        assert_eq!(
            archive_url(DEFAULT_URL_BASE, &variant, "25.2.1"),
            "https://github.com/mmozeiko/build-mesa/releases/download/25.2.1/mesa-d3d12-arm64-25.2.1.7z"
        );
        assert_eq!(
            archive_url("http://mirror/", &variant, "25.2.1"),
            "http://mirror/25.2.1/mesa-d3d12-arm64-25.2.1.7z"
        );
    }

    #[test]
    fn test_default_work_dir() {
        assert_eq!(
            default_work_dir("25.2.1"),
            Path::new("build").join("download").join("mesa-25.2.1")
        );
    }

    #[tokio::test]
    async fn test_fetch_downloads_missing_and_skips_present() {
        // --- Setup Mock Server ---
        let mut server = mockito::Server::new_async().await;
        let url = server.url();

        let mock = server
            .mock("GET", "/25.2.1/mesa-zink-x64-25.2.1.7z")
            .with_status(200)
            .with_body("archive")
            .expect(1)
            .create_async()
            .await;

        // --- Setup Runtime ---
        let dir = PathBuf::from("/work");
        let present = dir.join("mesa-llvmpipe-x64-25.2.1.7z");
        let part = dir.join("mesa-zink-x64-25.2.1.7z.part");
        let target = dir.join("mesa-zink-x64-25.2.1.7z");

        let mut runtime = MockRuntime::new();
        runtime
            .expect_create_dir_all()
            .with(eq(dir.clone()))
            .returning(|_| Ok(()));
        let present_clone = present.clone();
        runtime
            .expect_exists()
            .returning(move |p| p == present_clone);
        runtime
            .expect_create_file()
            .with(eq(part.clone()))
            .times(1)
            .returning(|_| Ok(Box::new(std::io::sink())));
        runtime
            .expect_rename()
            .with(eq(part), eq(target.clone()))
            .times(1)
            .returning(|_, _| Ok(()));

        // --- Execute ---
        let variants = [
            BackendVariant::new(Arch::X64, DriverKind::Llvmpipe),
            BackendVariant::new(Arch::X64, DriverKind::Zink),
        ];
        let summary = fetch_archives(&runtime, &http_client(), &url, &dir, "25.2.1", &variants)
            .await
            .unwrap();

        // --- Verify ---
        mock.assert_async().await;
        assert_eq!(summary.downloaded, vec![target]);
        assert_eq!(summary.skipped, vec![present]);
    }

    #[tokio::test]
    async fn test_fetch_missing_release_leaves_no_archive() {
        let mut server = mockito::Server::new_async().await;
        let url = server.url();

        let _mock = server
            .mock("GET", "/0.0.0/mesa-llvmpipe-x86-0.0.0.7z")
            .with_status(404)
            .create_async()
            .await;

        // No rename expectation: a failed download must not be moved into place
        let mut runtime = MockRuntime::new();
        runtime.expect_create_dir_all().returning(|_| Ok(()));
        runtime.expect_exists().returning(|_| false);

        let variants = [BackendVariant::new(Arch::X86, DriverKind::Llvmpipe)];
        let err = fetch_archives(
            &runtime,
            &http_client(),
            &url,
            Path::new("/work"),
            "0.0.0",
            &variants,
        )
        .await
        .unwrap_err();

        assert!(format!("{:#}", err).contains("Not found"));
    }

    struct FullDisk;

    impl std::io::Write for FullDisk {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("No space left on device"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_fetch_removes_partial_download() {
        let mut server = mockito::Server::new_async().await;
        let url = server.url();

        let _mock = server
            .mock("GET", "/25.2.1/mesa-zink-arm64-25.2.1.7z")
            .with_status(200)
            .with_body("archive")
            .create_async()
            .await;

        let part = PathBuf::from("/work/mesa-zink-arm64-25.2.1.7z.part");
        let mut runtime = MockRuntime::new();
        runtime.expect_create_dir_all().returning(|_| Ok(()));
        let part_clone = part.clone();
        runtime
            .expect_exists()
            .returning(move |p| p == part_clone);
        runtime
            .expect_create_file()
            .times(MAX_RETRIES)
            .returning(|_| Ok(Box::new(FullDisk)));
        runtime
            .expect_remove_file()
            .with(eq(part))
            .times(1)
            .returning(|_| Ok(()));

        let variants = [BackendVariant::new(Arch::Arm64, DriverKind::Zink)];
        let err = fetch_archives(
            &runtime,
            &http_client(),
            &url,
            Path::new("/work"),
            "25.2.1",
            &variants,
        )
        .await
        .unwrap_err();

        assert!(format!("{:#}", err).contains("No space left"));
    }
}
