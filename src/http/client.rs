//! HTTP client with built-in retry logic and error handling.

use anyhow::{Context, Result};
use log::{debug, warn};
use reqwest::Client;
use std::io::Write;
use std::time::Duration;

use super::retry::{MAX_RETRIES, NonRetryableError, RETRY_DELAY_MS, check_retryable};

/// HTTP client with built-in retry logic for network operations.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    retry_delay: Duration,
}

impl HttpClient {
    /// Creates a new HTTP client wrapping the given reqwest Client.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            retry_delay: Duration::from_millis(RETRY_DELAY_MS),
        }
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Downloads a URL into the writer returned by `create_writer`.
    /// Automatically retries on transient errors; every attempt gets a fresh writer.
    #[tracing::instrument(skip(self, create_writer))]
    pub async fn download_file<W, F>(&self, url: &str, create_writer: F) -> Result<u64>
    where
        W: Write,
        F: Fn() -> Result<W>,
    {
        debug!("Downloading file from {}...", url);
        self.with_retry("Download", || self.download_file_once(url, &create_writer))
            .await
    }

    /// Single download attempt without retry.
    async fn download_file_once<W, F>(&self, url: &str, create_writer: &F) -> Result<u64>
    where
        W: Write,
        F: Fn() -> Result<W>,
    {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to start download request")?;

        let mut response = response.error_for_status().map_err(check_retryable)?;

        let mut writer = create_writer()?;
        let mut downloaded_bytes: u64 = 0;

        while let Some(chunk) = response
            .chunk()
            .await
            .context("Failed to read chunk from download stream")?
        {
            writer
                .write_all(&chunk)
                .context("Failed to write chunk to file")?;
            downloaded_bytes += chunk.len() as u64;
        }
        writer.flush().context("Failed to flush downloaded file")?;

        debug!(
            "Downloaded {:.2} MB",
            downloaded_bytes as f64 / (1024.0 * 1024.0)
        );

        Ok(downloaded_bytes)
    }

    /// Executes an async operation with retry logic.
    async fn with_retry<F, Fut, T>(&self, operation_name: &str, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut last_error = None;

        for attempt in 1..=MAX_RETRIES {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if !is_retryable_error(&e) {
                        debug!("{}: non-retryable error: {}", operation_name, e);
                        return Err(e);
                    }

                    if attempt < MAX_RETRIES {
                        warn!(
                            "{}: attempt {}/{} failed ({}), retrying in {:?}...",
                            operation_name, attempt, MAX_RETRIES, e, self.retry_delay
                        );
                        tokio::time::sleep(self.retry_delay).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            anyhow::anyhow!("{}: failed after {} attempts", operation_name, MAX_RETRIES)
        }))
    }
}

/// Checks if an anyhow::Error is retryable based on its content.
fn is_retryable_error(e: &anyhow::Error) -> bool {
    // Non-retryable errors should not be retried
    if e.downcast_ref::<NonRetryableError>().is_some() {
        return false;
    }

    // Retry everything else that isn't explicitly non-retryable
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_client() -> HttpClient {
        HttpClient::new(Client::new()).with_retry_delay(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_download_file_success() {
        let mut server = mockito::Server::new_async().await;
        let url = server.url();

        let mock = server
            .mock("GET", "/file.txt")
            .with_status(200)
            .with_body("test content")
            .create_async()
            .await;

        let client = fast_client();
        let bytes = client
            .download_file(&format!("{}/file.txt", url), || Ok(std::io::sink()))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(bytes, 12); // "test content" is 12 bytes
    }

    #[tokio::test]
    async fn test_download_file_not_found() {
        let mut server = mockito::Server::new_async().await;
        let url = server.url();

        let mock = server
            .mock("GET", "/file.txt")
            .with_status(404)
            .create_async()
            .await;

        let client = fast_client();
        let result = client
            .download_file(&format!("{}/file.txt", url), || Ok(std::io::sink()))
            .await;

        mock.assert_async().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_download_file_retries_server_errors() {
        let mut server = mockito::Server::new_async().await;
        let url = server.url();

        let mock = server
            .mock("GET", "/file.7z")
            .with_status(503)
            .expect(MAX_RETRIES)
            .create_async()
            .await;

        let client = fast_client();
        let result = client
            .download_file(&format!("{}/file.7z", url), || Ok(std::io::sink()))
            .await;

        mock.assert_async().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_download_file_writer_error() {
        let mut server = mockito::Server::new_async().await;
        let url = server.url();

        let _mock = server
            .mock("GET", "/file.7z")
            .with_status(200)
            .with_body("payload")
            .create_async()
            .await;

        let client = fast_client();
        let result = client
            .download_file(&format!("{}/file.7z", url), || {
                Err::<std::io::Sink, _>(anyhow::anyhow!("disk full"))
            })
            .await;

        assert!(result.unwrap_err().to_string().contains("disk full"));
    }

    #[test]
    fn test_is_retryable_error() {
        // Non-retryable error
        let err = anyhow::Error::from(NonRetryableError::NotFound("test".to_string()));
        assert!(!is_retryable_error(&err));

        // Network-like error (retryable)
        let err = anyhow::anyhow!("connection reset by peer");
        assert!(is_retryable_error(&err));

        // Generic error (now retryable)
        let err = anyhow::anyhow!("some other error");
        assert!(is_retryable_error(&err));
    }

    #[tokio::test]
    async fn test_with_retry_success() {
        let client = fast_client();
        let result = client
            .with_retry("test", || async { Ok::<_, anyhow::Error>("success") })
            .await;
        assert_eq!(result.unwrap(), "success");
    }

    #[tokio::test]
    async fn test_with_retry_immediate_failure_on_non_retryable() {
        let client = fast_client();
        let call_count = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let call_count_clone = call_count.clone();

        let result = client
            .with_retry("test", || {
                let count = call_count_clone.clone();
                async move {
                    count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    Err::<(), _>(anyhow::Error::from(NonRetryableError::NotFound(
                        "not found".to_string(),
                    )))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(call_count.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_retry_retries_on_network_error() {
        let client = fast_client();
        let call_count = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let call_count_clone = call_count.clone();

        let result = client
            .with_retry("test", || {
                let count = call_count_clone.clone();
                async move {
                    let current = count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    if current < 2 {
                        Err::<&str, _>(anyhow::anyhow!("connection reset"))
                    } else {
                        Ok("success after retries")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "success after retries");
        assert_eq!(call_count.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_exhausts_retries() {
        let client = fast_client();
        let call_count = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let call_count_clone = call_count.clone();

        let result = client
            .with_retry("test", || {
                let count = call_count_clone.clone();
                async move {
                    count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    Err::<(), _>(anyhow::anyhow!("connection timeout"))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(
            call_count.load(std::sync::atomic::Ordering::SeqCst),
            MAX_RETRIES
        );
    }
}
