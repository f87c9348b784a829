//! Retry logic for network operations with error classification.

use reqwest::StatusCode;

/// Maximum number of attempts for network operations.
pub const MAX_RETRIES: usize = 3;

/// Delay between retry attempts in milliseconds.
pub const RETRY_DELAY_MS: u64 = 1000;

/// Errors that should not be retried.
#[derive(thiserror::Error, Debug)]
pub enum NonRetryableError {
    /// Rate limit exceeded (HTTP 429)
    #[error("Rate limit exceeded: {0}. Try again later.")]
    RateLimitExceeded(String),
    /// Authentication failed (HTTP 401)
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),
    /// Resource not found (HTTP 404), usually a Mesa version without a release
    #[error("Not found: {0}")]
    NotFound(String),
    /// Forbidden access (HTTP 403)
    #[error("Access forbidden: {0}")]
    Forbidden(String),
    /// Other client errors that won't succeed on retry
    #[error("Request error: {0}")]
    ClientError(String),
}

/// Classifies an error as retryable or non-retryable.
/// Returns Ok(()) if the error is retryable, Err with a user-friendly message if not.
pub fn classify_error(error: &reqwest::Error) -> Result<(), NonRetryableError> {
    let url = error
        .url()
        .map(|u| u.to_string())
        .unwrap_or_else(|| "request".to_string());

    if let Some(status) = error.status() {
        match status {
            StatusCode::UNAUTHORIZED => {
                return Err(NonRetryableError::AuthenticationFailed(url));
            }
            StatusCode::FORBIDDEN => {
                let msg = error.to_string();
                if msg.contains("rate limit") {
                    return Err(NonRetryableError::RateLimitExceeded(url));
                }
                return Err(NonRetryableError::Forbidden(url));
            }
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(NonRetryableError::RateLimitExceeded(url));
            }
            StatusCode::NOT_FOUND => {
                return Err(NonRetryableError::NotFound(url));
            }
            // Other 4xx client errors are generally not retryable
            s if s.is_client_error() => {
                return Err(NonRetryableError::ClientError(format!(
                    "HTTP {} for {}",
                    s.as_u16(),
                    url
                )));
            }
            // 5xx server errors are retryable
            _ => {}
        }
    }

    // Connection errors, timeouts, etc. are retryable
    Ok(())
}

/// Checks if an error from `error_for_status()` should be retried.
/// Returns the original error if retryable, or a NonRetryableError if not.
pub fn check_retryable(error: reqwest::Error) -> anyhow::Error {
    match classify_error(&error) {
        Ok(()) => anyhow::Error::from(error),
        Err(non_retryable) => anyhow::Error::from(non_retryable),
    }
}
