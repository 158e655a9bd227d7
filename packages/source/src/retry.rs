//! Bounded retry with a fixed backoff.
//!
//! Every HTTP fetch goes through [`send_text`], which retries transient
//! failures (timeouts, connection resets, HTTP 429, HTTP 5xx) up to
//! [`RetryPolicy::attempts`] times, sleeping [`RetryPolicy::delay_secs`]
//! between attempts. HTTP 4xx other than 429 is permanent and returned
//! immediately.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::SourceError;

/// Attempts made when no policy is configured.
pub const DEFAULT_ATTEMPTS: u32 = 3;

/// Seconds between attempts when no policy is configured.
pub const DEFAULT_DELAY_SECS: u64 = 5;

/// How many times to try, and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub attempts: u32,
    /// Fixed delay between attempts, in seconds.
    pub delay_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            delay_secs: DEFAULT_DELAY_SECS,
        }
    }
}

impl RetryPolicy {
    /// Total attempts, at least one.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        if self.attempts == 0 { 1 } else { self.attempts }
    }

    /// The delay between attempts.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

/// Runs `op` until it succeeds, fails permanently, or runs out of attempts.
///
/// # Errors
///
/// Returns the permanent error as-is, or [`SourceError::RetriesExhausted`]
/// wrapping the last transient error.
pub async fn retry_fixed<T, F, Fut>(
    policy: RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, SourceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SourceError>>,
{
    let attempts = policy.attempts();
    let delay = policy.delay();
    let mut last_error = None;

    for attempt in 1..=attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) => {
                if attempt < attempts {
                    log::warn!(
                        "[{label}] attempt {attempt}/{attempts} failed: {e}; retrying in {delay:?}..."
                    );
                    tokio::time::sleep(delay).await;
                } else {
                    log::warn!("[{label}] attempt {attempt}/{attempts} failed: {e}");
                }
                last_error = Some(e);
            }
        }
    }

    Err(SourceError::RetriesExhausted {
        attempts,
        last: Box::new(last_error.unwrap_or_else(|| SourceError::Status {
            status: 0,
            url: label.to_string(),
        })),
    })
}

/// Sends an HTTP request and returns the response body as text.
///
/// `build_request` is called once per attempt because request builders are
/// consumed by `send()`.
///
/// # Errors
///
/// Returns [`SourceError`] if the request fails permanently or every
/// attempt fails.
#[allow(clippy::future_not_send)]
pub async fn send_text<F>(build_request: F, policy: RetryPolicy) -> Result<String, SourceError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let build_request = &build_request;
    retry_fixed(policy, "http", move || send_once(build_request)).await
}

#[allow(clippy::future_not_send)]
async fn send_once<F>(build_request: &F) -> Result<String, SourceError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let response = build_request().send().await?;
    let status = response.status();

    if status.is_client_error() || status.is_server_error() {
        return Err(SourceError::Status {
            status: status.as_u16(),
            url: response.url().to_string(),
        });
    }

    let text = response.text().await?;
    log::debug!("Downloaded {} bytes", text.len());
    Ok(text)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    const NO_DELAY: RetryPolicy = RetryPolicy {
        attempts: 3,
        delay_secs: 0,
    };

    fn server_error() -> SourceError {
        SourceError::Status {
            status: 503,
            url: "http://sheet".to_string(),
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = retry_fixed(NO_DELAY, "test", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(server_error())
            } else {
                Ok("rows")
            }
        })
        .await;
        assert_eq!(result.unwrap(), "rows");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_configured_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = retry_fixed(NO_DELAY, "test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(server_error())
        })
        .await;
        assert!(matches!(
            result,
            Err(SourceError::RetriesExhausted { attempts: 3, .. })
        ));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = retry_fixed(NO_DELAY, "test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(SourceError::Status {
                status: 404,
                url: "http://sheet".to_string(),
            })
        })
        .await;
        assert!(matches!(result, Err(SourceError::Status { status: 404, .. })));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.attempts(), 3);
        assert_eq!(policy.delay(), Duration::from_secs(5));
        assert_eq!(
            RetryPolicy {
                attempts: 0,
                delay_secs: 1
            }
            .attempts(),
            1
        );
    }
}
