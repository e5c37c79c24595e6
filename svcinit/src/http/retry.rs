//! Fixed-backoff retry around an [`HttpTransport`].

use std::sync::Arc;
use std::time::Duration;

use svcinit_shared::constants::timing;
use svcinit_shared::errors::{InitError, InitResult};
use tokio_util::sync::CancellationToken;

use super::transport::{HttpRequest, HttpResponse, HttpTransport};
use crate::util::clock::{Clock, sleep_or_cancel};

/// How many times a request is attempted and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: timing::RETRY_COUNT,
            backoff: Duration::from_millis(timing::RETRY_BACKOFF_MS),
        }
    }
}

/// Retries requests that fail before any HTTP status is received.
///
/// Statuses are returned untouched; interpreting a 409 or a 500 is the
/// caller's job.
#[derive(Clone)]
pub struct RetryClient {
    transport: Arc<dyn HttpTransport>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl RetryClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        clock: Arc<dyn Clock>,
        policy: RetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transport,
            clock,
            policy,
            cancel,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Send `request`, retrying transport failures.
    ///
    /// # Returns
    /// * `Ok(HttpResponse)` - Any HTTP status
    /// * `Err(InitError::RetriesExhausted)` - All attempts failed at the transport level
    /// * `Err(InitError::Cancelled)` - Shutdown requested while waiting
    pub async fn send(&self, request: &HttpRequest) -> InitResult<HttpResponse> {
        let attempts = self.policy.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            if self.cancel.is_cancelled() {
                return Err(InitError::Cancelled);
            }

            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(InitError::Cancelled),
                outcome = self.transport.execute(request) => outcome,
            };

            match outcome {
                Ok(response) => {
                    tracing::debug!(
                        method = %request.method,
                        url = %request.url,
                        status = response.status,
                        attempt,
                        "HTTP response"
                    );
                    return Ok(response);
                }
                Err(e @ InitError::Cancelled) => return Err(e),
                Err(e) => {
                    last_error = match e {
                        InitError::TransientNetwork(msg) => msg,
                        other => other.to_string(),
                    };
                    if attempt < attempts {
                        tracing::warn!(
                            method = %request.method,
                            url = %request.url,
                            attempt,
                            max_attempts = attempts,
                            backoff_ms = self.policy.backoff.as_millis() as u64,
                            "Request failed, retrying: {}", last_error
                        );
                        sleep_or_cancel(self.clock.as_ref(), &self.cancel, self.policy.backoff)
                            .await?;
                    }
                }
            }
        }

        tracing::error!(
            method = %request.method,
            url = %request.url,
            attempts,
            "Request failed on every attempt: {}", last_error
        );

        Err(InitError::RetriesExhausted {
            method: request.method.to_string(),
            url: request.url.clone(),
            attempts,
            last_error,
        })
    }
}
