//! Readiness polling of the managed service API.
//!
//! The child is considered ready once its status endpoint answers with any
//! 2xx. Until then connection errors and other statuses simply mean "not
//! yet"; only the deadline turns them into a failure.

use std::sync::Arc;
use std::time::{Duration, Instant};

use svcinit_shared::errors::{InitError, InitResult};
use tokio_util::sync::CancellationToken;

use crate::http::{HttpRequest, HttpTransport};
use crate::util::clock::{Clock, sleep_or_cancel};

pub struct ReadinessPoller {
    transport: Arc<dyn HttpTransport>,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
}

impl ReadinessPoller {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        clock: Arc<dyn Clock>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transport,
            clock,
            cancel,
        }
    }

    /// Probe `probe_url` every `interval` until it answers 2xx or `timeout` elapses.
    ///
    /// The first probe is sent immediately. The last sleep is shortened so the
    /// poller never waits past the deadline.
    pub async fn wait_ready(
        &self,
        probe_url: &str,
        interval: Duration,
        timeout: Duration,
    ) -> InitResult<()> {
        let started = self.clock.now();
        let request = HttpRequest::get(probe_url);
        let mut probes: u32 = 0;

        loop {
            if self.cancel.is_cancelled() {
                return Err(InitError::Cancelled);
            }

            probes += 1;
            let budget = timeout.saturating_sub(self.clock.now().duration_since(started));
            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(InitError::Cancelled),
                outcome = self.transport.execute(&request) => outcome,
                // An unanswered probe must not hold the poller past the deadline
                _ = self.clock.sleep(budget) => {
                    return Err(self.timed_out(probe_url, probes, started));
                }
            };

            match outcome {
                Ok(response) if response.is_success() => {
                    tracing::info!(
                        url = %probe_url,
                        probes,
                        elapsed_ms = self.clock.now().duration_since(started).as_millis() as u64,
                        "Managed service is ready"
                    );
                    return Ok(());
                }
                Ok(response) => {
                    tracing::debug!(url = %probe_url, status = response.status, "Service not ready yet");
                }
                Err(InitError::Cancelled) => return Err(InitError::Cancelled),
                Err(e) => {
                    tracing::debug!(url = %probe_url, "Service not reachable yet: {}", e);
                }
            }

            let elapsed = self.clock.now().duration_since(started);
            if elapsed >= timeout {
                return Err(self.timed_out(probe_url, probes, started));
            }

            let remaining = timeout - elapsed;
            sleep_or_cancel(self.clock.as_ref(), &self.cancel, interval.min(remaining)).await?;
        }
    }

    fn timed_out(&self, probe_url: &str, probes: u32, started: Instant) -> InitError {
        tracing::error!(url = %probe_url, probes, "Managed service did not become ready");
        InitError::ReadinessTimeout {
            url: probe_url.to_string(),
            waited: self.clock.now().duration_since(started),
        }
    }
}
