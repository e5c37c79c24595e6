//! Time source used by polling and retry loops.
//!
//! Waiting goes through [`Clock`] so tests can simulate minutes of
//! backoff without real delays.

use async_trait::async_trait;
use std::time::{Duration, Instant};
use svcinit_shared::errors::{InitError, InitResult};
use tokio_util::sync::CancellationToken;

/// Monotonic clock with an async sleep.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> Instant;

    /// Suspend the caller for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by tokio's timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Sleep on `clock`, returning early with [`InitError::Cancelled`] if `cancel` fires.
pub async fn sleep_or_cancel(
    clock: &dyn Clock,
    cancel: &CancellationToken,
    duration: Duration,
) -> InitResult<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(InitError::Cancelled),
        _ = clock.sleep(duration) => Ok(()),
    }
}
