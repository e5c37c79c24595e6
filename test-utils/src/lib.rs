//! Test doubles for svcinit: a scripted HTTP transport, a fake clock and
//! helpers for building options against a temporary data volume.

mod clock;
mod transport;

pub use clock::FakeClock;
pub use transport::{RecordedCall, Scripted, ScriptedTransport};

use std::path::Path;
use std::time::Duration;

use svcinit::BootstrapOptions;

/// Base URL used by scripted tests. Nothing listens there.
pub const TEST_BASE_URL: &str = "http://svc.test:9000/api";

/// Options rooted in `volume`, with the production timing defaults.
pub fn test_options(volume: &Path) -> BootstrapOptions {
    let mut options = BootstrapOptions::for_base_url(TEST_BASE_URL);
    options.credential_path = volume.join("data").join("credential");
    options.sentinel_path = Some(volume.join("data").join("init"));
    options
}

/// Options with short timings for tests that run against real time.
pub fn fast_options(volume: &Path) -> BootstrapOptions {
    let mut options = test_options(volume);
    options.poll_interval = Duration::from_millis(10);
    options.poll_timeout = Duration::from_millis(200);
    options.retry_backoff = Duration::from_millis(10);
    options.request_timeout = Duration::from_millis(200);
    options
}
