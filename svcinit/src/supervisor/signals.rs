//! Forwarding of operator signals to the managed service.

use nix::sys::signal::Signal;
use svcinit_shared::errors::{InitError, InitResult};
use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::send_signal;

/// Background task relaying SIGTERM/SIGINT to the child.
///
/// The first signal also cancels the bootstrap so a stuck request or poll
/// does not hold up shutdown. The task stops when dropped.
pub struct SignalForwarder {
    task: JoinHandle<()>,
}

impl SignalForwarder {
    pub fn spawn(pid: u32, cancel: CancellationToken) -> InitResult<Self> {
        let mut sigterm = signal(SignalKind::terminate())
            .map_err(|e| InitError::Internal(format!("install SIGTERM handler: {}", e)))?;
        let mut sigint = signal(SignalKind::interrupt())
            .map_err(|e| InitError::Internal(format!("install SIGINT handler: {}", e)))?;

        let task = tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    Some(()) = sigterm.recv() => Signal::SIGTERM,
                    Some(()) = sigint.recv() => Signal::SIGINT,
                    else => break,
                };

                tracing::info!(signal = %received, pid, "Forwarding signal to managed service");
                cancel.cancel();

                if let Err(e) = send_signal(pid, received) {
                    tracing::debug!("Signal not delivered: {}", e);
                }
            }
        });

        Ok(Self { task })
    }
}

impl Drop for SignalForwarder {
    fn drop(&mut self) {
        self.task.abort();
    }
}
