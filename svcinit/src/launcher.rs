//! Composition root: start the child, bootstrap it, mirror its exit status.

use std::sync::Arc;

use svcinit_shared::errors::{InitError, InitResult};
use tokio_util::sync::CancellationToken;

use crate::bootstrap::{BootstrapReport, BootstrapSequencer};
use crate::http::{HttpTransport, ReqwestTransport};
use crate::options::BootstrapOptions;
use crate::supervisor::{ServiceCommand, ServiceSupervisor, SignalForwarder};
use crate::util::clock::{Clock, SystemClock};

/// How a launch ended.
#[derive(Debug)]
pub struct LaunchOutcome {
    /// Code this program should exit with.
    pub exit_code: i32,
    pub child_exit_code: i32,
    pub bootstrap: InitResult<BootstrapReport>,
}

pub struct Launcher {
    options: BootstrapOptions,
    command: ServiceCommand,
    transport: Option<Arc<dyn HttpTransport>>,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
    forward_signals: bool,
}

impl Launcher {
    pub fn new(options: BootstrapOptions, command: ServiceCommand) -> Self {
        Self {
            options,
            command,
            transport: None,
            clock: Arc::new(SystemClock),
            cancel: CancellationToken::new(),
            forward_signals: true,
        }
    }

    /// Use `transport` instead of a reqwest client built from the options.
    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Relay SIGTERM/SIGINT to the child (default on).
    pub fn forward_signals(mut self, enabled: bool) -> Self {
        self.forward_signals = enabled;
        self
    }

    /// Token that aborts the bootstrap when cancelled. The child is unaffected.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Start the managed service, bootstrap it and wait for it to exit.
    ///
    /// Errors are returned only when the child could not be run at all;
    /// bootstrap failures are reported in [`LaunchOutcome::bootstrap`].
    pub async fn run(self) -> InitResult<LaunchOutcome> {
        self.options.validate()?;

        let mut command = self.command;
        if self.options.preseed_credential {
            let credential = self.options.credential_store().ensure_credential()?;
            tracing::info!(
                username = %credential.username,
                path = %self.options.credential_path.display(),
                "Seeding admin password from credential file"
            );
            command = command.admin_password_file(&self.options.credential_path);
        }

        let transport: Arc<dyn HttpTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(self.options.request_timeout)?),
        };

        let mut supervisor = ServiceSupervisor::new(command);
        let pid = supervisor.start()?;

        let _signals = if self.forward_signals {
            match SignalForwarder::spawn(pid, self.cancel.clone()) {
                Ok(forwarder) => Some(forwarder),
                Err(e) => {
                    tracing::warn!("Signals will not be forwarded to the managed service: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let username = self.options.username.clone();
        let cancel = self.cancel;
        let mut sequencer =
            BootstrapSequencer::new(self.options, transport, self.clock, cancel.clone());

        let (bootstrap, early_exit) = {
            let bootstrap_run = sequencer.run();
            tokio::pin!(bootstrap_run);

            tokio::select! {
                result = &mut bootstrap_run => (result, None),
                waited = supervisor.wait() => {
                    tracing::warn!("Managed service exited before bootstrap finished");
                    cancel.cancel();
                    (bootstrap_run.await, Some(waited))
                }
            }
        };

        match &bootstrap {
            Ok(report) if report.credential_created => {
                tracing::info!(
                    username = %username,
                    path = %report.credential_path.display(),
                    "Admin credential created, the secret is stored in the credential file"
                );
            }
            Ok(_) => {}
            Err(InitError::Cancelled) => {}
            Err(e) => {
                tracing::warn!(
                    kind = %e.kind(),
                    "Bootstrap failed, managed service keeps running: {}", e
                );
            }
        }

        let child_exit_code = match early_exit {
            Some(waited) => waited?,
            None => supervisor.wait().await?,
        };

        Ok(LaunchOutcome {
            exit_code: resolve_exit_code(child_exit_code, &bootstrap),
            child_exit_code,
            bootstrap,
        })
    }
}

/// Exit code of the program.
///
/// A failing child wins. Otherwise a bootstrap failure is reported, except
/// a cancellation, which only happens because the child or the operator
/// ended the run.
pub fn resolve_exit_code(child_exit_code: i32, bootstrap: &InitResult<BootstrapReport>) -> i32 {
    if child_exit_code != 0 {
        return child_exit_code;
    }
    match bootstrap {
        Ok(_) | Err(InitError::Cancelled) => child_exit_code,
        Err(e) => e.exit_code(),
    }
}
