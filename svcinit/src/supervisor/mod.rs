//! Supervision of the managed service child process.
//!
//! Exactly one child per invocation. The supervisor starts it, reports its
//! pid, waits for it and maps its exit status to ours. It never kills the
//! child on its own; only forwarded operator signals do.

mod log_stream;
mod signals;
mod spawn;

pub use signals::SignalForwarder;
pub use spawn::{ChildOutput, ServiceCommand};

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use svcinit_shared::errors::{InitError, InitResult};
use tokio::process::Child;

use crate::util::exit_code_of;
use log_stream::LogStreamHandler;

pub struct ServiceSupervisor {
    command: ServiceCommand,
    child: Option<Child>,
    pid: Option<u32>,
    logs: Option<LogStreamHandler>,
    exit_code: Option<i32>,
}

impl ServiceSupervisor {
    pub fn new(command: ServiceCommand) -> Self {
        Self {
            command,
            child: None,
            pid: None,
            logs: None,
            exit_code: None,
        }
    }

    pub fn command(&self) -> &ServiceCommand {
        &self.command
    }

    /// Start the managed service.
    ///
    /// # Returns
    /// * `Ok(pid)` - Child running
    /// * `Err(InitError::InvalidState)` - A child was already started
    /// * `Err(InitError::ChildProcess)` - The program could not be executed
    pub fn start(&mut self) -> InitResult<u32> {
        if self.pid.is_some() {
            return Err(InitError::InvalidState(
                "managed service already started".into(),
            ));
        }

        let mut child = spawn::spawn_service(&self.command)?;
        let pid = child.id().ok_or_else(|| {
            InitError::ChildProcess("child exited before its pid was known".into())
        })?;

        if self.command.output_mode() == ChildOutput::Trace {
            self.logs = Some(LogStreamHandler::new(child.stdout.take(), child.stderr.take()));
        }

        tracing::info!(
            program = %self.command.program().display(),
            pid,
            "Started managed service"
        );

        self.pid = Some(pid);
        self.child = Some(child);
        Ok(pid)
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Exit code, once the child has been reaped.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Wait for the child to exit and return the code this program should exit with.
    ///
    /// Cancel-safe: dropping the future leaves the child running and a later
    /// call resumes waiting.
    pub async fn wait(&mut self) -> InitResult<i32> {
        if let Some(code) = self.exit_code {
            return Ok(code);
        }

        let child = self
            .child
            .as_mut()
            .ok_or_else(|| InitError::InvalidState("managed service not started".into()))?;

        let status = child
            .wait()
            .await
            .map_err(|e| InitError::ChildProcess(format!("wait for managed service: {}", e)))?;

        if let Some(logs) = self.logs.take() {
            logs.shutdown().await;
        }

        let code = exit_code_of(&status);
        tracing::info!(pid = ?self.pid, exit_code = code, "Managed service exited");

        self.exit_code = Some(code);
        self.child = None;
        Ok(code)
    }

    /// Send `signal` to the running child.
    pub fn signal(&self, signal: Signal) -> InitResult<()> {
        let pid = match (self.pid, self.exit_code) {
            (Some(pid), None) => pid,
            (Some(_), Some(_)) => {
                return Err(InitError::InvalidState("managed service already exited".into()));
            }
            (None, _) => return Err(InitError::InvalidState("managed service not started".into())),
        };
        send_signal(pid, signal)
    }
}

pub(crate) fn send_signal(pid: u32, signal: Signal) -> InitResult<()> {
    kill(Pid::from_raw(pid as i32), signal).map_err(|e| {
        InitError::ChildProcess(format!(
            "failed to send {} to process {}: {}",
            signal, pid, e
        ))
    })
}
