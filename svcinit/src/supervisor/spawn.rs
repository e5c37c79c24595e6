//! Launching the managed service process.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use svcinit_shared::constants::service;
use svcinit_shared::errors::{InitError, InitResult};
use tokio::process::{Child, Command};

/// Where the child's stdout/stderr go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChildOutput {
    /// Share our stdout/stderr (container log driver sees the service directly).
    #[default]
    Inherit,
    /// Capture and re-emit each line through `tracing`.
    Trace,
}

/// Program, arguments and output mode of the managed service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceCommand {
    program: PathBuf,
    args: Vec<OsString>,
    output: ChildOutput,
    admin_password_file: Option<PathBuf>,
}

impl ServiceCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            output: ChildOutput::default(),
            admin_password_file: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn output(mut self, output: ChildOutput) -> Self {
        self.output = output;
        self
    }

    /// Seed the admin password from `path` via the service's password-file flag.
    pub fn admin_password_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.admin_password_file = Some(path.into());
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn output_mode(&self) -> ChildOutput {
        self.output
    }

    /// Arguments passed to the program, password-file flag last.
    pub fn argv(&self) -> Vec<OsString> {
        let mut argv = Vec::with_capacity(self.args.len() + 2);
        argv.extend(self.args.iter().cloned());
        if let Some(path) = &self.admin_password_file {
            argv.push(OsString::from(service::ADMIN_PASSWORD_FILE_FLAG));
            argv.push(path.clone().into_os_string());
        }
        argv
    }
}

/// Spawn the child. stdin is inherited; stdout/stderr follow [`ChildOutput`].
pub(super) fn spawn_service(command: &ServiceCommand) -> InitResult<Child> {
    let mut cmd = Command::new(command.program());
    cmd.args(command.argv());
    cmd.stdin(Stdio::inherit());

    match command.output {
        ChildOutput::Inherit => {
            cmd.stdout(Stdio::inherit());
            cmd.stderr(Stdio::inherit());
        }
        ChildOutput::Trace => {
            cmd.stdout(Stdio::piped());
            cmd.stderr(Stdio::piped());
        }
    }

    cmd.spawn().map_err(|e| {
        InitError::ChildProcess(format!(
            "failed to start {}: {}",
            command.program().display(),
            e
        ))
    })
}
