//! Command-line definitions.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use svcinit::{BootstrapOptions, ChildOutput, ServiceCommand};
use svcinit_shared::constants::service;
use svcinit_shared::errors::InitResult;

use crate::commands::credential::CredentialArgs;

#[derive(Parser, Debug)]
#[command(
    name = "svcinit",
    version,
    about = "Start the managed service and bootstrap its admin account and local endpoint",
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub global: GlobalFlags,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the managed service and bootstrap it (default)
    Run(RunArgs),

    /// Ensure the admin credential exists and print where it is
    Credential(CredentialArgs),
}

#[derive(Args, Debug, Clone)]
pub struct GlobalFlags {
    /// Also write logs to svcinit.log in this directory
    #[arg(long, global = true, env = "SVCINIT_LOG_DIR", value_name = "DIR")]
    pub log_dir: Option<PathBuf>,
}

/// Flags shared by every command that touches the credential.
#[derive(Args, Debug, Clone, Default)]
pub struct BootstrapFlags {
    /// JSON file with bootstrap options; flags override it
    #[arg(long, env = "SVCINIT_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// API base URL of the managed service
    #[arg(long, env = "SVCINIT_BASE_URL", value_name = "URL")]
    pub base_url: Option<String>,

    /// Credential file holding the admin secret
    #[arg(long, env = "SVCINIT_CREDENTIAL_PATH", value_name = "FILE")]
    pub credential_path: Option<PathBuf>,

    /// Admin username
    #[arg(long, env = "SVCINIT_USERNAME")]
    pub username: Option<String>,

    /// Length of a generated secret
    #[arg(long, env = "SVCINIT_SECRET_LENGTH", value_name = "N")]
    pub secret_length: Option<usize>,
}

impl BootstrapFlags {
    /// Defaults, then the config file, then flags.
    pub fn to_options(&self) -> InitResult<BootstrapOptions> {
        let mut options = match &self.config {
            Some(path) => BootstrapOptions::from_json_file(path)?,
            None => BootstrapOptions::default(),
        };

        if let Some(base_url) = &self.base_url {
            let derived = BootstrapOptions::for_base_url(base_url);
            options.probe_url = derived.probe_url;
            options.check_url = derived.check_url;
            options.init_url = derived.init_url;
            options.auth_url = derived.auth_url;
            options.endpoints_url = derived.endpoints_url;
        }
        if let Some(path) = &self.credential_path {
            options.credential_path = path.clone();
        }
        if let Some(username) = &self.username {
            options.username = username.clone();
        }
        if let Some(length) = self.secret_length {
            options.secret_length = length;
        }

        Ok(options)
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputMode {
    /// Child writes straight to our stdout/stderr
    #[default]
    Inherit,
    /// Child output is re-emitted through the log
    Trace,
}

impl From<OutputMode> for ChildOutput {
    fn from(mode: OutputMode) -> Self {
        match mode {
            OutputMode::Inherit => ChildOutput::Inherit,
            OutputMode::Trace => ChildOutput::Trace,
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    #[command(flatten)]
    pub bootstrap: BootstrapFlags,

    /// Managed service executable
    #[arg(long, env = "SVCINIT_PROGRAM", default_value = service::DEFAULT_PROGRAM)]
    pub program: PathBuf,

    /// Argument always passed to the service, before the trailing ones (repeatable)
    #[arg(long = "service-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub service_args: Vec<String>,

    /// Where the service's stdout/stderr go
    #[arg(long, value_enum, env = "SVCINIT_CHILD_OUTPUT", default_value_t)]
    pub child_output: OutputMode,

    /// Create the credential before start and pass it with --admin-password-file
    #[arg(long = "admin-password-file-flag", env = "SVCINIT_PRESEED")]
    pub preseed: bool,

    /// Sentinel file touched after a completed bootstrap
    #[arg(long, env = "SVCINIT_SENTINEL_PATH", value_name = "FILE")]
    pub sentinel_path: Option<PathBuf>,

    /// Do not read or write the sentinel file
    #[arg(long, conflicts_with = "sentinel_path")]
    pub no_sentinel: bool,

    /// Delay between readiness probes (e.g. 500ms, 2s)
    #[arg(long, env = "SVCINIT_POLL_INTERVAL", value_parser = parse_duration)]
    pub poll_interval: Option<Duration>,

    /// Give up waiting for the service after this long
    #[arg(long, env = "SVCINIT_POLL_TIMEOUT", value_parser = parse_duration)]
    pub poll_timeout: Option<Duration>,

    /// Attempts per API request
    #[arg(long, env = "SVCINIT_RETRY_COUNT")]
    pub retry_count: Option<u32>,

    /// Delay between attempts of a failed request
    #[arg(long, env = "SVCINIT_RETRY_BACKOFF", value_parser = parse_duration)]
    pub retry_backoff: Option<Duration>,

    /// Timeout of a single API request
    #[arg(long, env = "SVCINIT_REQUEST_TIMEOUT", value_parser = parse_duration)]
    pub request_timeout: Option<Duration>,

    /// Upper bound on the whole bootstrap
    #[arg(long, env = "SVCINIT_BOOTSTRAP_TIMEOUT", value_parser = parse_duration)]
    pub bootstrap_timeout: Option<Duration>,

    /// Name of the endpoint to register
    #[arg(long, env = "SVCINIT_RESOURCE_NAME")]
    pub resource_name: Option<String>,

    /// Connection URL of the endpoint to register
    #[arg(long, env = "SVCINIT_RESOURCE_URL")]
    pub resource_url: Option<String>,

    /// Arguments passed through to the service
    #[arg(last = true, value_name = "SERVICE_ARGS")]
    pub passthrough: Vec<String>,
}

impl RunArgs {
    pub fn to_options(&self) -> InitResult<BootstrapOptions> {
        let mut options = self.bootstrap.to_options()?;

        if self.no_sentinel {
            options.sentinel_path = None;
        } else if let Some(path) = &self.sentinel_path {
            options.sentinel_path = Some(path.clone());
        }
        if self.preseed {
            options.preseed_credential = true;
        }
        if let Some(d) = self.poll_interval {
            options.poll_interval = d;
        }
        if let Some(d) = self.poll_timeout {
            options.poll_timeout = d;
        }
        if let Some(n) = self.retry_count {
            options.retry_count = n;
        }
        if let Some(d) = self.retry_backoff {
            options.retry_backoff = d;
        }
        if let Some(d) = self.request_timeout {
            options.request_timeout = d;
        }
        if let Some(d) = self.bootstrap_timeout {
            options.bootstrap_timeout = Some(d);
        }
        if let Some(name) = &self.resource_name {
            options.resource.name = name.clone();
        }
        if let Some(url) = &self.resource_url {
            options.resource.url = url.clone();
        }

        Ok(options)
    }

    pub fn service_command(&self) -> ServiceCommand {
        ServiceCommand::new(&self.program)
            .args(&self.service_args)
            .args(&self.passthrough)
            .output(self.child_output.into())
    }
}

/// Parse `500ms`, `2s`, `5m` or a bare number of seconds.
pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let value = value.trim();
    let (number, unit) = match value.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => value.split_at(idx),
        None => (value, "s"),
    };

    let amount: u64 = number
        .parse()
        .map_err(|_| format!("invalid duration '{}'", value))?;

    match unit {
        "ms" => Ok(Duration::from_millis(amount)),
        "s" => Ok(Duration::from_secs(amount)),
        "m" => Ok(Duration::from_secs(amount * 60)),
        _ => Err(format!(
            "invalid duration unit in '{}' (use ms, s or m)",
            value
        )),
    }
}
