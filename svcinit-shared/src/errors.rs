//! Error taxonomy for the bootstrap coordinator.
//!
//! Errors are categorized by the step that produced them so the CLI can
//! report a stable code per failure class:
//! - transport failures are retried by the HTTP client until exhausted
//! - readiness, persistence and protocol failures abort the bootstrap
//! - child process failures are propagated as the program's exit status

use crate::constants::exit_codes;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Top-Level Error
// ============================================================================

/// Errors produced while bootstrapping the managed service.
///
/// ```ignore
/// match sequencer.run().await {
///     Err(e) if e.is_retryable() => { /* transport, maybe later */ }
///     Err(e) => std::process::exit(e.exit_code()),
///     Ok(report) => { /* Done */ }
/// }
/// ```
#[derive(Debug, Error)]
pub enum InitError {
    /// A single request attempt failed before an HTTP status was received.
    #[error("network: {0}")]
    TransientNetwork(String),

    /// Every attempt of a request failed at the transport level.
    #[error("{method} {url}: gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        method: String,
        url: String,
        attempts: u32,
        last_error: String,
    },

    /// The managed service never answered its readiness probe.
    #[error("service at {url} not ready after {waited:?}")]
    ReadinessTimeout { url: String, waited: Duration },

    /// The credential could not be written durably.
    #[error("persist credential at {path}: {source}")]
    CredentialPersist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The credential exists but could not be read or is malformed.
    #[error("credential at {path}: {reason}")]
    Credential { path: PathBuf, reason: String },

    /// The managed service answered with a status the step does not accept.
    #[error("{step}: unexpected status {status}: {body}")]
    UnexpectedStatus {
        step: &'static str,
        status: u16,
        body: String,
    },

    /// The managed service answered with an accepted status but an unusable body.
    #[error("{step}: invalid response: {reason}")]
    InvalidResponse { step: &'static str, reason: String },

    /// The supervised child could not be started or waited on.
    #[error("child process: {0}")]
    ChildProcess(String),

    /// Invalid configuration (user-fixable).
    #[error("config: {0}")]
    Config(String),

    /// Another bootstrap instance holds the volume lock.
    #[error("locked: {0}")]
    Locked(String),

    /// Shutdown was requested while the bootstrap was in flight.
    #[error("bootstrap cancelled")]
    Cancelled,

    /// The overall bootstrap deadline elapsed.
    #[error("bootstrap did not finish within {0:?}")]
    DeadlineExceeded(Duration),

    /// A state transition the bootstrap state machine forbids.
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("internal: {0}")]
    Internal(String),
}

pub type InitResult<T> = Result<T, InitError>;

// ============================================================================
// Error Kinds
// ============================================================================

/// Stable, externally visible classification of an [`InitError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    TransientNetwork,
    RetriesExhausted,
    ReadinessTimeout,
    CredentialPersist,
    Credential,
    UnexpectedStatus,
    InvalidResponse,
    ChildProcess,
    Config,
    Locked,
    Cancelled,
    DeadlineExceeded,
    InvalidState,
    Internal,
}

impl ErrorKind {
    /// Machine-readable code printed with the terminal diagnostic.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::TransientNetwork => "transient_network",
            ErrorKind::RetriesExhausted => "retries_exhausted",
            ErrorKind::ReadinessTimeout => "readiness_timeout",
            ErrorKind::CredentialPersist => "credential_persist",
            ErrorKind::Credential => "credential",
            ErrorKind::UnexpectedStatus => "unexpected_status",
            ErrorKind::InvalidResponse => "invalid_response",
            ErrorKind::ChildProcess => "child_process",
            ErrorKind::Config => "config",
            ErrorKind::Locked => "locked",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::DeadlineExceeded => "deadline_exceeded",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::Internal => "internal",
        }
    }

    /// Process exit code used when this failure ends the program.
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorKind::TransientNetwork | ErrorKind::RetriesExhausted | ErrorKind::Locked => {
                exit_codes::TEMP_FAIL
            }
            ErrorKind::ReadinessTimeout | ErrorKind::DeadlineExceeded => exit_codes::UNAVAILABLE,
            ErrorKind::CredentialPersist => exit_codes::CANT_CREATE,
            ErrorKind::Credential => exit_codes::NO_INPUT,
            ErrorKind::UnexpectedStatus | ErrorKind::InvalidResponse => exit_codes::PROTOCOL,
            ErrorKind::ChildProcess => exit_codes::OS_ERR,
            ErrorKind::Config => exit_codes::CONFIG,
            ErrorKind::Cancelled => exit_codes::INTERRUPTED,
            ErrorKind::InvalidState | ErrorKind::Internal => exit_codes::SOFTWARE,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl InitError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            InitError::TransientNetwork(_) => ErrorKind::TransientNetwork,
            InitError::RetriesExhausted { .. } => ErrorKind::RetriesExhausted,
            InitError::ReadinessTimeout { .. } => ErrorKind::ReadinessTimeout,
            InitError::CredentialPersist { .. } => ErrorKind::CredentialPersist,
            InitError::Credential { .. } => ErrorKind::Credential,
            InitError::UnexpectedStatus { .. } => ErrorKind::UnexpectedStatus,
            InitError::InvalidResponse { .. } => ErrorKind::InvalidResponse,
            InitError::ChildProcess(_) => ErrorKind::ChildProcess,
            InitError::Config(_) => ErrorKind::Config,
            InitError::Locked(_) => ErrorKind::Locked,
            InitError::Cancelled => ErrorKind::Cancelled,
            InitError::DeadlineExceeded(_) => ErrorKind::DeadlineExceeded,
            InitError::InvalidState(_) => ErrorKind::InvalidState,
            InitError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.kind().exit_code()
    }

    /// Whether a later attempt could succeed without operator action.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::TransientNetwork | ErrorKind::RetriesExhausted | ErrorKind::Locked
        )
    }
}

// ============================================================================
// Convenience Constructors
// ============================================================================

impl InitError {
    /// Create a credential persistence error.
    pub fn persist(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::CredentialPersist {
            path: path.into(),
            source,
        }
    }

    /// Create a credential read/parse error.
    pub fn credential(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Credential {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an unexpected-status error, keeping the response body for diagnosis.
    pub fn unexpected_status(step: &'static str, status: u16, body: impl Into<String>) -> Self {
        Self::UnexpectedStatus {
            step,
            status,
            body: body.into(),
        }
    }

    /// Create an invalid-response error.
    pub fn invalid_response(step: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            step,
            reason: reason.into(),
        }
    }
}
