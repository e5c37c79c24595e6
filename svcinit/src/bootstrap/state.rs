//! Bootstrap phases and state machine.
//!
//! Defines the phases of one bootstrap run and the valid transitions
//! between them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use svcinit_shared::errors::{ErrorKind, InitError, InitResult};

/// Phase of a bootstrap run.
///
/// ```text
/// Fresh → WaitingForService → CheckingInitialized ─(initialized)─────────────→ Done
///                                     │
///                                     └→ CreatingAdmin → PersistingCredential
///                                          → Authenticating → EnsuringResource → Done
///
/// any non-terminal phase ──(error)──→ Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapPhase {
    /// Nothing attempted yet. The child has already been spawned.
    Fresh,

    /// Polling the readiness probe.
    WaitingForService,

    /// Asking the service whether its admin account exists.
    CheckingInitialized,

    /// Creating the admin account with a staged secret.
    CreatingAdmin,

    /// Publishing the secret the service accepted.
    PersistingCredential,

    /// Exchanging the credential for a session token.
    Authenticating,

    /// Making sure the local endpoint is registered.
    EnsuringResource,

    /// Bootstrap complete. Terminal.
    Done,

    /// Bootstrap aborted. Terminal; the child keeps running.
    Failed,
}

impl BootstrapPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BootstrapPhase::Done | BootstrapPhase::Failed)
    }

    /// Check if transition to target phase is valid.
    pub fn can_transition_to(&self, target: BootstrapPhase) -> bool {
        use BootstrapPhase::*;
        matches!(
            (self, target),
            (Fresh, WaitingForService)
                | (WaitingForService, CheckingInitialized)
                // Fast path: already initialized
                | (CheckingInitialized, Done)
                | (CheckingInitialized, CreatingAdmin)
                | (CreatingAdmin, PersistingCredential)
                | (PersistingCredential, Authenticating)
                | (Authenticating, EnsuringResource)
                | (EnsuringResource, Done)
        ) || (!self.is_terminal() && target == Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BootstrapPhase::Fresh => "fresh",
            BootstrapPhase::WaitingForService => "waiting_for_service",
            BootstrapPhase::CheckingInitialized => "checking_initialized",
            BootstrapPhase::CreatingAdmin => "creating_admin",
            BootstrapPhase::PersistingCredential => "persisting_credential",
            BootstrapPhase::Authenticating => "authenticating",
            BootstrapPhase::EnsuringResource => "ensuring_resource",
            BootstrapPhase::Done => "done",
            BootstrapPhase::Failed => "failed",
        }
    }
}

impl std::fmt::Display for BootstrapPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One recorded phase change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseChange {
    pub phase: BootstrapPhase,
    pub at: DateTime<Utc>,
}

/// Why a run ended in [`BootstrapPhase::Failed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    /// Phase that was active when the error occurred.
    pub phase: BootstrapPhase,
    /// Stable error code, see [`ErrorKind::as_str`].
    pub kind: String,
    pub message: String,
}

/// State of one bootstrap run, with its transition history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapState {
    /// Current phase.
    pub phase: BootstrapPhase,
    /// Every phase entered, oldest first, starting with `Fresh`.
    pub history: Vec<PhaseChange>,
    /// Last phase change timestamp (UTC).
    pub last_updated: DateTime<Utc>,
    pub failure: Option<Failure>,
}

impl BootstrapState {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            phase: BootstrapPhase::Fresh,
            history: vec![PhaseChange {
                phase: BootstrapPhase::Fresh,
                at: now,
            }],
            last_updated: now,
            failure: None,
        }
    }

    /// Attempt phase transition with validation.
    ///
    /// Returns error if the transition is not valid; the state is unchanged.
    pub fn transition_to(&mut self, next: BootstrapPhase) -> InitResult<()> {
        if !self.phase.can_transition_to(next) {
            return Err(InitError::InvalidState(format!(
                "Cannot transition from {} to {}",
                self.phase, next
            )));
        }

        tracing::debug!(from = %self.phase, to = %next, "Bootstrap phase change");

        let now = Utc::now();
        self.phase = next;
        self.last_updated = now;
        self.history.push(PhaseChange { phase: next, at: now });
        Ok(())
    }

    /// Move to `Failed`, remembering the error and the phase it happened in.
    ///
    /// No-op when the run already reached a terminal phase.
    pub fn fail(&mut self, error: &InitError) {
        if self.phase.is_terminal() {
            return;
        }

        self.failure = Some(Failure {
            phase: self.phase,
            kind: error.kind().as_str().to_string(),
            message: error.to_string(),
        });
        // Every non-terminal phase may fail
        let _ = self.transition_to(BootstrapPhase::Failed);
    }

    /// Error kind of the failure, if the run failed.
    pub fn failure_kind(&self) -> Option<ErrorKind> {
        self.failure.as_ref().and_then(|f| kind_from_str(&f.kind))
    }

    /// Phases entered, in order.
    pub fn phases(&self) -> Vec<BootstrapPhase> {
        self.history.iter().map(|c| c.phase).collect()
    }

    pub fn visited(&self, phase: BootstrapPhase) -> bool {
        self.history.iter().any(|c| c.phase == phase)
    }
}

impl Default for BootstrapState {
    fn default() -> Self {
        Self::new()
    }
}

fn kind_from_str(code: &str) -> Option<ErrorKind> {
    use ErrorKind::*;
    [
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
    ]
    .into_iter()
    .find(|k| k.as_str() == code)
}
