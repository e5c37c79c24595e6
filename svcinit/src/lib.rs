//! svcinit - first-run bootstrapper for a supervised container-management service.
//!
//! The crate starts the managed service as a child process, waits for its
//! API, creates the one-time administrator account exactly once, persists
//! the generated credential and registers the local endpoint. Repeated
//! container restarts converge on the same state without duplicating the
//! account or the endpoint.
//!
//! ## Architecture
//!
//! ```text
//! Launcher ──→ ServiceSupervisor (child process)
//!    │
//!    └──→ BootstrapSequencer ──→ ReadinessPoller ──┐
//!              │                                    ├──→ HttpTransport
//!              ├──→ ServiceApi ──→ RetryClient ─────┘
//!              └──→ CredentialStore (+ VolumeLock)
//! ```

pub mod bootstrap;
pub mod credential;
pub mod http;
pub mod launcher;
pub mod options;
pub mod readiness;
pub mod supervisor;
pub mod util;

pub use bootstrap::{
    BootstrapPath, BootstrapPhase, BootstrapReport, BootstrapSequencer, BootstrapState,
    EndpointCreationType, ProvisionOutcome, ResourceSpec,
};
pub use credential::{Credential, CredentialStore, Secret, VolumeLock};
pub use http::{
    HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport, RetryClient, RetryPolicy,
};
pub use launcher::{LaunchOutcome, Launcher, resolve_exit_code};
pub use options::BootstrapOptions;
pub use readiness::ReadinessPoller;
pub use supervisor::{ChildOutput, ServiceCommand, ServiceSupervisor, SignalForwarder};
pub use util::clock::{Clock, SystemClock};

pub use svcinit_shared::errors::{ErrorKind, InitError, InitResult};
