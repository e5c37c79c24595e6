//! Values exchanged between the sequencer and the managed service.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize};
use svcinit_shared::constants::account;

use super::state::PhaseChange;

/// Result of a create call that tolerates conflicts.
///
/// A 409 is not an error: the thing we wanted exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionOutcome {
    Created,
    AlreadyExists,
}

/// Endpoint kind as understood by the managed service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum EndpointCreationType {
    LocalDocker = 1,
    Agent = 2,
    Azure = 3,
    EdgeAgent = 4,
    LocalKubernetes = 5,
}

impl EndpointCreationType {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl From<EndpointCreationType> for u8 {
    fn from(value: EndpointCreationType) -> Self {
        value.code()
    }
}

impl TryFrom<u8> for EndpointCreationType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::LocalDocker),
            2 => Ok(Self::Agent),
            3 => Ok(Self::Azure),
            4 => Ok(Self::EdgeAgent),
            5 => Ok(Self::LocalKubernetes),
            other => Err(format!("unknown endpoint creation type {}", other)),
        }
    }
}

/// The endpoint the bootstrap makes sure exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceSpec {
    pub name: String,
    /// Connection descriptor, e.g. the Docker socket URL.
    pub url: String,
    pub creation_type: EndpointCreationType,
}

impl Default for ResourceSpec {
    fn default() -> Self {
        Self {
            name: account::DEFAULT_RESOURCE_NAME.to_string(),
            url: account::DEFAULT_RESOURCE_URL.to_string(),
            creation_type: EndpointCreationType::LocalDocker,
        }
    }
}

/// Bearer token from `POST /auth`. Lives only as long as one run.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(<redacted>)")
    }
}

/// What `GET /users/admin/check` said.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminCheck {
    /// 204: the admin account exists.
    Initialized,
    /// 404: no admin account yet.
    Uninitialized,
    /// Any other status.
    Inconclusive(u16),
}

/// One entry of `GET /endpoints`. Unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EndpointSummary {
    #[serde(rename = "Id", alias = "id", default)]
    pub id: Option<u64>,
    #[serde(rename = "Name", alias = "name", deserialize_with = "null_as_empty")]
    pub name: String,
    /// Empty when the service omits it or sends `null`.
    #[serde(rename = "URL", alias = "url", default, deserialize_with = "null_as_empty")]
    pub url: String,
    #[serde(rename = "Type", alias = "type", default)]
    pub kind: Option<u8>,
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Which route a run took to `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapPath {
    /// The service was already initialized.
    AlreadyInitialized,
    /// Admin and endpoint were provisioned by this run.
    Provisioned,
}

/// Summary of a successful bootstrap run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapReport {
    pub path: BootstrapPath,
    /// Outcome of admin creation; `None` on the fast path.
    pub admin: Option<ProvisionOutcome>,
    /// Outcome of endpoint provisioning; `None` on the fast path.
    pub resource: Option<ProvisionOutcome>,
    /// Whether this run wrote the credential file.
    pub credential_created: bool,
    pub credential_path: PathBuf,
    pub history: Vec<PhaseChange>,
}
