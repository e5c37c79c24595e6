//! Credential lifecycle: generation, staging, durable persistence.
//!
//! The credential file is the permanent secret of the data volume. It is
//! written once with owner-only permissions and never overwritten.

mod lock;
mod secret;
mod store;

pub use lock::VolumeLock;
pub use secret::Secret;
pub use store::{CredentialOrigin, CredentialStore, StagedCredential};

/// Administrator credential for the managed service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub secret: Secret,
}

impl Credential {
    pub fn new(username: impl Into<String>, secret: Secret) -> Self {
        Self {
            username: username.into(),
            secret,
        }
    }
}
