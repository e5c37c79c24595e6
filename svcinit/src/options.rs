//! Configuration options for a bootstrap run.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use svcinit_shared::constants::{account, api, paths, timing};
use svcinit_shared::errors::{InitError, InitResult};

use crate::bootstrap::ResourceSpec;
use crate::credential::CredentialStore;
use crate::http::RetryPolicy;

/// Everything the sequencer needs to know about the managed service.
///
/// Loaded from JSON with every field optional; durations are given in
/// milliseconds (`poll_interval_ms`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapOptions {
    /// Readiness probe, any 2xx means ready.
    pub probe_url: String,
    pub check_url: String,
    pub init_url: String,
    pub auth_url: String,
    pub endpoints_url: String,

    /// Credential file holding the raw admin secret.
    pub credential_path: PathBuf,

    /// Touched after a completed bootstrap. `None` disables the sentinel.
    pub sentinel_path: Option<PathBuf>,

    pub username: String,
    pub secret_length: usize,

    #[serde(rename = "poll_interval_ms", with = "millis")]
    pub poll_interval: Duration,
    #[serde(rename = "poll_timeout_ms", with = "millis")]
    pub poll_timeout: Duration,

    /// Attempts per request, including the first.
    pub retry_count: u32,
    #[serde(rename = "retry_backoff_ms", with = "millis")]
    pub retry_backoff: Duration,
    #[serde(rename = "request_timeout_ms", with = "millis")]
    pub request_timeout: Duration,

    /// Upper bound on the whole bootstrap. `None` means no overall deadline.
    #[serde(rename = "bootstrap_timeout_ms", with = "millis_opt")]
    pub bootstrap_timeout: Option<Duration>,

    /// Ensure the credential before the child starts and hand it over with
    /// the service's admin-password-file flag.
    pub preseed_credential: bool,

    pub resource: ResourceSpec,
}

impl Default for BootstrapOptions {
    fn default() -> Self {
        Self::for_base_url(api::DEFAULT_BASE_URL)
    }
}

impl BootstrapOptions {
    /// Options with every API URL derived from `base_url` (e.g. `http://localhost:9000/api`).
    pub fn for_base_url(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            probe_url: format!("{}{}", base, api::STATUS_PATH),
            check_url: format!("{}{}", base, api::ADMIN_CHECK_PATH),
            init_url: format!("{}{}", base, api::ADMIN_INIT_PATH),
            auth_url: format!("{}{}", base, api::AUTH_PATH),
            endpoints_url: format!("{}{}", base, api::ENDPOINTS_PATH),
            credential_path: PathBuf::from(paths::CREDENTIAL_FILE),
            sentinel_path: Some(PathBuf::from(paths::INIT_SENTINEL)),
            username: account::DEFAULT_USERNAME.to_string(),
            secret_length: account::DEFAULT_SECRET_LENGTH,
            poll_interval: Duration::from_millis(timing::POLL_INTERVAL_MS),
            poll_timeout: Duration::from_millis(timing::POLL_TIMEOUT_MS),
            retry_count: timing::RETRY_COUNT,
            retry_backoff: Duration::from_millis(timing::RETRY_BACKOFF_MS),
            request_timeout: Duration::from_millis(timing::REQUEST_TIMEOUT_MS),
            bootstrap_timeout: None,
            preseed_credential: false,
            resource: ResourceSpec::default(),
        }
    }

    /// Load options from a JSON file. Missing fields keep their defaults.
    pub fn from_json_file(path: &Path) -> InitResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| InitError::Config(format!("read {}: {}", path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| InitError::Config(format!("parse {}: {}", path.display(), e)))
    }

    /// Reject values that would make the bootstrap misbehave.
    pub fn validate(&self) -> InitResult<()> {
        for (name, url) in [
            ("probe_url", &self.probe_url),
            ("check_url", &self.check_url),
            ("init_url", &self.init_url),
            ("auth_url", &self.auth_url),
            ("endpoints_url", &self.endpoints_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(InitError::Config(format!(
                    "{} must be an http(s) URL, got '{}'",
                    name, url
                )));
            }
        }

        if self.credential_path.as_os_str().is_empty() {
            return Err(InitError::Config("credential_path must not be empty".into()));
        }
        if self.username.trim().is_empty() {
            return Err(InitError::Config("username must not be empty".into()));
        }
        if self.secret_length < account::MIN_SECRET_LENGTH {
            return Err(InitError::Config(format!(
                "secret_length must be at least {}, got {}",
                account::MIN_SECRET_LENGTH,
                self.secret_length
            )));
        }
        if self.retry_count == 0 {
            return Err(InitError::Config("retry_count must be at least 1".into()));
        }
        if self.poll_interval.is_zero() {
            return Err(InitError::Config("poll_interval must be positive".into()));
        }
        if self.poll_timeout.is_zero() {
            return Err(InitError::Config("poll_timeout must be positive".into()));
        }
        if self.request_timeout.is_zero() {
            return Err(InitError::Config("request_timeout must be positive".into()));
        }
        if self.bootstrap_timeout.is_some_and(|d| d.is_zero()) {
            return Err(InitError::Config("bootstrap_timeout must be positive".into()));
        }
        if self.resource.name.trim().is_empty() {
            return Err(InitError::Config("resource name must not be empty".into()));
        }

        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_count,
            backoff: self.retry_backoff,
        }
    }

    pub fn credential_store(&self) -> CredentialStore {
        CredentialStore::new(&self.credential_path, &self.username, self.secret_length)
    }

    /// Directory holding the volume lock: the credential's parent.
    pub fn lock_dir(&self) -> PathBuf {
        self.credential_store().dir().to_path_buf()
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod millis_opt {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|v| v.map(Duration::from_millis))
    }
}
