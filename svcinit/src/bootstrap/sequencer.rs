//! The bootstrap run: readiness, admin creation, credential persistence,
//! authentication and endpoint provisioning, in that order.

use std::fs::OpenOptions;
use std::sync::Arc;

use svcinit_shared::errors::{InitError, InitResult};
use tokio_util::sync::CancellationToken;

use super::api::{STEP_CHECK, ServiceApi};
use super::state::{BootstrapPhase, BootstrapState};
use super::types::{AdminCheck, BootstrapPath, BootstrapReport, ProvisionOutcome, SessionToken};
use crate::credential::{CredentialOrigin, CredentialStore, VolumeLock};
use crate::http::{HttpTransport, RetryClient};
use crate::options::BootstrapOptions;
use crate::readiness::ReadinessPoller;
use crate::util::clock::Clock;

/// Drives one bootstrap run through [`BootstrapPhase`].
///
/// The sequencer never touches the child process: a failed bootstrap leaves
/// the managed service running.
pub struct BootstrapSequencer {
    options: BootstrapOptions,
    store: CredentialStore,
    api: ServiceApi,
    poller: ReadinessPoller,
    state: BootstrapState,
}

impl BootstrapSequencer {
    pub fn new(
        options: BootstrapOptions,
        transport: Arc<dyn HttpTransport>,
        clock: Arc<dyn Clock>,
        cancel: CancellationToken,
    ) -> Self {
        let client = RetryClient::new(
            Arc::clone(&transport),
            Arc::clone(&clock),
            options.retry_policy(),
            cancel.clone(),
        );

        Self {
            store: options.credential_store(),
            api: ServiceApi::new(client, &options),
            poller: ReadinessPoller::new(transport, clock, cancel),
            state: BootstrapState::new(),
            options,
        }
    }

    pub fn state(&self) -> &BootstrapState {
        &self.state
    }

    pub fn phase(&self) -> BootstrapPhase {
        self.state.phase
    }

    /// Run the bootstrap to `Done` or `Failed`.
    ///
    /// Holds the volume lock for the whole run and enforces the optional
    /// overall deadline. A sequencer runs at most once.
    pub async fn run(&mut self) -> InitResult<BootstrapReport> {
        if self.state.phase != BootstrapPhase::Fresh {
            return Err(InitError::InvalidState(format!(
                "bootstrap already ran (phase {})",
                self.state.phase
            )));
        }

        let result = self.run_locked().await;

        if let Err(e) = &result {
            let phase = self.state.phase;
            self.state.fail(e);
            tracing::error!(
                phase = %phase,
                kind = %e.kind(),
                "Bootstrap failed: {}", e
            );
        }
        result
    }

    async fn run_locked(&mut self) -> InitResult<BootstrapReport> {
        let _lock = VolumeLock::acquire(self.store.dir())?;

        match self.options.bootstrap_timeout {
            Some(limit) => tokio::time::timeout(limit, self.drive())
                .await
                .map_err(|_| InitError::DeadlineExceeded(limit))?,
            None => self.drive().await,
        }
    }

    async fn drive(&mut self) -> InitResult<BootstrapReport> {
        self.state.transition_to(BootstrapPhase::WaitingForService)?;
        self.poller
            .wait_ready(
                &self.options.probe_url,
                self.options.poll_interval,
                self.options.poll_timeout,
            )
            .await?;

        self.state.transition_to(BootstrapPhase::CheckingInitialized)?;
        if self.is_initialized().await? {
            return self.finish_initialized();
        }

        self.state.transition_to(BootstrapPhase::CreatingAdmin)?;
        let staged = self.store.stage()?;
        let admin = match self.api.init_admin(staged.credential()).await {
            Ok(outcome) => outcome,
            // The service answered and did not take this secret
            Err(e @ InitError::UnexpectedStatus { .. }) => {
                self.store.reject(&staged);
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        match admin {
            ProvisionOutcome::Created => {
                tracing::info!(username = %staged.credential().username, "Created admin account");
            }
            ProvisionOutcome::AlreadyExists => {
                tracing::info!(
                    username = %staged.credential().username,
                    "Admin account already exists"
                );
                if staged.origin() == CredentialOrigin::Generated {
                    tracing::warn!(
                        "Admin account was created elsewhere; authentication may fail with the new secret"
                    );
                }
            }
        }

        self.state.transition_to(BootstrapPhase::PersistingCredential)?;
        let credential_created = staged.origin() != CredentialOrigin::Persisted;
        let credential = self.store.commit(staged)?;

        self.state.transition_to(BootstrapPhase::Authenticating)?;
        let token = self.api.authenticate(&credential).await?;
        tracing::debug!(username = %credential.username, "Authenticated");

        self.state.transition_to(BootstrapPhase::EnsuringResource)?;
        let resource = self.ensure_resource(&token).await?;
        drop(token);

        self.state.transition_to(BootstrapPhase::Done)?;
        self.touch_sentinel();
        tracing::info!("Bootstrap complete");

        Ok(self.report(
            BootstrapPath::Provisioned,
            Some(admin),
            Some(resource),
            credential_created,
        ))
    }

    /// The live check decides; the sentinel only breaks ties when the check
    /// answers something other than 204 or 404.
    async fn is_initialized(&self) -> InitResult<bool> {
        match self.api.check_admin().await? {
            AdminCheck::Initialized => Ok(true),
            AdminCheck::Uninitialized => Ok(false),
            AdminCheck::Inconclusive(status) => match &self.options.sentinel_path {
                Some(sentinel) if sentinel.exists() => {
                    tracing::info!(
                        sentinel = %sentinel.display(),
                        status,
                        "Admin check inconclusive, sentinel present: treating as initialized"
                    );
                    Ok(true)
                }
                _ => Err(InitError::unexpected_status(
                    STEP_CHECK,
                    status,
                    "neither 204 nor 404, and no init sentinel",
                )),
            },
        }
    }

    fn finish_initialized(&mut self) -> InitResult<BootstrapReport> {
        // A crash between admin creation and persistence leaves the accepted
        // secret in the pending file.
        let recovered = self.store.recover_pending()?.is_some();

        self.state.transition_to(BootstrapPhase::Done)?;
        self.touch_sentinel();
        tracing::info!("Managed service already initialized, nothing to do");

        Ok(self.report(BootstrapPath::AlreadyInitialized, None, None, recovered))
    }

    async fn ensure_resource(&self, token: &SessionToken) -> InitResult<ProvisionOutcome> {
        let spec = &self.options.resource;

        let endpoints = self.api.list_endpoints(token).await?;
        if let Some(existing) = endpoints.iter().find(|e| e.name == spec.name) {
            if !existing.url.is_empty() && existing.url != spec.url {
                tracing::warn!(
                    name = %spec.name,
                    expected = %spec.url,
                    actual = %existing.url,
                    "Endpoint exists with a different URL, leaving it untouched"
                );
            }
            tracing::info!(name = %spec.name, id = ?existing.id, "Endpoint already registered");
            return Ok(ProvisionOutcome::AlreadyExists);
        }

        let outcome = self.api.create_endpoint(token, spec).await?;
        match outcome {
            ProvisionOutcome::Created => {
                tracing::info!(name = %spec.name, url = %spec.url, "Registered endpoint");
            }
            ProvisionOutcome::AlreadyExists => {
                tracing::info!(name = %spec.name, "Endpoint was registered concurrently");
            }
        }
        Ok(outcome)
    }

    fn touch_sentinel(&self) {
        let Some(sentinel) = &self.options.sentinel_path else {
            return;
        };
        if sentinel.exists() {
            return;
        }

        if let Err(e) = OpenOptions::new().create(true).append(true).open(sentinel) {
            tracing::warn!(sentinel = %sentinel.display(), "Failed to write init sentinel: {}", e);
        }
    }

    fn report(
        &self,
        path: BootstrapPath,
        admin: Option<ProvisionOutcome>,
        resource: Option<ProvisionOutcome>,
        credential_created: bool,
    ) -> BootstrapReport {
        BootstrapReport {
            path,
            admin,
            resource,
            credential_created,
            credential_path: self.store.path().to_path_buf(),
            history: self.state.history.clone(),
        }
    }
}
