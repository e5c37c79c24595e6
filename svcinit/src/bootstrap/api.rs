//! Typed calls against the managed service REST API.
//!
//! Each call maps the service's status codes to an outcome; anything the
//! step does not expect becomes [`InitError::UnexpectedStatus`] carrying the
//! response body.

use serde::{Deserialize, Serialize};
use svcinit_shared::errors::{InitError, InitResult};

use super::types::{AdminCheck, EndpointSummary, ProvisionOutcome, ResourceSpec, SessionToken};
use crate::credential::Credential;
use crate::http::{HttpRequest, HttpResponse, RetryClient};
use crate::options::BootstrapOptions;

pub(crate) const STEP_CHECK: &str = "admin check";
const STEP_INIT: &str = "admin init";
const STEP_AUTH: &str = "authenticate";
const STEP_LIST: &str = "list endpoints";
const STEP_CREATE: &str = "create endpoint";

#[derive(Serialize)]
struct CredentialsBody<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct AuthResponse {
    #[serde(default)]
    jwt: String,
}

/// REST client for the handful of endpoints the bootstrap touches.
pub struct ServiceApi {
    client: RetryClient,
    check_url: String,
    init_url: String,
    auth_url: String,
    endpoints_url: String,
}

impl ServiceApi {
    pub fn new(client: RetryClient, options: &BootstrapOptions) -> Self {
        Self {
            client,
            check_url: options.check_url.clone(),
            init_url: options.init_url.clone(),
            auth_url: options.auth_url.clone(),
            endpoints_url: options.endpoints_url.clone(),
        }
    }

    /// `GET /users/admin/check`.
    pub async fn check_admin(&self) -> InitResult<AdminCheck> {
        let response = self.client.send(&HttpRequest::get(&self.check_url)).await?;
        Ok(match response.status {
            204 => AdminCheck::Initialized,
            404 => AdminCheck::Uninitialized,
            other => {
                tracing::warn!(
                    url = %self.check_url,
                    status = other,
                    body = %response.text(),
                    "Admin check was inconclusive"
                );
                AdminCheck::Inconclusive(other)
            }
        })
    }

    /// `POST /users/admin/init`. 409 means the account already exists.
    pub async fn init_admin(&self, credential: &Credential) -> InitResult<ProvisionOutcome> {
        let request = HttpRequest::post(&self.init_url).json(&CredentialsBody {
            username: &credential.username,
            password: credential.secret.expose(),
        })?;

        let response = self.client.send(&request).await?;
        match response.status {
            200 => Ok(ProvisionOutcome::Created),
            409 => Ok(ProvisionOutcome::AlreadyExists),
            _ => Err(unexpected(STEP_INIT, &response)),
        }
    }

    /// `POST /auth`, returning the session token.
    pub async fn authenticate(&self, credential: &Credential) -> InitResult<SessionToken> {
        let request = HttpRequest::post(&self.auth_url).json(&CredentialsBody {
            username: &credential.username,
            password: credential.secret.expose(),
        })?;

        let response = self.client.send(&request).await?;
        if response.status != 200 {
            return Err(unexpected(STEP_AUTH, &response));
        }

        let body: AuthResponse = response.json(STEP_AUTH)?;
        if body.jwt.is_empty() {
            return Err(InitError::invalid_response(STEP_AUTH, "missing jwt"));
        }
        Ok(SessionToken::new(body.jwt))
    }

    /// `GET /endpoints`. An empty or `null` body is an empty inventory.
    pub async fn list_endpoints(&self, token: &SessionToken) -> InitResult<Vec<EndpointSummary>> {
        let request = HttpRequest::get(&self.endpoints_url).bearer(token.expose());
        let response = self.client.send(&request).await?;
        if !response.is_success() {
            return Err(unexpected(STEP_LIST, &response));
        }

        if response.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        let endpoints: Option<Vec<EndpointSummary>> = response.json(STEP_LIST)?;
        Ok(endpoints.unwrap_or_default())
    }

    /// `POST /endpoints` with a form body. 409 means the endpoint exists.
    pub async fn create_endpoint(
        &self,
        token: &SessionToken,
        resource: &ResourceSpec,
    ) -> InitResult<ProvisionOutcome> {
        let creation_type = resource.creation_type.code().to_string();
        let request = HttpRequest::post(&self.endpoints_url)
            .bearer(token.expose())
            .form(&[
                ("Name", resource.name.as_str()),
                ("EndpointCreationType", creation_type.as_str()),
            ]);

        let response = self.client.send(&request).await?;
        match response.status {
            200 | 201 => Ok(ProvisionOutcome::Created),
            409 => Ok(ProvisionOutcome::AlreadyExists),
            _ => Err(unexpected(STEP_CREATE, &response)),
        }
    }
}

fn unexpected(step: &'static str, response: &HttpResponse) -> InitError {
    let body = response.text();
    tracing::error!(step, status = response.status, body = %body, "Managed service rejected request");
    InitError::unexpected_status(step, response.status, body)
}
