//! Request/response types and the transport seam.
//!
//! The bootstrap only needs a handful of small JSON and form exchanges, so
//! requests are plain values. [`HttpTransport`] is the single point where
//! bytes hit the network; tests swap it for a scripted implementation.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use svcinit_shared::errors::{InitError, InitResult};

const CONTENT_TYPE_JSON: &str = "application/json";
const CONTENT_TYPE_FORM: &str = "application/x-www-form-urlencoded";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outgoing request.
///
/// `Debug` omits the body and header values: bodies carry the admin secret
/// and the `Authorization` header carries the session token.
#[derive(Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<RequestBody>,
}

#[derive(Clone)]
pub struct RequestBody {
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Attach a JSON body.
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> InitResult<Self> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| InitError::Internal(format!("encode request body: {}", e)))?;
        self.body = Some(RequestBody {
            content_type: CONTENT_TYPE_JSON,
            bytes,
        });
        Ok(self)
    }

    /// Attach an `application/x-www-form-urlencoded` body.
    pub fn form(mut self, fields: &[(&str, &str)]) -> Self {
        let encoded = fields
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        self.body = Some(RequestBody {
            content_type: CONTENT_TYPE_FORM,
            bytes: encoded.into_bytes(),
        });
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn bearer(self, token: &str) -> Self {
        self.header("Authorization", format!("Bearer {}", token))
    }

    pub fn content_type(&self) -> Option<&'static str> {
        self.body.as_ref().map(|b| b.content_type)
    }

    pub fn body_bytes(&self) -> &[u8] {
        self.body.as_ref().map(|b| b.bytes.as_slice()).unwrap_or_default()
    }
}

impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header_names: Vec<&str> = self.headers.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("HttpRequest")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &header_names)
            .field("content_type", &self.content_type())
            .field("body_len", &self.body_bytes().len())
            .finish()
    }
}

/// A received response. Any status is a successful transport outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as text, lossily decoded, for diagnostics.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decode a JSON body; failures are attributed to `step`.
    pub fn json<T: DeserializeOwned>(&self, step: &'static str) -> InitResult<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| InitError::invalid_response(step, format!("malformed JSON: {}", e)))
    }
}

/// Sends a single request.
///
/// Implementations return `Ok` for every HTTP status and
/// [`InitError::TransientNetwork`] when no status was received.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: &HttpRequest) -> InitResult<HttpResponse>;
}

/// Production transport backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a client whose every request is bounded by `request_timeout`.
    pub fn new(request_timeout: Duration) -> InitResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(request_timeout)
            .build()
            .map_err(|e| InitError::Internal(format!("build HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: &HttpRequest) -> InitResult<HttpResponse> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, body.content_type)
                .body(body.bytes.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| InitError::TransientNetwork(describe(&e)))?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| InitError::TransientNetwork(describe(&e)))?;

        Ok(HttpResponse::new(status, body.to_vec()))
    }
}

fn describe(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("timed out: {}", err)
    } else if err.is_connect() {
        format!("connection failed: {}", err)
    } else {
        err.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_body_is_url_encoded() {
        let request = HttpRequest::post("http://localhost/api/endpoints")
            .form(&[("Name", "local"), ("EndpointCreationType", "1"), ("Note", "a b&c")]);

        assert_eq!(request.content_type(), Some(CONTENT_TYPE_FORM));
        assert_eq!(
            String::from_utf8_lossy(request.body_bytes()),
            "Name=local&EndpointCreationType=1&Note=a%20b%26c"
        );
    }

    #[test]
    fn test_json_body() {
        let request = HttpRequest::post("http://localhost/api/auth")
            .json(&serde_json::json!({"username": "admin"}))
            .unwrap();

        assert_eq!(request.content_type(), Some(CONTENT_TYPE_JSON));
        assert_eq!(request.body_bytes(), br#"{"username":"admin"}"#);
    }

    #[test]
    fn test_debug_hides_body_and_header_values() {
        let request = HttpRequest::post("http://localhost/api/auth")
            .bearer("very-secret-token")
            .json(&serde_json::json!({"password": "hunter2-hunter2"}))
            .unwrap();

        let debug = format!("{:?}", request);
        assert!(debug.contains("Authorization"));
        assert!(!debug.contains("very-secret-token"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_response_helpers() {
        let response = HttpResponse::new(200, br#"{"jwt":"abc"}"#.to_vec());
        assert!(response.is_success());

        let value: serde_json::Value = response.json("auth").unwrap();
        assert_eq!(value["jwt"], "abc");

        let broken = HttpResponse::new(200, b"not json".to_vec());
        let err = broken.json::<serde_json::Value>("auth").unwrap_err();
        assert!(matches!(err, InitError::InvalidResponse { step: "auth", .. }));

        assert!(!HttpResponse::new(409, Vec::new()).is_success());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transient() {
        let transport = ReqwestTransport::new(Duration::from_secs(2)).unwrap();
        // Port 1 on loopback refuses connections
        let err = transport
            .execute(&HttpRequest::get("http://127.0.0.1:1/api/system/status"))
            .await
            .unwrap_err();

        assert!(matches!(err, InitError::TransientNetwork(_)));
    }
}
