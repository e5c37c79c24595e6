use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use svcinit::{HttpRequest, HttpResponse, HttpTransport, Method};
use svcinit_shared::errors::{InitError, InitResult};

/// One scripted reaction to a request.
#[derive(Debug, Clone)]
pub enum Scripted {
    Status(u16, Vec<u8>),
    NetworkError(String),
    /// Never answers.
    Hang,
}

impl Scripted {
    pub fn status(status: u16) -> Self {
        Scripted::Status(status, Vec::new())
    }

    pub fn body(status: u16, body: &str) -> Self {
        Scripted::Status(status, body.as_bytes().to_vec())
    }

    pub fn network_error() -> Self {
        Scripted::NetworkError("connection refused".into())
    }
}

/// A request as the transport saw it.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedCall {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

type Hook = Box<dyn Fn() + Send + Sync>;

struct Route {
    method: Method,
    suffix: String,
    responses: VecDeque<Scripted>,
    hook: Option<Hook>,
}

/// Transport answering from per-route scripts.
///
/// Routes match on method and URL suffix. Each route plays its responses in
/// order and repeats the last one forever. Requests without a route fail
/// with a network error.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<Vec<Route>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(
        &self,
        method: Method,
        suffix: &str,
        responses: impl IntoIterator<Item = Scripted>,
    ) -> &Self {
        self.routes.lock().push(Route {
            method,
            suffix: suffix.to_string(),
            responses: responses.into_iter().collect(),
            hook: None,
        });
        self
    }

    pub fn on_get(&self, suffix: &str, responses: impl IntoIterator<Item = Scripted>) -> &Self {
        self.on(Method::Get, suffix, responses)
    }

    pub fn on_post(&self, suffix: &str, responses: impl IntoIterator<Item = Scripted>) -> &Self {
        self.on(Method::Post, suffix, responses)
    }

    /// Run `hook` every time the route for `method`/`suffix` is hit, before it answers.
    pub fn before(&self, method: Method, suffix: &str, hook: impl Fn() + Send + Sync + 'static) {
        let mut routes = self.routes.lock();
        if let Some(route) = routes
            .iter_mut()
            .find(|r| r.method == method && r.suffix == suffix)
        {
            route.hook = Some(Box::new(hook));
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, method: Method, suffix: &str) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.method == method && c.url.ends_with(suffix))
            .cloned()
            .collect()
    }

    pub fn count(&self, method: Method, suffix: &str) -> usize {
        self.calls_to(method, suffix).len()
    }

    fn next_response(&self, request: &HttpRequest) -> Option<Scripted> {
        let mut routes = self.routes.lock();
        let route = routes
            .iter_mut()
            .find(|r| r.method == request.method && request.url.ends_with(&r.suffix))?;

        if let Some(hook) = &route.hook {
            hook();
        }

        if route.responses.len() > 1 {
            route.responses.pop_front()
        } else {
            route.responses.front().cloned()
        }
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn execute(&self, request: &HttpRequest) -> InitResult<HttpResponse> {
        self.calls.lock().push(RecordedCall {
            method: request.method,
            url: request.url.clone(),
            headers: request.headers.clone(),
            body: request.body_bytes().to_vec(),
        });

        match self.next_response(request) {
            Some(Scripted::Status(status, body)) => Ok(HttpResponse::new(status, body)),
            Some(Scripted::NetworkError(msg)) => Err(InitError::TransientNetwork(msg)),
            Some(Scripted::Hang) => std::future::pending().await,
            None => Err(InitError::TransientNetwork(format!(
                "no scripted response for {} {}",
                request.method, request.url
            ))),
        }
    }
}
