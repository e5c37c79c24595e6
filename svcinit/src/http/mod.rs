//! HTTP plumbing for talking to the managed service.

mod retry;
mod transport;

pub use retry::{RetryClient, RetryPolicy};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport, RequestBody};
