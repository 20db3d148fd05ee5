//! The one place that performs network I/O.
//!
//! `UreqTransport` runs a blocking round trip with status-as-error turned
//! off, so 4xx/5xx come back as data and only failures below HTTP surface as
//! `HarnessError::Transport`. Bodies are read as bytes, never decoded, and
//! header values that are not UTF-8 are kept in lossy form. There is no
//! retry here.

use crate::error::HarnessError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Largest response body read into memory. A longer body fails the request
/// with `HarnessError::Transport`.
pub const MAX_RESPONSE_BODY: u64 = 64 * 1024 * 1024;

/// Sends one request and waits for the full response.
pub trait Transport: Send + Sync {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, HarnessError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, HarnessError> {
        (**self).send(request)
    }
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, HarnessError> {
        (**self).send(request)
    }
}

/// Blocking transport backed by a `ureq::Agent`.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, HarnessError> {
        let url = request.url.as_str();
        let result = match request.method {
            HttpMethod::Get => with_headers(self.agent.get(url), &request.headers).call_or_send(request),
            HttpMethod::Delete => with_headers(self.agent.delete(url), &request.headers).call_or_send(request),
            HttpMethod::Post => with_headers(self.agent.post(url), &request.headers).send_or_empty(request),
            HttpMethod::Put => with_headers(self.agent.put(url), &request.headers).send_or_empty(request),
            HttpMethod::Patch => with_headers(self.agent.patch(url), &request.headers).send_or_empty(request),
        };
        let mut response = result.map_err(|e| transport_error(request, e))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response
            .body_mut()
            .with_config()
            .limit(MAX_RESPONSE_BODY)
            .read_to_vec()
            .map_err(|e| transport_error(request, e))?;

        Ok(HttpResponse { status, headers, body })
    }
}

type UreqResult = Result<ureq::http::Response<ureq::Body>, ureq::Error>;

fn with_headers<B>(mut builder: ureq::RequestBuilder<B>, headers: &[(String, String)]) -> ureq::RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

/// Dispatch for verbs that normally carry no body.
trait CallOrSend {
    fn call_or_send(self, request: &HttpRequest) -> UreqResult;
}

impl CallOrSend for ureq::RequestBuilder<ureq::typestate::WithoutBody> {
    fn call_or_send(self, request: &HttpRequest) -> UreqResult {
        match &request.body {
            Some(body) => self.force_send_body().send(body.as_bytes()),
            None => self.call(),
        }
    }
}

/// Dispatch for verbs that normally carry a body.
trait SendOrEmpty {
    fn send_or_empty(self, request: &HttpRequest) -> UreqResult;
}

impl SendOrEmpty for ureq::RequestBuilder<ureq::typestate::WithBody> {
    fn send_or_empty(self, request: &HttpRequest) -> UreqResult {
        match &request.body {
            Some(body) => self.send(body.as_bytes()),
            None => self.send_empty(),
        }
    }
}

fn transport_error(request: &HttpRequest, source: ureq::Error) -> HarnessError {
    tracing::debug!(method = %request.method, url = %request.url, error = %source, "transport failure");
    HarnessError::Transport {
        method: request.method.to_string(),
        url: request.url.clone(),
        source: Box::new(source),
    }
}
