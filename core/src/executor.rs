//! Generic request executor bound to one base URI, base path and auth scheme.
//!
//! # Design
//! `RequestExecutor` keeps the build/execute split explicit: `build_request`
//! turns a `RequestSpec` into an `HttpRequest` without touching the network,
//! and `execute` is the single dispatch path that sends it, records the
//! response in the `LastResponseStore` and returns it. Every convenience
//! method funnels into `execute`, so logging and storage behave the same no
//! matter which one the caller picks.
//!
//! The auth binding is fixed at construction. Changing credentials means
//! building a new executor.

use std::collections::BTreeMap;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::Serialize;
use url::Url;

use crate::config::ServiceConfig;
use crate::error::{ConfigError, HarnessError};
use crate::http::{HttpMethod, HttpRequest};
use crate::response::ResponseRecord;
use crate::store::LastResponseStore;
use crate::transport::{Transport, UreqTransport};

pub const API_KEY_HEADER: &str = "X-Api-Key";
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Authentication attached to every request of an executor.
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    None,
    Bearer(String),
    /// Sent on the first request, without waiting for a challenge.
    Basic { username: String, password: String },
}

impl Auth {
    /// Bearer wins when a non-empty token is given; otherwise basic auth when
    /// both halves are non-empty; otherwise no auth.
    pub fn select(bearer_token: Option<&str>, username: Option<&str>, password: Option<&str>) -> Self {
        match (bearer_token, username, password) {
            (Some(token), _, _) if !token.is_empty() => Auth::Bearer(token.to_string()),
            (_, Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => Auth::Basic {
                username: user.to_string(),
                password: pass.to_string(),
            },
            _ => Auth::None,
        }
    }

    /// Value for the `Authorization` header, if any.
    pub fn header_value(&self) -> Option<String> {
        match self {
            Auth::None => None,
            Auth::Bearer(token) => Some(format!("Bearer {token}")),
            Auth::Basic { username, password } => {
                Some(format!("Basic {}", STANDARD.encode(format!("{username}:{password}"))))
            }
        }
    }
}

// Credentials stay out of logs.
impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Auth::None => write!(f, "None"),
            Auth::Bearer(_) => write!(f, "Bearer(***)"),
            Auth::Basic { username, .. } => write!(f, "Basic({username}:***)"),
        }
    }
}

/// Where requests go and how they authenticate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    base_uri: String,
    base_path: String,
    auth: Auth,
    api_key: Option<String>,
}

impl Binding {
    pub fn new(base_uri: &str, base_path: &str, auth: Auth) -> Self {
        Self {
            base_uri: base_uri.trim_end_matches('/').to_string(),
            base_path: base_path.to_string(),
            auth,
            api_key: None,
        }
    }

    /// Send `X-Api-Key: <key>` with every request. Empty keys are ignored.
    pub fn with_api_key(mut self, key: &str) -> Self {
        self.api_key = Some(key.to_string()).filter(|k| !k.is_empty());
        self
    }

    /// Validate `config` and derive the binding from it.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let auth = Auth::select(config.bearer_token(), config.username(), config.password());
        let binding = Self::new(config.base_uri().unwrap_or_default(), config.base_path(), auth);
        Ok(match config.api_key() {
            Some(key) => binding.with_api_key(key),
            None => binding,
        })
    }

    pub fn base_uri(&self) -> &str {
        &self.base_uri
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn auth(&self) -> &Auth {
        &self.auth
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }
}

/// One call to make: verb, resource template, parameters and payload.
///
/// `method` is kept as text and parsed at execute time so that an
/// unsupported verb is reported as `InvalidMethod` before any I/O.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestSpec {
    pub method: String,
    pub resource: String,
    pub headers: BTreeMap<String, String>,
    pub query_params: BTreeMap<String, String>,
    pub path_params: BTreeMap<String, String>,
    pub body: Option<String>,
}

impl RequestSpec {
    pub fn new(method: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            resource: resource.into(),
            ..Self::default()
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn headers(mut self, headers: &[(&str, &str)]) -> Self {
        self.headers
            .extend(headers.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.insert(name.into(), value.into());
        self
    }

    pub fn query_params(mut self, params: &[(&str, &str)]) -> Self {
        self.query_params
            .extend(params.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        self
    }

    pub fn path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_params.insert(name.into(), value.into());
        self
    }

    pub fn path_params(mut self, params: &[(&str, &str)]) -> Self {
        self.path_params
            .extend(params.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        self
    }

    /// Raw body, sent as-is.
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize `body` to JSON.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, HarnessError> {
        self.body = Some(serde_json::to_string(body)?);
        Ok(self)
    }
}

/// Sends `RequestSpec`s against a fixed `Binding`.
#[derive(Debug)]
pub struct RequestExecutor<T: Transport = UreqTransport> {
    binding: Binding,
    transport: T,
    store: Arc<LastResponseStore>,
}

impl RequestExecutor<UreqTransport> {
    pub fn new(binding: Binding, store: Arc<LastResponseStore>) -> Self {
        Self::with_transport(binding, UreqTransport::new(), store)
    }

    /// Executor for a resolved service; fails when it has no base URI.
    pub fn from_config(config: &ServiceConfig, store: Arc<LastResponseStore>) -> Result<Self, ConfigError> {
        let binding = Binding::from_config(config)?;
        tracing::info!(
            scope = %config.scope(),
            base_uri = binding.base_uri(),
            auth = ?binding.auth(),
            "request executor ready"
        );
        Ok(Self::new(binding, store))
    }
}

impl<T: Transport> RequestExecutor<T> {
    pub fn with_transport(binding: Binding, transport: T, store: Arc<LastResponseStore>) -> Self {
        Self {
            binding,
            transport,
            store,
        }
    }

    pub fn binding(&self) -> &Binding {
        &self.binding
    }

    pub fn store(&self) -> &Arc<LastResponseStore> {
        &self.store
    }

    /// Shortcut for `self.store().get()`.
    pub fn last_response(&self) -> Option<Arc<ResponseRecord>> {
        self.store.get()
    }

    /// Turn `spec` into a wire-ready request without sending it.
    pub fn build_request(&self, spec: &RequestSpec) -> Result<HttpRequest, HarnessError> {
        let method: HttpMethod = spec.method.parse()?;
        let url = self.build_url(spec)?;

        let mut headers: Vec<(String, String)> = Vec::new();
        if let Some(value) = self.binding.auth.header_value() {
            headers.push(("Authorization".to_string(), value));
        }
        if let Some(key) = &self.binding.api_key {
            headers.push((API_KEY_HEADER.to_string(), key.clone()));
        }
        // Caller headers replace binding defaults of the same name.
        for (name, value) in &spec.headers {
            headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
            headers.push((name.clone(), value.clone()));
        }
        if spec.body.is_some() && !headers.iter().any(|(k, _)| k.eq_ignore_ascii_case("content-type")) {
            headers.push(("Content-Type".to_string(), JSON_CONTENT_TYPE.to_string()));
        }

        Ok(HttpRequest {
            method,
            url,
            headers,
            body: spec.body.clone(),
        })
    }

    /// Send one request and record its response. 4xx/5xx are returned as
    /// records; only transport failures are errors.
    pub fn execute(&self, spec: RequestSpec) -> Result<ResponseRecord, HarnessError> {
        let request = self.build_request(&spec).inspect_err(|e| {
            tracing::debug!(method = %spec.method, resource = %spec.resource, error = %e, "request rejected before dispatch");
        })?;
        tracing::debug!(method = %request.method, url = %request.url, "dispatching request");

        let response = self.transport.send(&request)?;
        let record = ResponseRecord::new(request.method, request.url, response);
        self.store.set(Arc::new(record.clone()));

        tracing::info!(
            method = %record.method(),
            resource = %spec.resource,
            status = record.status(),
            "request completed"
        );
        Ok(record)
    }

    /// No headers, no parameters, no body.
    pub fn call(&self, method: HttpMethod, resource: &str) -> Result<ResponseRecord, HarnessError> {
        self.execute(RequestSpec::new(method.as_str(), resource))
    }

    pub fn call_with_headers(
        &self,
        method: HttpMethod,
        headers: &[(&str, &str)],
        resource: &str,
    ) -> Result<ResponseRecord, HarnessError> {
        self.execute(RequestSpec::new(method.as_str(), resource).headers(headers))
    }

    pub fn call_with_query(
        &self,
        method: HttpMethod,
        headers: &[(&str, &str)],
        query_params: &[(&str, &str)],
        resource: &str,
    ) -> Result<ResponseRecord, HarnessError> {
        self.execute(
            RequestSpec::new(method.as_str(), resource)
                .headers(headers)
                .query_params(query_params),
        )
    }

    pub fn call_with_path_params(
        &self,
        method: HttpMethod,
        headers: &[(&str, &str)],
        resource: &str,
        path_params: &[(&str, &str)],
    ) -> Result<ResponseRecord, HarnessError> {
        self.execute(
            RequestSpec::new(method.as_str(), resource)
                .headers(headers)
                .path_params(path_params),
        )
    }

    /// JSON body, default headers.
    pub fn send_json<B: Serialize + ?Sized>(
        &self,
        method: HttpMethod,
        resource: &str,
        body: &B,
    ) -> Result<ResponseRecord, HarnessError> {
        self.execute(RequestSpec::new(method.as_str(), resource).json(body)?)
    }

    pub fn send_json_with_headers<B: Serialize + ?Sized>(
        &self,
        method: HttpMethod,
        headers: &[(&str, &str)],
        resource: &str,
        body: &B,
    ) -> Result<ResponseRecord, HarnessError> {
        self.execute(RequestSpec::new(method.as_str(), resource).headers(headers).json(body)?)
    }

    pub fn send_json_with_path_params<B: Serialize + ?Sized>(
        &self,
        method: HttpMethod,
        headers: &[(&str, &str)],
        resource: &str,
        path_params: &[(&str, &str)],
        body: &B,
    ) -> Result<ResponseRecord, HarnessError> {
        self.execute(
            RequestSpec::new(method.as_str(), resource)
                .headers(headers)
                .path_params(path_params)
                .json(body)?,
        )
    }

    /// `base_uri + base_path + resource` with placeholders filled in and
    /// query parameters appended.
    ///
    /// The literal text of the base path and resource is kept as written,
    /// including a trailing slash and any escapes already present. Only the
    /// substituted path values are percent-encoded. Query pairs already on
    /// the base URI come first, then the resource's inline query, then
    /// `query_params`.
    fn build_url(&self, spec: &RequestSpec) -> Result<String, HarnessError> {
        let invalid = |source| HarnessError::InvalidUrl {
            url: format!("{}{}{}", self.binding.base_uri, self.binding.base_path, spec.resource),
            source,
        };
        let mut url = Url::parse(&self.binding.base_uri).map_err(invalid)?;
        if url.cannot_be_a_base() {
            return Err(invalid(url::ParseError::RelativeUrlWithCannotBeABaseBase));
        }

        let (template, inline_query) = match spec.resource.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (spec.resource.as_str(), None),
        };
        let resource_path = substitute(template, &spec.path_params, &spec.resource)?;

        let mut path = url.path().trim_end_matches('/').to_string();
        join_path(&mut path, &self.binding.base_path);
        join_path(&mut path, &resource_path);
        url.set_path(&path);

        if let Some(inline) = inline_query.filter(|q| !q.is_empty()) {
            let merged = match url.query().filter(|q| !q.is_empty()) {
                Some(existing) => format!("{existing}&{inline}"),
                None => inline.to_string(),
            };
            url.set_query(Some(&merged));
        }
        if !spec.query_params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in &spec.query_params {
                pairs.append_pair(name, value);
            }
        }
        Ok(url.into())
    }
}

/// Characters escaped in a substituted path value. `/` is included so one
/// value always stays one segment.
const PATH_VALUE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Append `part` to `path` with exactly one `/` between them. A trailing
/// slash on `part` survives.
fn join_path(path: &mut String, part: &str) {
    let trimmed = part.trim_start_matches('/');
    if !path.ends_with('/') && !part.is_empty() {
        path.push('/');
    }
    path.push_str(trimmed);
}

/// Replace every `{name}` in the resource template with its encoded value.
fn substitute(template: &str, params: &BTreeMap<String, String>, resource: &str) -> Result<String, HarnessError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}').map(|i| open + i) else {
            break;
        };
        let name = &rest[open + 1..close];
        let value = params.get(name).ok_or_else(|| HarnessError::MissingPathParam {
            name: name.to_string(),
            resource: resource.to_string(),
        })?;
        out.push_str(&rest[..open]);
        out.extend(utf8_percent_encode(value, PATH_VALUE));
        rest = &rest[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
