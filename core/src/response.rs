//! Inspectable result of one executed request.

use std::borrow::Cow;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::http::{find_header, HttpMethod, HttpResponse};

/// A completed exchange: the request line that produced it plus the
/// transport response, whatever its status code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseRecord {
    method: HttpMethod,
    url: String,
    raw: HttpResponse,
}

impl ResponseRecord {
    pub fn new(method: HttpMethod, url: impl Into<String>, raw: HttpResponse) -> Self {
        Self {
            method,
            url: url.into(),
            raw,
        }
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn status(&self) -> u16 {
        self.raw.status
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.raw.status)
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.raw.headers
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.raw.headers, name)
    }

    /// Body bytes exactly as received.
    pub fn body(&self) -> &[u8] {
        &self.raw.body
    }

    /// Body decoded as UTF-8, with invalid sequences replaced by U+FFFD.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.raw.body)
    }

    /// The transport response as received.
    pub fn raw(&self) -> &HttpResponse {
        &self.raw
    }

    /// Deserialize the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.raw.body)
    }

    /// Value at a dotted path such as `data.items.0.id`, rendered as a
    /// string. Numeric segments index into arrays. `None` when the body is
    /// not JSON or the path does not exist.
    pub fn json_path(&self, path: &str) -> Option<String> {
        let root: Value = serde_json::from_slice(&self.raw.body).ok()?;
        let mut current = &root;
        for segment in path.split('.').filter(|s| !s.is_empty()) {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        match current {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}
