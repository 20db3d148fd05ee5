//! Error types for configuration resolution and request execution.
//!
//! # Design
//! Configuration problems and request problems are kept in separate enums so
//! that resolving a service never has to mention the transport. HTTP 4xx/5xx
//! responses are not errors here at all; they come back as `ResponseRecord`
//! values and the caller decides what they mean.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No base URI resolved from any source. Carries the names an operator
    /// needs to set to fix it.
    #[error(
        "base URI is required for {scope}; set the {env_var} environment variable or the {override_key} override"
    )]
    MissingBaseUri {
        scope: String,
        env_var: String,
        override_key: String,
    },

    /// The properties file exists but could not be read.
    #[error("failed to read properties file '{path}': {source}")]
    ReadProperties {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors returned by `RequestExecutor`.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// The verb is not one of GET, POST, PUT, PATCH, DELETE. Raised before
    /// any network I/O.
    #[error("invalid HTTP method: {0}")]
    InvalidMethod(String),

    /// The resource template names a `{placeholder}` with no value.
    #[error("no value for path parameter '{name}' in resource '{resource}'")]
    MissingPathParam { name: String, resource: String },

    /// Base URI plus base path plus resource did not form a valid URL.
    #[error("invalid request URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Connection refused, DNS failure, timeout or any other failure below
    /// the HTTP status level.
    #[error("transport error for {method} {url}: {source}")]
    Transport {
        method: String,
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_base_uri_names_both_fixes() {
        let err = ConfigError::MissingBaseUri {
            scope: "service 'account'".to_string(),
            env_var: "ACCOUNT_API_BASE_URI".to_string(),
            override_key: "api.account.base.uri".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("ACCOUNT_API_BASE_URI"));
        assert!(msg.contains("api.account.base.uri"));
    }

    #[test]
    fn config_error_converts_into_harness_error() {
        let err: HarnessError = ConfigError::MissingBaseUri {
            scope: "global configuration".to_string(),
            env_var: "API_BASE_URI".to_string(),
            override_key: "api.base.uri".to_string(),
        }
        .into();
        assert!(matches!(err, HarnessError::Config(ConfigError::MissingBaseUri { .. })));
        assert!(err.to_string().contains("API_BASE_URI"));
    }
}
