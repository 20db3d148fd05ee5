//! Configurable HTTP request harness for exercising remote services in
//! integration tests.
//!
//! # Overview
//! `ConfigResolver` turns overrides, environment variables and an optional
//! properties file into one `ServiceConfig` per named service (or a global
//! one). `RequestExecutor` binds to a resolved base URI, base path and auth
//! scheme and sends requests described by `RequestSpec`, keeping the latest
//! `ResponseRecord` in a shared `LastResponseStore`.
//!
//! # Design
//! - Configuration is loaded once into an explicit `ConfigSources` value; there
//!   is no hidden global.
//! - The executor splits `build_request` (pure) from `execute` (I/O through a
//!   `Transport`), so request shape can be tested without a network.
//! - HTTP error statuses are data. Only configuration, method, URL,
//!   serialization and transport failures are errors.

pub mod config;
pub mod error;
pub mod executor;
pub mod http;
pub mod properties;
pub mod response;
pub mod store;
pub mod transport;

pub use config::{ConfigResolver, ConfigSources, Environment, Overrides, Scope, ServiceConfig, Setting};
pub use error::{ConfigError, HarnessError};
pub use executor::{Auth, Binding, RequestExecutor, RequestSpec};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use properties::PropertySource;
pub use response::ResponseRecord;
pub use store::LastResponseStore;
pub use transport::{Transport, UreqTransport};
