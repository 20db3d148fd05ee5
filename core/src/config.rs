//! Layered configuration: overrides, environment, properties file, defaults.
//!
//! # Design
//! `ConfigSources` is built once at process start and holds a snapshot of all
//! three layers. `ConfigResolver` shares it behind an `Arc` and turns it into
//! immutable `ServiceConfig` values, either for a named service or for the
//! global (service-less) scope. Nothing here touches the network, and
//! resolving never fails; missing required values are reported by
//! `ServiceConfig::validate`.
//!
//! Precedence for every setting, highest first:
//! 1. override `api.<service>.<dotted.property>` (empty = absent)
//! 2. environment `<SERVICE>_API_<PROPERTY>` (empty = absent)
//! 3. properties file `api.<service>.<dotted.property>`
//! 4. built-in default

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::ConfigError;
use crate::properties::PropertySource;

/// Base URI used by the global scope when nothing else sets one.
pub const DEFAULT_GLOBAL_BASE_URI: &str = "http://localhost:8080";

/// Base path used by the global scope when nothing else sets one.
pub const DEFAULT_GLOBAL_BASE_PATH: &str = "/api/v1";

/// Process-level overrides, the highest-precedence layer.
///
/// Only keys starting with `api.` are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    values: HashMap<String, String>,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an override. Keys outside the `api.` namespace are
    /// ignored.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        if key.starts_with("api.") {
            self.values.insert(key, value.into());
        }
        self
    }

    /// Collect `-Dapi.key=value` and `--api.key=value` arguments, skipping
    /// everything else.
    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        args.into_iter().fold(Self::new(), |overrides, arg| {
            let arg = arg.as_ref();
            let Some(pair) = arg.strip_prefix("-D").or_else(|| arg.strip_prefix("--")) else {
                return overrides;
            };
            match pair.split_once('=') {
                Some((key, value)) => overrides.set(key.trim(), value),
                None => overrides,
            }
        })
    }

    /// Layer `other` on top of `self`; its keys win.
    pub fn merge(mut self, other: Overrides) -> Self {
        self.values.extend(other.values);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

/// Snapshot of environment variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: HashMap<String, String>,
}

impl Environment {
    /// Copy the current process environment. Later changes to the process
    /// environment are not observed. Non-UTF-8 variables are skipped.
    pub fn from_process() -> Self {
        std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Environment {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// All configuration layers, loaded once.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    overrides: Overrides,
    environment: Environment,
    properties: PropertySource,
}

impl ConfigSources {
    pub fn new(overrides: Overrides, environment: Environment, properties: PropertySource) -> Self {
        Self {
            overrides,
            environment,
            properties,
        }
    }

    /// Build the sources for the running process: overrides from the
    /// command line, the current environment and the default properties
    /// file.
    pub fn from_process() -> Result<Self, ConfigError> {
        Ok(Self::new(
            Overrides::from_args(std::env::args().skip(1)),
            Environment::from_process(),
            PropertySource::load_default()?,
        ))
    }

    /// Add overrides on top of the ones already present.
    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        self.overrides = self.overrides.merge(overrides);
        self
    }

    /// Replace the properties layer.
    pub fn with_properties(mut self, properties: PropertySource) -> Self {
        self.properties = properties;
        self
    }

    pub fn overrides(&self) -> &Overrides {
        &self.overrides
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn properties(&self) -> &PropertySource {
        &self.properties
    }
}

/// The six resolvable settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Setting {
    BaseUri,
    BasePath,
    BearerToken,
    ApiKey,
    Username,
    Password,
}

impl Setting {
    /// Suffix used in environment variable names.
    pub fn env_name(self) -> &'static str {
        match self {
            Setting::BaseUri => "BASE_URI",
            Setting::BasePath => "BASE_PATH",
            Setting::BearerToken => "BEARER_TOKEN",
            Setting::ApiKey => "API_KEY",
            Setting::Username => "USERNAME",
            Setting::Password => "PASSWORD",
        }
    }

    /// Dotted form used in override and properties keys.
    pub fn dotted_name(self) -> &'static str {
        match self {
            Setting::BaseUri => "base.uri",
            Setting::BasePath => "base.path",
            Setting::BearerToken => "bearer.token",
            Setting::ApiKey => "api.key",
            Setting::Username => "username",
            Setting::Password => "password",
        }
    }
}

/// Which key family a configuration was resolved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Global,
    Service(String),
}

impl Scope {
    /// `api.base.uri` or `api.account.base.uri`.
    pub fn property_key(&self, setting: Setting) -> String {
        match self {
            Scope::Global => format!("api.{}", setting.dotted_name()),
            Scope::Service(name) => format!("api.{}.{}", name.to_lowercase(), setting.dotted_name()),
        }
    }

    /// `API_BASE_URI` or `ACCOUNT_API_BASE_URI`.
    pub fn env_var(&self, setting: Setting) -> String {
        match self {
            Scope::Global => format!("API_{}", setting.env_name()),
            Scope::Service(name) => format!("{}_API_{}", normalize_service_name(name), setting.env_name()),
        }
    }

    /// Older files spell the API key as `api.<service>.key`.
    fn legacy_property_key(&self, setting: Setting) -> Option<String> {
        match (self, setting) {
            (Scope::Service(name), Setting::ApiKey) => Some(format!("api.{}.key", name.to_lowercase())),
            _ => None,
        }
    }

    fn default_value(&self, setting: Setting) -> Option<&'static str> {
        match (self, setting) {
            (Scope::Global, Setting::BaseUri) => Some(DEFAULT_GLOBAL_BASE_URI),
            (Scope::Global, Setting::BasePath) => Some(DEFAULT_GLOBAL_BASE_PATH),
            (Scope::Service(_), Setting::BasePath) => Some(""),
            _ => None,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Global => write!(f, "global configuration"),
            Scope::Service(name) => write!(f, "service '{name}'"),
        }
    }
}

/// Uppercase the name and map every character outside `[A-Z0-9]` to `_`.
pub fn normalize_service_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            let c = c.to_ascii_uppercase();
            if c.is_ascii_uppercase() || c.is_ascii_digit() {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Effective settings for one scope. Immutable once resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    scope: Scope,
    base_uri: Option<String>,
    base_path: String,
    bearer_token: Option<String>,
    api_key: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

impl ServiceConfig {
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Service name, or `None` for the global scope.
    pub fn service_name(&self) -> Option<&str> {
        match &self.scope {
            Scope::Global => None,
            Scope::Service(name) => Some(name.as_str()),
        }
    }

    pub fn base_uri(&self) -> Option<&str> {
        self.base_uri.as_deref()
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn bearer_token(&self) -> Option<&str> {
        self.bearer_token.as_deref()
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn has_bearer_token(&self) -> bool {
        non_empty(&self.bearer_token)
    }

    pub fn has_api_key(&self) -> bool {
        non_empty(&self.api_key)
    }

    /// Both username and password present and non-empty.
    pub fn has_basic_auth(&self) -> bool {
        non_empty(&self.username) && non_empty(&self.password)
    }

    pub fn has_auth(&self) -> bool {
        self.has_bearer_token() || self.has_api_key() || self.has_basic_auth()
    }

    /// Fails when no non-empty base URI was resolved.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if non_empty(&self.base_uri) {
            return Ok(());
        }
        Err(ConfigError::MissingBaseUri {
            scope: self.scope.to_string(),
            env_var: self.scope.env_var(Setting::BaseUri),
            override_key: self.scope.property_key(Setting::BaseUri),
        })
    }
}

fn non_empty(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}

/// Resolves `ServiceConfig` values from shared `ConfigSources`.
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    sources: Arc<ConfigSources>,
}

impl ConfigResolver {
    pub fn new(sources: Arc<ConfigSources>) -> Self {
        Self { sources }
    }

    pub fn sources(&self) -> &ConfigSources {
        &self.sources
    }

    /// Resolve the settings of one named service.
    pub fn resolve(&self, service_name: &str) -> ServiceConfig {
        self.resolve_scope(Scope::Service(service_name.to_string()))
    }

    /// Resolve the service-less settings (`API_BASE_URI`, `api.base.uri`, ...).
    pub fn resolve_global(&self) -> ServiceConfig {
        self.resolve_scope(Scope::Global)
    }

    fn resolve_scope(&self, scope: Scope) -> ServiceConfig {
        let config = ServiceConfig {
            base_uri: self.lookup(&scope, Setting::BaseUri),
            base_path: self.lookup(&scope, Setting::BasePath).unwrap_or_default(),
            bearer_token: self.lookup(&scope, Setting::BearerToken),
            api_key: self.lookup(&scope, Setting::ApiKey),
            username: self.lookup(&scope, Setting::Username),
            password: self.lookup(&scope, Setting::Password),
            scope,
        };
        tracing::debug!(
            scope = %config.scope,
            base_uri = config.base_uri.as_deref().unwrap_or("<unset>"),
            base_path = %config.base_path,
            bearer = config.has_bearer_token(),
            api_key = config.has_api_key(),
            basic = config.has_basic_auth(),
            "resolved configuration"
        );
        config
    }

    fn lookup(&self, scope: &Scope, setting: Setting) -> Option<String> {
        let key = scope.property_key(setting);
        if let Some(value) = self.sources.overrides.get(&key).filter(|v| !v.is_empty()) {
            return Some(value.to_string());
        }
        let env_var = scope.env_var(setting);
        if let Some(value) = self.sources.environment.get(&env_var).filter(|v| !v.is_empty()) {
            return Some(value.to_string());
        }
        let properties = &self.sources.properties;
        if let Some(value) = properties.get(&key) {
            return Some(value.to_string());
        }
        if let Some(value) = scope.legacy_property_key(setting).and_then(|k| properties.get(&k)) {
            return Some(value.to_string());
        }
        scope.default_value(setting).map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(overrides: Overrides, env: &[(&str, &str)], file: &str) -> ConfigResolver {
        let sources = ConfigSources::new(
            overrides,
            env.iter().copied().collect(),
            PropertySource::parse(file),
        );
        ConfigResolver::new(Arc::new(sources))
    }

    #[test]
    fn normalizes_service_names() {
        assert_eq!(normalize_service_name("account"), "ACCOUNT");
        assert_eq!(normalize_service_name("user-profile.v2"), "USER_PROFILE_V2");
    }

    #[test]
    fn key_shapes_per_scope() {
        let svc = Scope::Service("Account".to_string());
        assert_eq!(svc.property_key(Setting::BaseUri), "api.account.base.uri");
        assert_eq!(svc.property_key(Setting::ApiKey), "api.account.api.key");
        assert_eq!(svc.env_var(Setting::ApiKey), "ACCOUNT_API_API_KEY");
        assert_eq!(Scope::Global.property_key(Setting::BearerToken), "api.bearer.token");
        assert_eq!(Scope::Global.env_var(Setting::Password), "API_PASSWORD");
    }

    #[test]
    fn unconfigured_service_fails_validation() {
        for name in ["account", "payment", "user-profile"] {
            let config = resolver(Overrides::new(), &[], "").resolve(name);
            assert!(config.base_uri().is_none());
            assert_eq!(config.base_path(), "");
            assert!(!config.has_auth());
            assert!(matches!(config.validate(), Err(ConfigError::MissingBaseUri { .. })));
        }
    }

    #[test]
    fn validation_message_names_env_var_and_override_key() {
        let err = resolver(Overrides::new(), &[], "").resolve("account").validate().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("ACCOUNT_API_BASE_URI"), "{msg}");
        assert!(msg.contains("api.account.base.uri"), "{msg}");
    }

    #[test]
    fn precedence_peels_off_one_layer_at_a_time() {
        let file = "api.account.base.uri=https://file.test\n";
        let env = [("ACCOUNT_API_BASE_URI", "https://env.test")];
        let overrides = Overrides::new().set("api.account.base.uri", "https://override.test");

        let all = resolver(overrides, &env, file).resolve("account");
        assert_eq!(all.base_uri(), Some("https://override.test"));

        let no_override = resolver(Overrides::new(), &env, file).resolve("account");
        assert_eq!(no_override.base_uri(), Some("https://env.test"));

        let file_only = resolver(Overrides::new(), &[], file).resolve("account");
        assert_eq!(file_only.base_uri(), Some("https://file.test"));

        let nothing = resolver(Overrides::new(), &[], "").resolve("account");
        assert_eq!(nothing.base_uri(), None);
    }

    #[test]
    fn empty_override_and_env_fall_through() {
        let file = "api.account.bearer.token=from-file\n";
        let env = [("ACCOUNT_API_BEARER_TOKEN", "")];
        let overrides = Overrides::new().set("api.account.bearer.token", "");
        let config = resolver(overrides, &env, file).resolve("account");
        assert_eq!(config.bearer_token(), Some("from-file"));
    }

    #[test]
    fn env_only_scenario() {
        let config = resolver(Overrides::new(), &[("ACCOUNT_API_BASE_URI", "https://x.test")], "")
            .resolve("account");
        assert_eq!(config.base_uri(), Some("https://x.test"));
        assert_eq!(config.base_path(), "");
        assert!(!config.has_auth());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn bearer_presence_requires_non_empty_value() {
        let empty = resolver(Overrides::new(), &[], "api.account.bearer.token=\n").resolve("account");
        assert_eq!(empty.bearer_token(), Some(""));
        assert!(!empty.has_bearer_token());

        let absent = resolver(Overrides::new(), &[], "").resolve("account");
        assert!(!absent.has_bearer_token());

        let set = resolver(Overrides::new(), &[("ACCOUNT_API_BEARER_TOKEN", "t")], "").resolve("account");
        assert!(set.has_bearer_token());
        assert!(set.has_auth());
    }

    #[test]
    fn basic_auth_needs_both_halves() {
        let user_only = resolver(Overrides::new(), &[("ACCOUNT_API_USERNAME", "alice")], "").resolve("account");
        assert!(!user_only.has_basic_auth());
        assert!(!user_only.has_auth());

        let both = resolver(
            Overrides::new(),
            &[("ACCOUNT_API_USERNAME", "alice"), ("ACCOUNT_API_PASSWORD", "secret")],
            "",
        )
        .resolve("account");
        assert!(both.has_basic_auth());
        assert!(both.has_auth());
    }

    #[test]
    fn api_key_counts_as_auth_and_accepts_legacy_file_key() {
        let legacy = resolver(Overrides::new(), &[], "api.account.key=k1\n").resolve("account");
        assert_eq!(legacy.api_key(), Some("k1"));
        assert!(legacy.has_api_key());
        assert!(legacy.has_auth());

        let both = resolver(Overrides::new(), &[], "api.account.key=old\napi.account.api.key=new\n")
            .resolve("account");
        assert_eq!(both.api_key(), Some("new"));
    }

    #[test]
    fn services_do_not_see_each_other() {
        let r = resolver(Overrides::new(), &[("PAYMENT_API_BASE_URI", "https://pay.test")], "");
        assert!(r.resolve("account").base_uri().is_none());
        assert_eq!(r.resolve("payment").base_uri(), Some("https://pay.test"));
    }

    #[test]
    fn global_scope_has_defaults() {
        let config = resolver(Overrides::new(), &[], "").resolve_global();
        assert_eq!(config.service_name(), None);
        assert_eq!(config.base_uri(), Some(DEFAULT_GLOBAL_BASE_URI));
        assert_eq!(config.base_path(), DEFAULT_GLOBAL_BASE_PATH);
        assert!(!config.has_auth());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn global_scope_uses_unprefixed_keys() {
        let r = resolver(
            Overrides::new().set("api.base.path", "/v2"),
            &[("API_BASE_URI", "https://env.test"), ("API_BEARER_TOKEN", "tok")],
            "api.base.uri=https://file.test\napi.base.path=/file\n",
        );
        let config = r.resolve_global();
        assert_eq!(config.base_uri(), Some("https://env.test"));
        assert_eq!(config.base_path(), "/v2");
        assert!(config.has_bearer_token());
        // Service scope shares the same sources but not the keys.
        assert!(r.resolve("account").base_uri().is_none());
    }

    #[test]
    fn empty_global_base_uri_fails_validation() {
        let config = resolver(Overrides::new(), &[], "api.base.uri=\n").resolve_global();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("API_BASE_URI"));
    }

    #[test]
    fn from_process_snapshots_the_real_environment() {
        let sources = ConfigSources::from_process().unwrap();
        assert_eq!(
            sources.environment().get("PATH"),
            std::env::var("PATH").ok().as_deref()
        );
    }

    #[test]
    fn later_overrides_win_on_merge() {
        let sources = ConfigSources::new(
            Overrides::new().set("api.a.base.uri", "http://one").set("api.a.username", "u"),
            Environment::default(),
            PropertySource::parse("api.a.base.path=/file"),
        )
        .with_overrides(Overrides::new().set("api.a.base.uri", "http://two"))
        .with_properties(PropertySource::parse("api.a.base.path=/other"));

        let config = ConfigResolver::new(Arc::new(sources)).resolve("a");
        assert_eq!(config.base_uri(), Some("http://two"));
        assert_eq!(config.username(), Some("u"));
        assert_eq!(config.base_path(), "/other");
    }

    #[test]
    fn overrides_from_args_keep_only_api_keys() {
        let overrides = Overrides::from_args([
            "-Dapi.account.base.uri=https://a.test",
            "--api.account.username=bob",
            "-Dother.key=x",
            "--verbose",
            "positional",
        ]);
        assert_eq!(overrides.get("api.account.base.uri"), Some("https://a.test"));
        assert_eq!(overrides.get("api.account.username"), Some("bob"));
        assert_eq!(overrides.get("other.key"), None);
        assert_eq!(overrides.get("verbose"), None);
    }
}
