//! Static `key=value` properties file, the lowest-precedence config layer.
//!
//! # Design
//! The file is read once and kept as an immutable map. A missing file is the
//! normal case on CI machines that configure everything through the
//! environment, so it yields an empty source rather than an error.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Default file name, looked up relative to the working directory.
pub const DEFAULT_PROPERTIES_FILE: &str = "api.properties";

/// Environment variable that points at a different properties file.
pub const PROPERTIES_FILE_ENV: &str = "API_PROPERTIES_FILE";

/// Parsed contents of a properties file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertySource {
    values: HashMap<String, String>,
    origin: Option<PathBuf>,
}

impl PropertySource {
    /// An empty source, as if no file were present.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load `path`. Returns an empty source when the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(content) => {
                let mut source = Self::parse(&content);
                source.origin = Some(path.to_path_buf());
                tracing::debug!(path = %path.display(), keys = source.len(), "loaded properties file");
                Ok(source)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no properties file, using defaults");
                Ok(Self::empty())
            }
            Err(e) => Err(ConfigError::ReadProperties {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }

    /// Load from `$API_PROPERTIES_FILE`, falling back to `api.properties`.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = std::env::var(PROPERTIES_FILE_ENV)
            .ok()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_PROPERTIES_FILE.to_string());
        Self::load(path)
    }

    /// Parse file contents.
    ///
    /// Blank lines and lines starting with `#` or `!` are skipped. The key
    /// ends at the first `=` or `:`; a line with neither is a key with an
    /// empty value. Later duplicates replace earlier ones.
    pub fn parse(content: &str) -> Self {
        let mut values = HashMap::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            let (key, value) = match line.find(['=', ':']) {
                Some(idx) => (&line[..idx], &line[idx + 1..]),
                None => (line, ""),
            };
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            values.insert(key.to_string(), value.trim().to_string());
        }
        Self { values, origin: None }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// File the values came from, if one was read.
    pub fn origin(&self) -> Option<&Path> {
        self.origin.as_deref()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PropertySource {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            origin: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_skips_comments_and_blank_lines() {
        let source = PropertySource::parse(
            "# comment\n\n! also a comment\napi.base.uri=http://example.test\n",
        );
        assert_eq!(source.len(), 1);
        assert_eq!(source.get("api.base.uri"), Some("http://example.test"));
    }

    #[test]
    fn parse_splits_on_first_separator_and_trims() {
        let source = PropertySource::parse(
            "  api.account.base.uri = https://x.test:8443/a=b  \napi.user:alice\n",
        );
        assert_eq!(source.get("api.account.base.uri"), Some("https://x.test:8443/a=b"));
        assert_eq!(source.get("api.user"), Some("alice"));
    }

    #[test]
    fn parse_key_without_separator_has_empty_value() {
        let source = PropertySource::parse("api.base.path\n");
        assert_eq!(source.get("api.base.path"), Some(""));
    }

    #[test]
    fn later_duplicates_win() {
        let source = PropertySource::parse("k=1\nk=2\n");
        assert_eq!(source.get("k"), Some("2"));
    }

    #[test]
    fn missing_file_is_empty_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = PropertySource::load(dir.path().join("absent.properties")).unwrap();
        assert!(source.is_empty());
        assert!(source.origin().is_none());
    }

    #[test]
    fn load_reads_file_and_records_origin() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "api.account.bearer.token=abc").unwrap();
        let source = PropertySource::load(file.path()).unwrap();
        assert_eq!(source.get("api.account.bearer.token"), Some("abc"));
        assert_eq!(source.origin(), Some(file.path()));
    }

    #[test]
    fn directory_path_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = PropertySource::load(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ReadProperties { .. }));
    }
}
