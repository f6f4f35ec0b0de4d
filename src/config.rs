//! Store configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{StoreError, StoreResult, ValidationError};
use crate::layout::SITE_DIR;
use crate::util::paths::strip_comments;

/// Configuration for opening a site.
///
/// Missing fields in a JSON configuration file take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory that contains (or will contain) `annalist_site/`.
    pub base_data_dir: PathBuf,
    /// URL path at which the site is mounted, with a trailing slash.
    pub site_base_url: String,
    /// Host name used when building absolute URIs (empty for path-only URLs).
    pub host: String,
    /// Hold an exclusive advisory lock on the site directory while open.
    pub lock_site: bool,
    /// Upper bound on candidates tried when allocating a fresh entity id.
    pub max_id_attempts: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_data_dir: PathBuf::from("."),
            site_base_url: "/annalist/".to_string(),
            host: String::new(),
            lock_site: false,
            max_id_attempts: 100_000,
        }
    }
}

impl StoreConfig {
    const MIN_ID_ATTEMPTS: u32 = 1;

    /// Creates a default configuration rooted at `base_data_dir`.
    #[must_use]
    pub fn new(base_data_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_data_dir: base_data_dir.into(),
            ..Self::default()
        }
    }

    /// Sets the URL path at which the site is mounted.
    #[must_use]
    pub fn with_site_base_url(mut self, url: impl Into<String>) -> Self {
        self.site_base_url = url.into();
        self
    }

    /// Sets the host name.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Enables or disables the site lock.
    #[must_use]
    pub fn with_lock_site(mut self, lock_site: bool) -> Self {
        self.lock_site = lock_site;
        self
    }

    /// Sets the id allocation limit.
    #[must_use]
    pub fn with_max_id_attempts(mut self, max_id_attempts: u32) -> Self {
        self.max_id_attempts = max_id_attempts;
        self
    }

    /// Reads a configuration from a JSON file (`//` comment lines allowed).
    pub fn from_json_file(path: impl AsRef<Path>) -> StoreResult<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&strip_comments(&text))?;
        config.validate()
    }

    /// Checks the configuration, normalizing the base URL to end with `/`.
    ///
    /// # Errors
    /// `InvalidValue` for an empty data directory, a base URL not starting
    /// with `/`, or a zero allocation limit.
    pub fn validate(mut self) -> StoreResult<Self> {
        if self.base_data_dir.as_os_str().is_empty() {
            return Err(invalid("base_data_dir", "must not be empty".to_string()));
        }
        if !self.site_base_url.starts_with('/') {
            return Err(invalid(
                "site_base_url",
                format!("must be an absolute path (got '{}')", self.site_base_url),
            ));
        }
        if !self.site_base_url.ends_with('/') {
            self.site_base_url.push('/');
        }
        if self.max_id_attempts < Self::MIN_ID_ATTEMPTS {
            return Err(invalid(
                "max_id_attempts",
                format!(
                    "must be at least {} (got {})",
                    Self::MIN_ID_ATTEMPTS,
                    self.max_id_attempts
                ),
            ));
        }
        if self.lock_site && !cfg!(feature = "site-lock") {
            return Err(invalid(
                "lock_site",
                "site locking requires the `site-lock` feature".to_string(),
            ));
        }
        Ok(self)
    }

    /// Returns the site directory (`<base_data_dir>/annalist_site`).
    #[must_use]
    pub fn site_dir(&self) -> PathBuf {
        self.base_data_dir.join(SITE_DIR)
    }

    /// Returns the site URL, prefixed with `http://<host>` when a host is set.
    #[must_use]
    pub fn site_url(&self) -> String {
        if self.host.is_empty() {
            self.site_base_url.clone()
        } else {
            format!("http://{}{}", self.host, self.site_base_url)
        }
    }
}

fn invalid(field: &str, reason: String) -> StoreError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        reason,
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_validate() {
        let config = StoreConfig::default().validate().unwrap();
        assert_eq!(config.site_base_url, "/annalist/");
        assert_eq!(config.site_dir(), PathBuf::from("./annalist_site"));
        assert_eq!(config.site_url(), "/annalist/");
    }

    #[test]
    fn test_base_url_normalized() {
        let config = StoreConfig::new("/data")
            .with_site_base_url("/notes")
            .with_host("example.org:8000")
            .validate()
            .unwrap();
        assert_eq!(config.site_base_url, "/notes/");
        assert_eq!(config.site_url(), "http://example.org:8000/notes/");
    }

    #[test]
    fn test_rejects_bad_values() {
        let err = StoreConfig::new("/data").with_site_base_url("notes/").validate().unwrap_err();
        assert!(matches!(
            err,
            StoreError::Validation(ValidationError::InvalidValue { ref field, .. }) if field == "site_base_url"
        ));
        let err = StoreConfig::new("/data").with_max_id_attempts(0).validate().unwrap_err();
        assert!(err.is_validation());
        assert!(StoreConfig::new("").validate().is_err());
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(
            &path,
            "// local settings\n{\"base_data_dir\": \"/srv/notes\", \"max_id_attempts\": 50}\n",
        )
        .unwrap();
        let config = StoreConfig::from_json_file(&path).unwrap();
        assert_eq!(config.base_data_dir, PathBuf::from("/srv/notes"));
        assert_eq!(config.max_id_attempts, 50);
        assert_eq!(config.site_base_url, "/annalist/");
    }
}
