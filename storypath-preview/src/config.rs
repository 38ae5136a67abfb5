//! Gateway configuration.
//!
//! Values come from an optional JSON file and are overridden by command-line
//! flags or their environment variables.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

const DEFAULT_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("no API base configured (use --api-base, STORYPATH_API_BASE, or a config file)")]
    MissingApiBase,
    #[error("API base `{0}` must start with http:// or https://")]
    InvalidApiBase(String),
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// Connection settings for the REST record store.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub api_base: Option<String>,
    /// Bearer token sent with every request.
    #[serde(default)]
    pub token: Option<String>,
    /// Author whose records are being previewed.
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

// Keeps the token out of logs and error output.
impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("api_base", &self.api_base)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("username", &self.username)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Values supplied on the command line or through the environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub api_base: Option<String>,
    pub token: Option<String>,
    pub username: Option<String>,
}

impl GatewayConfig {
    /// Read a JSON config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Parse a JSON config document.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is not a valid config.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Load the file (if any) and layer overrides on top.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be loaded or the result has no
    /// usable API base.
    pub fn resolve(path: Option<&Path>, overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => Self {
                timeout_secs: DEFAULT_TIMEOUT_SECS,
                ..Self::default()
            },
        };
        let config = base.with_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if overrides.api_base.is_some() {
            self.api_base = overrides.api_base;
        }
        if overrides.token.is_some() {
            self.token = overrides.token;
        }
        if overrides.username.is_some() {
            self.username = overrides.username;
        }
        self
    }

    /// Check the API base is present and looks like an HTTP URL.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingApiBase`] or [`ConfigError::InvalidApiBase`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base = self
            .api_base
            .as_deref()
            .map(str::trim)
            .filter(|base| !base.is_empty())
            .ok_or(ConfigError::MissingApiBase)?;
        if base.starts_with("http://") || base.starts_with("https://") {
            Ok(())
        } else {
            Err(ConfigError::InvalidApiBase(base.to_string()))
        }
    }

    /// API base without a trailing slash.
    #[must_use]
    pub fn api_base(&self) -> &str {
        self.api_base
            .as_deref()
            .map_or("", |base| base.trim().trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overrides(api_base: Option<&str>, token: Option<&str>) -> ConfigOverrides {
        ConfigOverrides {
            api_base: api_base.map(str::to_string),
            token: token.map(str::to_string),
            username: None,
        }
    }

    #[test]
    fn file_values_are_overridden() {
        let path = std::env::temp_dir().join(format!(
            "storypath-config-{}.json",
            std::process::id()
        ));
        std::fs::write(
            &path,
            r#"{"api_base": "https://file.example/api/", "token": "file-token", "username": "s1"}"#,
        )
        .unwrap();

        let config = GatewayConfig::resolve(
            Some(&path),
            overrides(Some("https://flag.example/api"), None),
        )
        .unwrap();
        assert_eq!(config.api_base(), "https://flag.example/api");
        assert_eq!(config.token.as_deref(), Some("file-token"));
        assert_eq!(config.username.as_deref(), Some("s1"));
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn api_base_is_required_and_checked() {
        assert!(matches!(
            GatewayConfig::resolve(None, ConfigOverrides::default()),
            Err(ConfigError::MissingApiBase)
        ));
        assert!(matches!(
            GatewayConfig::resolve(None, overrides(Some("ftp://nope"), None)),
            Err(ConfigError::InvalidApiBase(_))
        ));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = GatewayConfig::resolve(
            Some(Path::new("/nonexistent/storypath.json")),
            ConfigOverrides::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/storypath.json"));
    }

    #[test]
    fn debug_output_redacts_token() {
        let config = GatewayConfig {
            token: Some("secret-value".into()),
            ..GatewayConfig::default()
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("secret-value"));
        assert!(rendered.contains("<redacted>"));
    }
}
