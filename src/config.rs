//! Client configuration parsed from environment variables.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_REFRESH_TIMEOUT_SECS: u64 = 10;

/// Errors raised while loading configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is not set.
    #[error("missing config: env var {var} not set")]
    MissingVar { var: String },

    /// A configuration value could not be parsed.
    #[error("config parse failed: {0}")]
    Parse(String),
}

/// Whether a refresh is attempted when no renewal cookie is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshPolicy {
    /// Fail fast with `SessionExpired` unless a `refreshToken` cookie is present.
    #[default]
    RequireMarker,
    /// Always call `/refresh` and let the backend decide.
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
    pub refresh_secs: u64,
}

impl Timeouts {
    #[must_use]
    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    #[must_use]
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    #[must_use]
    pub fn refresh(&self) -> Duration {
        Duration::from_secs(self.refresh_secs)
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            request_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            refresh_secs: DEFAULT_REFRESH_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Backend base URL without a trailing slash.
    pub base_url: String,
    pub timeouts: Timeouts,
    pub refresh_policy: RefreshPolicy,
    /// Where cookies and the cached identity persist between runs. In-memory when `None`.
    pub session_file: Option<PathBuf>,
}

impl ClientConfig {
    /// Config for `base_url` with every optional setting at its default.
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            timeouts: Timeouts::default(),
            refresh_policy: RefreshPolicy::default(),
            session_file: None,
        }
    }

    /// Build typed client config from environment variables.
    ///
    /// Required:
    /// - `CMS_API_URL`
    ///
    /// Optional (see [`ClientConfig::apply_env`]):
    /// - `CMS_REQUEST_TIMEOUT_SECS`, `CMS_CONNECT_TIMEOUT_SECS`, `CMS_REFRESH_TIMEOUT_SECS`
    /// - `CMS_REFRESH_POLICY`: `require-marker` (default) or `always`
    /// - `CMS_SESSION_FILE`
    ///
    /// # Errors
    ///
    /// Returns an error if `CMS_API_URL` is missing or an optional value is malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url =
            std::env::var("CMS_API_URL").map_err(|_| ConfigError::MissingVar { var: "CMS_API_URL".into() })?;
        if base_url.trim().is_empty() {
            return Err(ConfigError::Parse("CMS_API_URL is empty".into()));
        }
        Self::new(base_url.trim()).apply_env()
    }

    /// Overlay the optional `CMS_*` environment settings onto this config.
    ///
    /// # Errors
    ///
    /// Returns an error if `CMS_REFRESH_POLICY` names an unknown policy.
    pub fn apply_env(mut self) -> Result<Self, ConfigError> {
        self.timeouts = Timeouts {
            request_secs: env_parse_u64("CMS_REQUEST_TIMEOUT_SECS", self.timeouts.request_secs),
            connect_secs: env_parse_u64("CMS_CONNECT_TIMEOUT_SECS", self.timeouts.connect_secs),
            refresh_secs: env_parse_u64("CMS_REFRESH_TIMEOUT_SECS", self.timeouts.refresh_secs),
        };
        if let Ok(raw) = std::env::var("CMS_REFRESH_POLICY") {
            self.refresh_policy = parse_refresh_policy(&raw)?;
        }
        if let Some(path) = std::env::var_os("CMS_SESSION_FILE").filter(|p| !p.is_empty()) {
            self.session_file = Some(PathBuf::from(path));
        }
        Ok(self)
    }

    #[must_use]
    pub fn with_session_file(mut self, path: Option<PathBuf>) -> Self {
        if path.is_some() {
            self.session_file = path;
        }
        self
    }

    /// Absolute URL for an API path such as `/posts`.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_owned();
        }
        if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }
}

fn env_parse_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

pub(crate) fn parse_refresh_policy(raw: &str) -> Result<RefreshPolicy, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "require-marker" | "require_marker" => Ok(RefreshPolicy::RequireMarker),
        "always" => Ok(RefreshPolicy::Always),
        other => Err(ConfigError::Parse(format!(
            "unknown CMS_REFRESH_POLICY '{other}' (expected 'require-marker' or 'always')"
        ))),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
