//! Service configuration.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::models::Role;

/// Environment variable overriding [`ServiceConfig::auth_base_url`].
pub const ENV_AUTH_URL: &str = "PATIENT_DASH_AUTH_URL";
/// Environment variable overriding [`ServiceConfig::record_base_url`].
pub const ENV_API_URL: &str = "PATIENT_DASH_API_URL";
/// Environment variable overriding [`ServiceConfig::request_timeout_secs`].
pub const ENV_TIMEOUT_SECS: &str = "PATIENT_DASH_TIMEOUT_SECS";
/// Environment variable overriding [`ServiceConfig::default_role`].
pub const ENV_DEFAULT_ROLE: &str = "PATIENT_DASH_DEFAULT_ROLE";
/// Environment variable setting [`ServiceConfig::database_path`].
pub const ENV_DB_PATH: &str = "PATIENT_DASH_DB_PATH";

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Configuration for the remote services and local persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    /// Base URL of the auth service, including the `/auth` prefix.
    pub auth_base_url: String,
    /// Base URL of the record service; `/patients` is appended.
    pub record_base_url: String,
    /// Per-request timeout in seconds (default: 30).
    pub request_timeout_secs: u64,
    /// Role given to identities after login; the login call does not return one.
    pub default_role: Role,
    /// SQLite file for persisted state. `None` keeps it in memory.
    pub database_path: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            auth_base_url: "http://localhost:4004/auth".into(),
            record_base_url: "http://localhost:4004/api".into(),
            request_timeout_secs: 30,
            default_role: Role::Admin,
            database_path: None,
        }
    }
}

impl ServiceConfig {
    /// Defaults overridden by `PATIENT_DASH_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ServiceConfig::from_env`] with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_AUTH_URL) {
            config.auth_base_url = url;
        }
        if let Some(url) = lookup(ENV_API_URL) {
            config.record_base_url = url;
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            config.request_timeout_secs = raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or_else(|| ConfigError::InvalidValue {
                    key: ENV_TIMEOUT_SECS.into(),
                    message: format!("expected a positive integer, got {raw:?}"),
                })?;
        }
        if let Some(raw) = lookup(ENV_DEFAULT_ROLE) {
            config.default_role = raw.parse().map_err(|message| ConfigError::InvalidValue {
                key: ENV_DEFAULT_ROLE.into(),
                message,
            })?;
        }
        if let Some(path) = lookup(ENV_DB_PATH).filter(|p| !p.trim().is_empty()) {
            config.database_path = Some(PathBuf::from(path));
        }

        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
