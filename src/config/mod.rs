//! Configuration management for grcctl

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};

/// Default API host used when nothing else is configured
pub const DEFAULT_API_HOST: &str = "http://localhost:5000";

/// Deployment environment of the backend.
///
/// CSRF tokens are only fetched and attached in production; development
/// servers run without CSRF protection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Development,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Production => write!(f, "production"),
            Environment::Development => write!(f, "development"),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the GRC backend
    #[serde(default = "default_api_host")]
    pub api_host: String,

    /// Backend environment (controls CSRF handling)
    #[serde(default)]
    pub environment: Environment,

    /// Raw session cookie (`name=value`) used to authenticate requests
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_cookie: Option<String>,

    /// Query cache policy
    #[serde(default)]
    pub cache: CacheSettings,

    /// Retry attempt overrides
    #[serde(default)]
    pub retry: RetrySettings,

    /// Throttle applied after the server answers 429
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_second: u32,
}

fn default_api_host() -> String {
    DEFAULT_API_HOST.to_string()
}

fn default_rate_limit() -> u32 {
    10
}

/// Query cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Seconds before cached data is considered stale
    #[serde(default = "default_stale_time")]
    pub stale_time_secs: u64,

    /// Seconds an unused entry is retained
    #[serde(default = "default_gc_time")]
    pub gc_time_secs: u64,

    /// Persist responses between runs
    #[serde(default = "default_true")]
    pub persist: bool,
}

fn default_stale_time() -> u64 {
    60
}

fn default_gc_time() -> u64 {
    10 * 60
}

fn default_true() -> bool {
    true
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            stale_time_secs: default_stale_time(),
            gc_time_secs: default_gc_time(),
            persist: true,
        }
    }
}

impl CacheSettings {
    pub fn stale_time(&self) -> Duration {
        Duration::from_secs(self.stale_time_secs)
    }

    pub fn gc_time(&self) -> Duration {
        Duration::from_secs(self.gc_time_secs)
    }
}

/// Retry attempt counts per profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_critical_attempts")]
    pub critical_attempts: u32,
    #[serde(default = "default_fetch_attempts")]
    pub fetch_attempts: u32,
    #[serde(default = "default_auth_attempts")]
    pub auth_attempts: u32,
}

fn default_critical_attempts() -> u32 {
    5
}

fn default_fetch_attempts() -> u32 {
    3
}

fn default_auth_attempts() -> u32 {
    2
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            critical_attempts: default_critical_attempts(),
            fetch_attempts: default_fetch_attempts(),
            auth_attempts: default_auth_attempts(),
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::Invalid(
            "Could not determine home directory".to_string(),
        ))?;

        Ok(home.join(".grcctl").join("config.yaml"))
    }

    /// Resolve an optional override to a concrete config path
    pub fn resolve_path(path: Option<&str>) -> Result<PathBuf> {
        match path {
            Some(p) => Ok(PathBuf::from(p)),
            None => Self::default_path(),
        }
    }

    /// Load configuration from an optional override path
    pub fn load_at(path: Option<&str>) -> Result<Self> {
        Self::load_from(&Self::resolve_path(path)?)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound.into());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents).map_err(ConfigError::from)?;
        config.validate()?;

        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents =
            serde_yaml::to_string(self).map_err(|e| ConfigError::SaveError(e.to_string()))?;

        std::fs::write(path, contents)?;

        // The session cookie is a credential
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(path)?.permissions();
            perms.set_mode(0o600);
            std::fs::set_permissions(path, perms)?;
        }

        Ok(())
    }

    /// Validate field values that serde cannot check
    pub fn validate(&self) -> Result<()> {
        if url::Url::parse(&self.api_host).is_err() {
            return Err(ConfigError::Invalid(format!("api_host is not a URL: {}", self.api_host)).into());
        }
        if self.rate_limit_per_second == 0 {
            return Err(ConfigError::Invalid("rate_limit_per_second must be positive".to_string()).into());
        }
        if let Some(cookie) = &self.session_cookie
            && !cookie.contains('=')
        {
            return Err(ConfigError::Invalid("session_cookie must look like name=value".to_string()).into());
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_host: default_api_host(),
            environment: Environment::default(),
            session_cookie: None,
            cache: CacheSettings::default(),
            retry: RetrySettings::default(),
            rate_limit_per_second: default_rate_limit(),
        }
    }
}
