//! Command execution context
//!
//! Provides a unified context for command execution, eliminating boilerplate
//! for config loading and client runtime construction.

use std::path::Path;
use std::sync::Arc;

use log::{debug, warn};

use crate::cache::{CacheStorage, QueryCache, QueryPolicy};
use crate::cli::OutputFormat;
use crate::cli::args::GlobalOptions;
use crate::client::retry::RetryProfiles;
use crate::client::session::SessionStore;
use crate::client::{ClientRuntime, ReqwestTransport};
use crate::config::Config;
use crate::error::{ConfigError, Error, Result};

/// Context for command execution: the runtime and output options.
pub struct CommandContext {
    /// Client runtime shared by everything the command does
    pub runtime: Arc<ClientRuntime>,
    /// Output format preference
    pub format: OutputFormat,
}

impl CommandContext {
    /// Create a new command context.
    ///
    /// Loads the config file, applies `--api-host`, and builds the runtime.
    /// With `--api-host` set a missing config file is not an error; defaults
    /// are used instead.
    ///
    /// # Errors
    /// Returns error if config cannot be loaded or is invalid.
    pub async fn new(opts: &GlobalOptions) -> Result<Self> {
        let config_path = Config::resolve_path(opts.config_ref())?;
        let config = load_config(&config_path, opts.api_host_ref())?;

        debug!(
            "Using API host {} ({})",
            config.api_host, config.environment
        );
        let runtime = build_runtime(&config, &config_path, opts.no_cache)?;

        Ok(Self {
            runtime: Arc::new(runtime),
            format: opts.format,
        })
    }
}

fn load_config(path: &Path, api_host: Option<&str>) -> Result<Config> {
    let mut config = match Config::load_from(path) {
        Ok(config) => config,
        Err(Error::Config(ConfigError::NotFound)) if api_host.is_some() => {
            debug!("No config at {}, using defaults", path.display());
            Config::default()
        }
        Err(err) => return Err(err),
    };

    if let Some(host) = api_host {
        config.api_host = host.to_string();
        config.validate()?;
    }
    Ok(config)
}

/// Assemble the runtime described by `config`.
pub fn build_runtime(config: &Config, config_path: &Path, no_cache: bool) -> Result<ClientRuntime> {
    let transport = ReqwestTransport::new(&config.api_host, config.session_cookie.as_deref())?;
    let policy = QueryPolicy::from(&config.cache);

    let cache = if config.cache.persist && !no_cache {
        match CacheStorage::open() {
            Ok(storage) => QueryCache::with_storage(policy, storage, transport.base_url().as_str()),
            Err(e) => {
                warn!("Persistent cache unavailable, using memory only: {}", e);
                QueryCache::new(policy)
            }
        }
    } else {
        QueryCache::new(policy)
    };

    let session = SessionStore::load(&SessionStore::path_beside(config_path))?;

    debug!(
        "Query cache is {}",
        if cache.is_persistent() { "persistent" } else { "memory only" }
    );

    Ok(ClientRuntime::builder(Arc::new(transport))
        .environment(config.environment)
        .cache(cache)
        .session(session)
        .retry(RetryProfiles::from(&config.retry))
        .rate_limit(config.rate_limit_per_second)
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_config_without_host_is_error() {
        let dir = TempDir::new().unwrap();
        let err = load_config(&dir.path().join("config.yaml"), None).unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::NotFound)));
    }

    #[test]
    fn test_api_host_allows_missing_config() {
        let dir = TempDir::new().unwrap();
        let config =
            load_config(&dir.path().join("config.yaml"), Some("http://127.0.0.1:9000")).unwrap();
        assert_eq!(config.api_host, "http://127.0.0.1:9000");
    }

    #[test]
    fn test_api_host_overrides_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        Config::default().save_to(&path).unwrap();

        let config = load_config(&path, Some("https://grc.example.com")).unwrap();
        assert_eq!(config.api_host, "https://grc.example.com");
    }

    #[test]
    fn test_invalid_api_host_rejected() {
        let dir = TempDir::new().unwrap();
        let err = load_config(&dir.path().join("config.yaml"), Some("not a url")).unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::Invalid(_))));
    }
}
