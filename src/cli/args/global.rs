//! Global CLI options shared across all commands
//!
//! Consolidates the global flags into one struct so handlers take a single
//! argument. When a global option is added, only this struct and `main.rs`
//! need to change.

use crate::cli::{Cli, OutputFormat};

/// Global CLI options passed to all command handlers.
///
/// # Precedence
///
/// CLI flag > environment variable (`GRCCTL_*`) > config file > default.
/// This struct captures the CLI/env layer; config file values are resolved
/// later in `CommandContext`.
#[derive(Debug, Clone)]
pub struct GlobalOptions {
    /// Output format (table, json)
    pub format: OutputFormat,

    /// Custom config file path (defaults to ~/.grcctl/config.yaml)
    pub config: Option<String>,

    /// API host override, also allows running without a config file
    pub api_host: Option<String>,

    /// Skip the persistent response cache
    pub no_cache: bool,
}

impl GlobalOptions {
    /// Create GlobalOptions from a parsed CLI struct.
    pub fn from_cli(cli: &Cli) -> Self {
        Self {
            format: cli.format,
            config: cli.config.clone(),
            api_host: cli.api_host.clone(),
            no_cache: cli.no_cache,
        }
    }

    /// Get config path as `Option<&str>`.
    pub fn config_ref(&self) -> Option<&str> {
        self.config.as_deref()
    }

    /// Get API host override as `Option<&str>`.
    pub fn api_host_ref(&self) -> Option<&str> {
        self.api_host.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_from_cli_flags() {
        let cli = Cli::parse_from([
            "grcctl",
            "--format",
            "json",
            "--config",
            "/custom/path",
            "--api-host",
            "http://localhost:8080",
            "--no-cache",
            "status",
        ]);
        let opts = GlobalOptions::from_cli(&cli);

        assert_eq!(opts.format, OutputFormat::Json);
        assert_eq!(opts.config_ref(), Some("/custom/path"));
        assert_eq!(opts.api_host_ref(), Some("http://localhost:8080"));
        assert!(opts.no_cache);
    }

    #[test]
    fn test_none_accessors() {
        let opts = GlobalOptions {
            format: OutputFormat::Table,
            config: None,
            api_host: None,
            no_cache: false,
        };

        assert_eq!(opts.config_ref(), None);
        assert_eq!(opts.api_host_ref(), None);
    }
}
