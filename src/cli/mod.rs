//! CLI command definitions and handlers

use clap::{Parser, Subcommand};
pub use clap_complete::Shell;

pub mod args;
pub mod auth;
pub mod cache;
pub mod completions;
pub mod context;
pub mod init;
pub mod progress;
pub mod request;
pub mod resource;
pub mod risk;
pub mod status;

pub use args::{OutputFormat, parse_param};
pub use context::CommandContext;

use crate::models::Resource;

/// grcctl - Command-line client for the GRC dashboard backend
#[derive(Parser, Debug)]
#[command(name = "grcctl")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (table, json)
    #[arg(
        long,
        global = true,
        env = "GRCCTL_FORMAT",
        default_value = "table",
        hide_env = true
    )]
    pub format: OutputFormat,

    /// Override config file location
    #[arg(long, global = true, env = "GRCCTL_CONFIG", hide_env = true)]
    pub config: Option<String>,

    /// Override the API host from the config file
    #[arg(long, global = true, env = "GRCCTL_API_HOST", hide_env = true)]
    pub api_host: Option<String>,

    /// Enable debug logging
    #[arg(long, global = true, env = "GRCCTL_DEBUG", hide_env = true)]
    pub debug: bool,

    /// Bypass the persistent cache, fetch fresh data from the API
    #[arg(long, global = true, env = "GRCCTL_NO_CACHE", hide_env = true)]
    pub no_cache: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize grcctl configuration
    Init,

    /// Show configuration, session and cache status
    Status,

    /// List records of a resource
    #[command(after_help = "\
Examples:
  grcctl list risks
  grcctl list controls --param status=implemented
  grcctl list action-plans --refresh --format json")]
    List {
        /// Resource to list
        #[arg(value_enum)]
        resource: Resource,

        /// Query parameter (repeatable), e.g. --param status=open
        #[arg(long = "param", short = 'p', value_parser = parse_param)]
        params: Vec<(String, String)>,

        /// Refetch even when cached data is available
        #[arg(long)]
        refresh: bool,

        /// Include soft-deleted records
        #[arg(long)]
        include_deleted: bool,
    },

    /// Show a single record
    Get {
        #[arg(value_enum)]
        resource: Resource,

        /// Record ID
        id: String,
    },

    /// Create a record from a JSON object
    Create {
        #[arg(value_enum)]
        resource: Resource,

        /// Record fields as JSON, e.g. '{"title":"Vendor breach"}'
        #[arg(long)]
        data: String,
    },

    /// Update fields of a record
    Update {
        #[arg(value_enum)]
        resource: Resource,

        /// Record ID
        id: String,

        /// Fields to change as JSON
        #[arg(long)]
        data: String,
    },

    /// Delete a record
    Delete {
        #[arg(value_enum)]
        resource: Resource,

        /// Record ID
        id: String,

        /// Mark the record deleted instead of removing it
        #[arg(long)]
        soft: bool,
    },

    /// Restore a soft-deleted record
    Restore {
        #[arg(value_enum)]
        resource: Resource,

        /// Record ID
        id: String,
    },

    /// Risk scoring utilities
    #[command(subcommand)]
    Risk(RiskCommands),

    /// Send a raw API request through the client runtime
    #[command(after_help = "\
Examples:
  grcctl request GET /api/dashboard/summary
  grcctl request POST /api/risks --data '{\"title\":\"New risk\"}'")]
    Request {
        /// HTTP method (GET, POST, PUT, PATCH, DELETE)
        method: String,

        /// API path, e.g. /api/risks
        path: String,

        /// JSON body for state-changing requests
        #[arg(long)]
        data: Option<String>,

        /// Query parameter (repeatable)
        #[arg(long = "param", short = 'p', value_parser = parse_param)]
        params: Vec<(String, String)>,
    },

    /// Inspect and maintain the login session
    #[command(subcommand)]
    Auth(AuthCommands),

    /// Manage local response cache
    #[command(subcommand)]
    Cache(CacheCommands),

    /// Generate shell completions
    #[command(after_help = "\
Install:
  bash:   grcctl completion bash > /etc/bash_completion.d/grcctl
  zsh:    grcctl completion zsh > \"${fpath[1]}/_grcctl\"
  fish:   grcctl completion fish > ~/.config/fish/completions/grcctl.fish")]
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Risk scoring subcommands
#[derive(Subcommand, Debug)]
pub enum RiskCommands {
    /// Compute inherent and residual risk scores
    Score {
        /// Likelihood on a 1-5 scale
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
        likelihood: u8,

        /// Impact on a 1-5 scale
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
        impact: u8,

        /// Control effectiveness in percent
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
        effectiveness: Option<u8>,
    },
}

/// Session subcommands
#[derive(Subcommand, Debug)]
pub enum AuthCommands {
    /// Verify the session, refreshing it if needed
    Check,

    /// Show the signed-in user
    User,

    /// Refresh the session
    Refresh,

    /// Keep checking the session until it expires (Ctrl-C to stop)
    Watch {
        /// Seconds between checks
        #[arg(long, default_value_t = 300, value_parser = clap::value_parser!(u64).range(1..))]
        interval: u64,
    },
}

/// Cache management subcommands
#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Show cache statistics
    Status,
    /// Clear all cached data
    Clear,
    /// Print cache directory path
    Path,
}
