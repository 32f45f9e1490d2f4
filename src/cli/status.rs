//! Status command implementation

use colored::Colorize;

use crate::cache::CacheStorage;
use crate::cli::args::GlobalOptions;
use crate::client::session::SessionStore;
use crate::config::Config;
use crate::error::Result;
use crate::output::format_size;

/// Display configuration, session and cache status
pub fn run(opts: &GlobalOptions) -> Result<()> {
    println!("{}\n", "grcctl Configuration Status".bold());

    let config_path = Config::resolve_path(opts.config_ref())?;

    let config = match Config::load_from(&config_path) {
        Ok(config) => config,
        Err(_) => {
            println!("{} Configuration not found", "✗".red());
            println!();
            println!(
                "Run {} to create a configuration file.",
                "grcctl init".cyan()
            );
            println!();
            return Ok(());
        }
    };

    println!("Config file: {}", config_path.display().to_string().cyan());
    println!("API host: {}", config.api_host.bold());
    println!();

    if config.environment.is_production() {
        println!("{} Production (CSRF tokens enabled)", "✓".green());
    } else {
        println!("{} Development (CSRF tokens disabled)", "○".dimmed());
    }

    if config.session_cookie.is_some() {
        println!("{} Session cookie configured", "✓".green());
    } else {
        println!("{} Session cookie not configured", "✗".red());
        println!("  → Run 'grcctl init' to configure");
    }

    let session = SessionStore::load(&SessionStore::path_beside(&config_path))?;
    if let Some(path) = session.redirect_after_login() {
        println!(
            "{} Session expired while at {} (resume after signing in)",
            "⚠".yellow(),
            path.cyan()
        );
    }

    println!(
        "{} Retries: critical {}, fetch {}, auth {}",
        "○".dimmed(),
        config.retry.critical_attempts,
        config.retry.fetch_attempts,
        config.retry.auth_attempts
    );

    if config.cache.persist {
        match CacheStorage::open().and_then(|storage| storage.stats()) {
            Ok(stats) => println!(
                "{} Cache: {} valid entries ({})",
                "✓".green(),
                stats.valid_entries,
                format_size(stats.total_size_bytes)
            ),
            Err(e) => println!("{} Cache unavailable: {}", "⚠".yellow(), e),
        }
    } else {
        println!("{} Cache persistence disabled", "○".dimmed());
    }

    println!();
    Ok(())
}
