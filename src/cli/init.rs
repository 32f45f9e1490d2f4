//! Init command implementation

use colored::Colorize;
use dialoguer::{Input, Password, Select, theme::ColorfulTheme};

use crate::cli::args::GlobalOptions;
use crate::cli::context::build_runtime;
use crate::client::SessionStatus;
use crate::config::{Config, Environment};
use crate::error::Result;

/// Run the init command
///
/// Prompts for the backend location and session cookie, saves the config,
/// then verifies the session against the backend.
pub async fn run(opts: &GlobalOptions) -> Result<()> {
    let config_path = Config::resolve_path(opts.config_ref())?;
    let mut config = Config::load_from(&config_path).unwrap_or_default();
    let theme = ColorfulTheme::default();

    println!("{}", "Welcome to grcctl!".bold().green());
    println!("Let's connect to your GRC dashboard backend.\n");

    let default_host = opts
        .api_host
        .clone()
        .unwrap_or_else(|| config.api_host.clone());
    config.api_host = Input::with_theme(&theme)
        .with_prompt("API host")
        .default(default_host)
        .validate_with(|input: &String| -> std::result::Result<(), String> {
            url::Url::parse(input)
                .map(|_| ())
                .map_err(|e| format!("Not a URL: {}", e))
        })
        .interact_text()?;

    let environments = [Environment::Production, Environment::Development];
    let labels = [
        "production (CSRF protected)",
        "development (no CSRF tokens)",
    ];
    let current = environments
        .iter()
        .position(|env| *env == config.environment)
        .unwrap_or(0);
    let selection = Select::with_theme(&theme)
        .with_prompt("Backend environment")
        .items(&labels)
        .default(current)
        .interact()?;
    config.environment = environments[selection];

    let cookie: String = Password::with_theme(&theme)
        .with_prompt("Session cookie as name=value (leave empty to keep current)")
        .allow_empty_password(true)
        .interact()?;
    if !cookie.trim().is_empty() {
        config.session_cookie = Some(cookie.trim().to_string());
    }

    config.validate()?;
    config.save_to(&config_path)?;
    println!(
        "\n{} Configuration saved to: {}",
        "✓".green(),
        config_path.display()
    );

    if config.session_cookie.is_none() {
        println!("{} No session cookie set, skipping session check", "○".dimmed());
        return Ok(());
    }

    println!("\n{}", "Checking session...".cyan());
    let runtime = build_runtime(&config, &config_path, opts.no_cache)?;
    match runtime.check_session().await {
        Ok(SessionStatus::Expired) => {
            println!(
                "{} Session rejected. Sign in again and rerun {}",
                "✗".red(),
                "grcctl init".cyan()
            );
            return Ok(());
        }
        Ok(status) => println!("{} Session {}", "✓".green(), status),
        Err(e) => {
            println!("{} Could not verify session: {}", "⚠".yellow(), e);
            return Ok(());
        }
    }

    if let Some(path) = runtime.auth().session().take_redirect_after_login() {
        println!("  Resume at {}", path.cyan());
    }

    println!("\n{}", "You're all set! Try running:".bold());
    println!("  {} - Show configuration status", "grcctl status".cyan());
    println!("  {} - List risks", "grcctl list risks".cyan());

    Ok(())
}
