//! Session commands: check, user, refresh, watch

use std::time::Duration;

use colored::Colorize;
use serde_json::{Value, json};

use crate::cli::args::GlobalOptions;
use crate::cli::{CommandContext, OutputFormat};
use crate::client::SessionStatus;
use crate::error::{Error, Result};
use crate::output::json::format_json;
use crate::output::table::format_record;

fn expired_error(ctx: &CommandContext) -> Error {
    let resume = ctx
        .runtime
        .auth()
        .session()
        .redirect_after_login()
        .map(|path| format!(" You will be returned to {} after signing in.", path))
        .unwrap_or_default();
    Error::Other(format!(
        "Session expired. Sign in again and run `grcctl init` to store the new session cookie.{}",
        resume
    ))
}

fn user_label(user: &Value) -> Option<String> {
    ["email", "username", "name"]
        .iter()
        .find_map(|field| user.get(*field).and_then(Value::as_str))
        .map(str::to_string)
}

/// Verify the session, refreshing it if the check is rejected
pub async fn check(opts: &GlobalOptions) -> Result<()> {
    let ctx = CommandContext::new(opts).await?;
    let status = ctx.runtime.check_session().await?;

    if ctx.format == OutputFormat::Json {
        let user = match &status {
            SessionStatus::Active { user } => user.clone(),
            _ => None,
        };
        println!(
            "{}",
            format_json(&json!({"status": status.to_string(), "user": user}))?
        );
        return Ok(());
    }

    match status {
        SessionStatus::Active { user } => {
            let who = user
                .as_ref()
                .and_then(user_label)
                .map(|label| format!(" as {}", label.bold()))
                .unwrap_or_default();
            println!("{} Session active{}", "✓".green(), who);
            Ok(())
        }
        SessionStatus::Refreshed => {
            println!("{} Session refreshed", "✓".green());
            Ok(())
        }
        SessionStatus::Expired => Err(expired_error(&ctx)),
    }
}

/// Show the signed-in user
pub async fn user(opts: &GlobalOptions) -> Result<()> {
    let ctx = CommandContext::new(opts).await?;
    let user = ctx.runtime.current_user().await?;

    match ctx.format {
        OutputFormat::Json => println!("{}", format_json(&user)?),
        OutputFormat::Table => println!("{}", format_record(&user)),
    }
    Ok(())
}

/// Refresh the session
pub async fn refresh(opts: &GlobalOptions) -> Result<()> {
    let ctx = CommandContext::new(opts).await?;
    let response = ctx.runtime.refresh_session().await?;

    match ctx.format {
        OutputFormat::Json => println!("{}", format_json(&response)?),
        OutputFormat::Table => println!("{} Session refreshed", "✓".green()),
    }
    Ok(())
}

/// Check the session now and then every `interval` seconds until it
/// expires or the user interrupts.
pub async fn watch(opts: &GlobalOptions, interval: u64) -> Result<()> {
    let ctx = CommandContext::new(opts).await?;
    let runtime = &ctx.runtime;

    let _subscription = runtime.auth().subscribe(|authenticated| {
        if authenticated {
            eprintln!("{} Session active", "✓".green());
        } else {
            eprintln!("{} Signed out", "✗".red());
        }
    });

    if runtime.check_session().await? == SessionStatus::Expired {
        return Err(expired_error(&ctx));
    }

    let period = Duration::from_secs(interval);
    println!(
        "Watching session every {}s {}",
        interval,
        "(Ctrl-C to stop)".dimmed()
    );
    let monitor = runtime.spawn_session_monitor(period);

    tokio::select! {
        _ = monitor.wait() => Err(expired_error(&ctx)),
        _ = tokio::signal::ctrl_c() => {
            println!("Stopped watching");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_label_prefers_email() {
        let user = json!({"id": 1, "name": "Ada", "email": "ada@example.com"});
        assert_eq!(user_label(&user).as_deref(), Some("ada@example.com"));
        assert_eq!(user_label(&json!({"name": "Ada"})).as_deref(), Some("Ada"));
        assert_eq!(user_label(&json!({"id": 1})), None);
    }
}
