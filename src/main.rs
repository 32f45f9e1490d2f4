//! grcctl - command-line client for the GRC dashboard backend

use clap::Parser;

mod cache;
mod cli;
mod client;
mod config;
mod error;
mod models;
mod output;

use cli::args::GlobalOptions;
use cli::{AuthCommands, CacheCommands, Cli, Commands, RiskCommands};
use error::Result;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.debug);

    if let Err(err) = run(cli).await {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}

/// `RUST_LOG` wins; otherwise warnings, plus grcctl debug output with `--debug`
fn init_logging(debug: bool) {
    let default_filter = if debug { "warn,grcctl=debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let opts = GlobalOptions::from_cli(&cli);

    match cli.command {
        Commands::Init => cli::init::run(&opts).await,
        Commands::Status => cli::status::run(&opts),
        Commands::List {
            resource,
            params,
            refresh,
            include_deleted,
        } => cli::resource::list(&opts, resource, &params, refresh, include_deleted).await,
        Commands::Get { resource, id } => cli::resource::get(&opts, resource, &id).await,
        Commands::Create { resource, data } => cli::resource::create(&opts, resource, &data).await,
        Commands::Update { resource, id, data } => {
            cli::resource::update(&opts, resource, &id, &data).await
        }
        Commands::Delete { resource, id, soft } => {
            cli::resource::delete(&opts, resource, &id, soft).await
        }
        Commands::Restore { resource, id } => cli::resource::restore(&opts, resource, &id).await,
        Commands::Risk(RiskCommands::Score {
            likelihood,
            impact,
            effectiveness,
        }) => cli::risk::score(&opts, likelihood, impact, effectiveness),
        Commands::Request {
            method,
            path,
            data,
            params,
        } => cli::request::run(&opts, &method, &path, data.as_deref(), &params).await,
        Commands::Auth(auth_cmd) => match auth_cmd {
            AuthCommands::Check => cli::auth::check(&opts).await,
            AuthCommands::User => cli::auth::user(&opts).await,
            AuthCommands::Refresh => cli::auth::refresh(&opts).await,
            AuthCommands::Watch { interval } => cli::auth::watch(&opts, interval).await,
        },
        Commands::Cache(cache_cmd) => match cache_cmd {
            CacheCommands::Status => cli::cache::status(&opts),
            CacheCommands::Clear => cli::cache::clear(opts.format),
            CacheCommands::Path => cli::cache::path(),
        },
        Commands::Completion { shell } => {
            cli::completions::generate(shell);
            Ok(())
        }
    }
}
