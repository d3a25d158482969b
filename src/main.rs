//! support-desk - Support ticket lifecycle engine
//!
//! This is the main entry point for the support-desk CLI application.
//! It handles command-line argument parsing and dispatches to the appropriate
//! command handlers.

use anyhow::Context;
use clap::Parser;
use std::process;
use support_desk::cli::handlers::{
    ListArgs, handle_init, handle_list, handle_notifications, handle_report, handle_serve,
    handle_show, handle_sweep, handle_users,
};
use support_desk::cli::{Cli, Commands, OutputFormatter};
use support_desk::config::{ConfigOverrides, DeskConfig};
use support_desk::error::{DeskError, Result};
use tracing_subscriber::EnvFilter;

/// Main entry point for the support-desk CLI
///
/// Parses command-line arguments and executes the requested command.
/// Handles errors gracefully and provides helpful error messages to users.
#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let formatter = OutputFormatter::new(cli.json, cli.no_color);

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            formatter.error(&format!("{e:#}"));
            process::exit(1);
        },
    };
    init_logging(cli.verbose, &config.log_level);

    if let Err(e) = run(cli.command, &config, &formatter).await {
        handle_error(&e, &formatter);
        process::exit(1);
    }
}

/// Resolve configuration from defaults, file, environment and flags
fn load_config(cli: &Cli) -> anyhow::Result<DeskConfig> {
    let overrides = ConfigOverrides {
        config_file: cli.config.clone(),
        database_path: cli.db.clone(),
    };
    DeskConfig::load(&overrides).with_context(|| match &overrides.config_file {
        Some(path) => format!("Failed to load configuration from {}", path.display()),
        None => "Failed to load configuration".to_string(),
    })
}

/// Logs go to stderr so stdout stays clean for command output
///
/// `-v` forces debug output for this crate; otherwise `RUST_LOG` wins over
/// the configured level.
fn init_logging(verbose: bool, configured: &str) {
    let filter = if verbose {
        EnvFilter::new("support_desk=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(configured))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Dispatch to the handler for `command`
async fn run(command: Commands, config: &DeskConfig, formatter: &OutputFormatter) -> Result<()> {
    match command {
        Commands::Init => handle_init(config, formatter).await,
        Commands::Serve { no_sweeper } => handle_serve(no_sweeper, config, formatter).await,
        Commands::Sweep => handle_sweep(config, formatter).await,
        Commands::List {
            user,
            status,
            limit,
            queue,
        } => {
            handle_list(
                ListArgs {
                    user,
                    status,
                    limit,
                    queue,
                },
                config,
                formatter,
            )
            .await
        },
        Commands::Show { ticket, viewer } => handle_show(&ticket, viewer, config, formatter).await,
        Commands::Report => handle_report(config, formatter).await,
        Commands::Users => handle_users(config, formatter).await,
        Commands::Notifications {
            user,
            limit,
            mark_read,
        } => handle_notifications(user, limit, mark_read, config, formatter).await,
    }
}

/// Handle errors and display them to the user
///
/// In JSON mode the error is also written to stdout as an object.
fn handle_error(error: &DeskError, formatter: &OutputFormatter) {
    formatter.error(&error.user_message());

    if formatter.is_json() {
        let _ = formatter.json(&serde_json::json!({
            "status": "error",
            "error": error.to_string(),
            "transient": error.is_transient(),
        }));
    }

    if tracing::enabled!(tracing::Level::DEBUG) {
        eprintln!("\nDebug information:");
        eprintln!("{error:?}");
    }
}
