//! Command-line interface
//!
//! Argument definitions for the `support-desk` binary, the output formatter
//! shared by every handler and the handlers themselves.

pub mod handlers;
mod output;

pub use output::OutputFormatter;

use crate::core::UserId;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Support ticket lifecycle engine
#[derive(Parser, Debug)]
#[command(name = "support-desk", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (YAML)
    #[arg(short, long, global = true, env = "SUPPORT_DESK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Database file, overriding the configured one
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the database schema
    Init,

    /// Read intents as JSON lines on stdin and write replies to stdout
    Serve {
        /// Do not run the auto-close sweeper
        #[arg(long)]
        no_sweeper: bool,
    },

    /// Run one auto-close cycle
    Sweep,

    /// List tickets
    List {
        /// Only tickets of this user
        #[arg(short, long, conflicts_with = "status")]
        user: Option<UserId>,

        /// Only tickets in this status
        #[arg(short, long)]
        status: Option<String>,

        /// Maximum number of tickets to show
        #[arg(short, long)]
        limit: Option<u32>,

        /// Operator work queue instead of a plain listing
        #[arg(long, conflicts_with_all = ["user", "status"])]
        queue: bool,
    },

    /// Show a ticket and its message trail
    Show {
        /// Ticket ID
        ticket: String,

        /// Show the ticket as this user would see it
        #[arg(long = "as", value_name = "USER_ID")]
        viewer: Option<UserId>,
    },

    /// Ticket statistics
    Report,

    /// List registered users
    Users,

    /// Recent notifications
    Notifications {
        /// Only notifications of this user
        #[arg(short, long)]
        user: Option<UserId>,

        /// Maximum number of notifications to show
        #[arg(short, long, default_value_t = crate::engine::DEFAULT_NOTIFICATION_LIMIT)]
        limit: u32,

        /// Mark a notification as read
        #[arg(long, value_name = "ID")]
        mark_read: Option<i64>,
    },
}
