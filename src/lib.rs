//! support-desk - Support ticket lifecycle engine
//!
//! This crate provides the engine behind a chat-driven support desk:
//! - A ticket state machine validating every transition
//! - A SQLite store that retries transient lock conflicts
//! - Best-effort user notifications recorded in an outbox
//! - Derived per-user statistics and operator reports
//! - A background sweeper closing abandoned tickets
//!
//! # Concurrent Safety
//!
//! Every read and write runs through [`storage::Store::execute`], which wraps
//! the work in a transaction and retries it when SQLite reports lock
//! contention. Ticket updates are guarded on the status and timestamp they
//! were read with, so two concurrent intents against the same ticket never
//! both succeed against stale state.
//!
//! # Example
//!
//! ```rust,ignore
//! use support_desk::config::{ConfigOverrides, DeskConfig};
//! use support_desk::core::{Command, Inbound};
//! use support_desk::engine::TicketEngine;
//! use support_desk::notify::LogDeliverer;
//! use std::sync::Arc;
//!
//! let config = DeskConfig::load(&ConfigOverrides::default())?;
//! let engine = TicketEngine::start(&config, Arc::new(LogDeliverer)).await?;
//!
//! let outcome = engine
//!     .handle(Inbound::new(
//!         42,
//!         Command::CreateTicket {
//!             category: "internet/slow".to_string(),
//!             description: "Pages take minutes to load".to_string(),
//!         },
//!     ))
//!     .await?;
//! println!("{}", outcome.reply_text());
//! ```

// Allow missing error documentation for internal implementations
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::redundant_closure_for_method_calls)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::single_match_else)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::indexing_slicing)]
#![allow(clippy::map_unwrap_or)]

pub mod cli;
pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod notify;
pub mod session;
pub mod stats;
pub mod storage;
pub mod sweeper;

#[cfg(test)]
pub mod test_utils;

// Re-export commonly used types
pub use engine::{Outcome, TicketEngine};
pub use error::{DeskError, Result};
