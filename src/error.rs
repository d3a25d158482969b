//! Error types for support-desk
//!
//! Every fallible operation in the crate returns [`Result`]. The variants map
//! onto the failure classes the ticket engine distinguishes: transient store
//! conflicts (retried by the [`Store`](crate::storage::Store)), rejected
//! transitions, missing records, malformed input and delivery failures.

use crate::core::Status;
use thiserror::Error;

/// Result type alias used throughout the crate
pub type Result<T> = std::result::Result<T, DeskError>;

/// SQLite primary result codes that signal lock contention
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;
/// `SQLITE_CONSTRAINT_UNIQUE` / `SQLITE_CONSTRAINT_PRIMARYKEY`
const SQLITE_CONSTRAINT_UNIQUE: i32 = 2067;
const SQLITE_CONSTRAINT_PRIMARYKEY: i32 = 1555;

/// Main error type for support-desk
#[derive(Error, Debug)]
pub enum DeskError {
    /// Lock contention persisted through every retry attempt
    #[error("Store is busy: {operation} failed after {attempts} attempts: {reason}")]
    TransientStoreConflict {
        operation: String,
        attempts: u32,
        reason: String,
    },

    /// An optimistic write found the ticket changed since it was read
    #[error("Ticket {ticket_id} was modified concurrently")]
    StaleWrite { ticket_id: String },

    /// The intent does not apply to the ticket's current state
    #[error("Cannot {action} a ticket that is {status}")]
    InvalidTransition { action: String, status: Status },

    /// The actor may not perform this intent on this ticket
    #[error("User {actor} is not allowed to {action} this ticket")]
    NotPermitted { action: String, actor: i64 },

    #[error("Ticket not found: {id}")]
    TicketNotFound { id: String },

    #[error("User not found: {id}")]
    UserNotFound { id: i64 },

    /// Malformed or rejected intent payload
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A notification could not be handed to the messaging channel
    #[error("Delivery to user {user_id} failed: {reason}")]
    DeliveryFailure { user_id: i64, reason: String },

    /// A store operation exceeded its overall time budget
    #[error("Store operation {operation} timed out after {millis}ms")]
    Timeout { operation: String, millis: u128 },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeskError {
    /// Shorthand for a validation failure
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Whether retrying the whole transaction may succeed
    ///
    /// Only lock contention, pool exhaustion and optimistic-guard misses
    /// qualify; everything else is surfaced to the caller immediately.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::StaleWrite { .. } => true,
            Self::Database(sqlx::Error::PoolTimedOut) => true,
            Self::Database(sqlx::Error::Database(db)) => {
                matches!(primary_code(db.code().as_deref()), Some(SQLITE_BUSY | SQLITE_LOCKED))
                    || db.message().contains("database is locked")
            },
            _ => false,
        }
    }

    /// Whether this is a UNIQUE or PRIMARY KEY constraint violation
    #[must_use]
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::Database(sqlx::Error::Database(db)) => {
                matches!(
                    db.code().as_deref().and_then(|c| c.parse::<i32>().ok()),
                    Some(SQLITE_CONSTRAINT_UNIQUE | SQLITE_CONSTRAINT_PRIMARYKEY)
                ) || db.message().contains("UNIQUE constraint failed")
            },
            _ => false,
        }
    }

    /// Short text suitable for showing to the user who sent the intent
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidTransition { action, status } => {
                format!("This ticket is {status} and cannot be {}.", past_tense(action))
            },
            Self::NotPermitted { .. } => "You are not allowed to do that.".to_string(),
            Self::TicketNotFound { id } => format!("Ticket #{id} was not found."),
            Self::UserNotFound { .. } => "Please start a conversation first.".to_string(),
            Self::Validation(message) => message.clone(),
            Self::TransientStoreConflict { .. } | Self::StaleWrite { .. } | Self::Timeout { .. } => {
                "The service is busy right now. Please try again in a moment.".to_string()
            },
            _ => "Something went wrong. Please try again later.".to_string(),
        }
    }
}

/// Extracts the primary result code from an (extended) SQLite error code
fn primary_code(code: Option<&str>) -> Option<i32> {
    code.and_then(|c| c.parse::<i32>().ok()).map(|c| c & 0xff)
}

fn past_tense(action: &str) -> String {
    match action {
        "auto-expire" => "expired".to_string(),
        "comment" => "commented on".to_string(),
        "rate" => "rated".to_string(),
        "reject" => "rejected".to_string(),
        "close" => "closed".to_string(),
        "cancel" => "cancelled".to_string(),
        "resolve" => "resolved".to_string(),
        other => other.to_string(),
    }
}
