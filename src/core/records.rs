use super::{TicketId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An entry in a ticket's message trail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub ticket_id: TicketId,
    pub sender_id: UserId,
    pub body: String,
    pub sent_at: DateTime<Utc>,
    /// Operator-only note, never shown to the ticket owner
    pub internal: bool,
}

/// A message produced by a transition, not yet persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub sender_id: UserId,
    pub body: String,
    pub internal: bool,
}

/// A user's rating of a resolved ticket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub id: i64,
    pub ticket_id: TicketId,
    pub user_id: UserId,
    pub rating: u8,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Feedback produced by a rate transition, not yet persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFeedback {
    pub user_id: UserId,
    pub rating: u8,
    pub comment: Option<String>,
}

/// Outbox record of a user-facing notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub user_id: UserId,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}
