//! Typed intents
//!
//! Inbound events arrive from the transport already parsed into a
//! [`Command`]. Commands that change a ticket are lowered into an [`Action`]
//! which the lifecycle state machine matches exhaustively.

use super::{Ticket, TicketId, UserId, UserProfile};
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Who is performing an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", content = "id", rename_all = "snake_case")]
pub enum Actor {
    User(UserId),
    Operator(UserId),
    /// The background auto-close sweeper
    Sweeper,
}

impl Actor {
    /// Identity of the actor, if it is a person
    #[must_use]
    pub const fn id(self) -> Option<UserId> {
        match self {
            Self::User(id) | Self::Operator(id) => Some(id),
            Self::Sweeper => None,
        }
    }

    #[must_use]
    pub const fn is_operator(self) -> bool {
        matches!(self, Self::Operator(_))
    }

    /// Whether the actor owns the ticket
    #[must_use]
    pub const fn owns(self, ticket: &Ticket) -> bool {
        match self.id() {
            Some(id) => ticket.is_owned_by(id),
            None => false,
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user {id}"),
            Self::Operator(id) => write!(f, "operator {id}"),
            Self::Sweeper => f.write_str("sweeper"),
        }
    }
}

/// A lifecycle action against an existing ticket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Resolve,
    Reject { reason: String },
    Cancel,
    /// Force-close an `Open` ticket idle for longer than `threshold`
    AutoExpire { threshold: TimeDelta },
    Rate { rating: u8, comment: Option<String> },
    Close,
    Comment { text: String, internal: bool },
}

impl Action {
    /// Intent name used in errors and logs
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Resolve => "resolve",
            Self::Reject { .. } => "reject",
            Self::Cancel => "cancel",
            Self::AutoExpire { .. } => "auto-expire",
            Self::Rate { .. } => "rate",
            Self::Close => "close",
            Self::Comment { .. } => "comment",
        }
    }
}

/// A parsed inbound intent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Command {
    /// Begin the "report a problem" flow
    StartReport,
    /// Pick the category of the draft in progress
    ChooseCategory { category: String },
    /// Create a ticket in one step
    CreateTicket {
        category: String,
        description: String,
    },
    Resolve { ticket_id: TicketId },
    Reject { ticket_id: TicketId, reason: String },
    Cancel { ticket_id: TicketId },
    Rate {
        ticket_id: TicketId,
        rating: u8,
        #[serde(default)]
        comment: Option<String>,
    },
    Comment {
        ticket_id: TicketId,
        text: String,
        #[serde(default)]
        internal: bool,
    },
    Close { ticket_id: TicketId },
    /// Operator starts typing a reply to the owner
    BeginReply { ticket_id: TicketId },
    /// Operator starts typing an internal note
    BeginNote { ticket_id: TicketId },
    /// User starts typing a comment
    BeginComment { ticket_id: TicketId },
    /// Operator starts typing a rejection reason
    BeginReject { ticket_id: TicketId },
    /// Free text that continues whatever flow is pending for the sender
    Text { body: String },
    /// Drop the pending flow without side effects
    Abandon,
    /// Ban or unban a user
    SetBan { user_id: UserId, banned: bool },
}

impl Command {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::StartReport => "start_report",
            Self::ChooseCategory { .. } => "choose_category",
            Self::CreateTicket { .. } => "create_ticket",
            Self::Resolve { .. } => "resolve",
            Self::Reject { .. } => "reject",
            Self::Cancel { .. } => "cancel",
            Self::Rate { .. } => "rate",
            Self::Comment { .. } => "comment",
            Self::Close { .. } => "close",
            Self::BeginReply { .. } => "begin_reply",
            Self::BeginNote { .. } => "begin_note",
            Self::BeginComment { .. } => "begin_comment",
            Self::BeginReject { .. } => "begin_reject",
            Self::Text { .. } => "text",
            Self::Abandon => "abandon",
            Self::SetBan { .. } => "set_ban",
        }
    }
}

/// An intent together with the identity that sent it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inbound {
    pub actor_id: UserId,
    #[serde(default)]
    pub profile: Option<UserProfile>,
    #[serde(flatten)]
    pub command: Command,
}

impl Inbound {
    #[must_use]
    pub const fn new(actor_id: UserId, command: Command) -> Self {
        Self {
            actor_id,
            profile: None,
            command,
        }
    }

    #[must_use]
    pub fn with_profile(mut self, profile: UserProfile) -> Self {
        self.profile = Some(profile);
        self
    }
}
