use super::{TicketBuilder, UserId};
use crate::error::{DeskError, Result};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Human-readable ticket identifier
///
/// Eight characters drawn from `A-Z0-9`, generated once at draft time and
/// immutable afterwards. Uniqueness is enforced by the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TicketId(String);

impl TicketId {
    /// Number of characters in every identifier
    pub const LENGTH: usize = 8;

    const ALPHABET: &'static [u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

    /// Generate a fresh random identifier
    #[must_use]
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let id = (0..Self::LENGTH)
            .map(|_| char::from(Self::ALPHABET[rng.gen_range(0..Self::ALPHABET.len())]))
            .collect();
        Self(id)
    }

    /// Parse a user-supplied identifier, accepting lowercase input
    pub fn parse_str(s: &str) -> Result<Self> {
        let candidate = s.trim().trim_start_matches('#').to_ascii_uppercase();
        if candidate.len() == Self::LENGTH
            && candidate.bytes().all(|b| Self::ALPHABET.contains(&b))
        {
            Ok(Self(candidate))
        } else {
            Err(DeskError::validation(format!("Invalid ticket ID: {s}")))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TicketId {
    type Err = DeskError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_str(s)
    }
}

impl TryFrom<String> for TicketId {
    type Error = DeskError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse_str(&value)
    }
}

impl From<TicketId> for String {
    fn from(id: TicketId) -> Self {
        id.0
    }
}

/// Ticket priority, ordered from least to most urgent
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = DeskError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(DeskError::validation(format!("Unknown priority: {other}"))),
        }
    }
}

/// Lifecycle status of a ticket
///
/// `Open` is the initial state. `Closed`, `Cancelled` and `Rejected` are
/// terminal: no transition other than appending a comment is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Open,
    Resolved,
    Closed,
    Cancelled,
    Rejected,
}

impl Status {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
            Self::Cancelled => "cancelled",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = DeskError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "resolved" => Ok(Self::Resolved),
            "closed" => Ok(Self::Closed),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            "rejected" => Ok(Self::Rejected),
            other => Err(DeskError::validation(format!("Unknown status: {other}"))),
        }
    }
}

/// A support ticket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    /// Owning user
    pub user_id: UserId,
    pub category: String,
    pub priority: Priority,
    /// Free-text problem description
    pub description: String,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    /// Operator who first acted on the ticket
    pub assigned_to: Option<UserId>,
    /// Minutes from creation to the first transition out of `Open`
    pub response_time: Option<i64>,
    /// Satisfaction rating (1-5), set at most once
    pub rating: Option<u8>,
}

impl Ticket {
    /// Open a new ticket from a completed draft
    ///
    /// The description must contain something other than whitespace.
    pub fn open(
        id: TicketId,
        user_id: UserId,
        category: &str,
        priority: Priority,
        description: &str,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let description = description.trim();
        if description.is_empty() {
            return Err(DeskError::validation("Problem description cannot be empty"));
        }
        if category.trim().is_empty() {
            return Err(DeskError::validation("A category must be chosen first"));
        }

        Ok(TicketBuilder::new()
            .id(id)
            .user_id(user_id)
            .category(category.trim())
            .priority(priority)
            .description(description)
            .created_at(now)
            .build())
    }

    /// Whether `user_id` owns this ticket
    #[must_use]
    pub const fn is_owned_by(&self, user_id: UserId) -> bool {
        self.user_id == user_id
    }

    /// First characters of the description, for list views
    #[must_use]
    pub fn summary(&self, max_chars: usize) -> String {
        if self.description.chars().count() <= max_chars {
            self.description.clone()
        } else {
            let head: String = self.description.chars().take(max_chars).collect();
            format!("{head}...")
        }
    }
}
