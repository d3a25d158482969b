use super::{Priority, Status, Ticket, TicketId, UserId};
use chrono::{DateTime, Utc};

/// Builder for creating Ticket instances
#[derive(Default)]
pub struct TicketBuilder {
    id: Option<TicketId>,
    user_id: UserId,
    category: Option<String>,
    priority: Priority,
    description: Option<String>,
    status: Option<Status>,
    created_at: Option<DateTime<Utc>>,
    last_update: Option<DateTime<Utc>>,
    assigned_to: Option<UserId>,
    response_time: Option<i64>,
    rating: Option<u8>,
}

impl TicketBuilder {
    /// Create a new ticket builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the ticket ID
    #[must_use]
    pub fn id(mut self, id: TicketId) -> Self {
        self.id = Some(id);
        self
    }

    /// Set the owning user
    #[must_use]
    pub const fn user_id(mut self, user_id: UserId) -> Self {
        self.user_id = user_id;
        self
    }

    /// Set the category
    #[must_use]
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Set the priority
    #[must_use]
    pub const fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the description
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the status
    #[must_use]
    pub const fn status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    /// Set `created_at` timestamp
    #[must_use]
    pub const fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Set `last_update` timestamp
    #[must_use]
    pub const fn last_update(mut self, last_update: DateTime<Utc>) -> Self {
        self.last_update = Some(last_update);
        self
    }

    /// Set the assigned operator
    #[must_use]
    pub const fn assigned_to(mut self, operator: UserId) -> Self {
        self.assigned_to = Some(operator);
        self
    }

    /// Set the response time in minutes
    #[must_use]
    pub const fn response_time(mut self, minutes: i64) -> Self {
        self.response_time = Some(minutes);
        self
    }

    /// Set the satisfaction rating
    #[must_use]
    pub const fn rating(mut self, rating: u8) -> Self {
        self.rating = Some(rating);
        self
    }

    /// Build the ticket
    ///
    /// Missing fields fall back to a generated ID, `other` category, `Open`
    /// status and the current time; `last_update` defaults to `created_at`.
    #[must_use]
    pub fn build(self) -> Ticket {
        let created_at = self.created_at.unwrap_or_else(Utc::now);

        Ticket {
            id: self.id.unwrap_or_else(TicketId::generate),
            user_id: self.user_id,
            category: self.category.unwrap_or_else(|| "other".to_string()),
            priority: self.priority,
            description: self.description.unwrap_or_default(),
            status: self.status.unwrap_or(Status::Open),
            created_at,
            last_update: self.last_update.unwrap_or(created_at),
            assigned_to: self.assigned_to,
            response_time: self.response_time,
            rating: self.rating,
        }
    }
}
