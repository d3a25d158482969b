//! Notification dispatch
//!
//! After a ticket change commits, the engine hands the affected users a
//! [`Notice`]. The [`Dispatcher`] records it in the notification outbox and
//! then makes a single delivery attempt through a [`Deliverer`]. Neither
//! step can fail the change that triggered it.

use crate::core::{Notification, Ticket, TicketId, UserId};
use crate::error::{DeskError, Result};
use crate::storage::{Store, notifications};
use async_trait::async_trait;
use mockable::Clock;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Transport-facing delivery port
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Deliverer: Send + Sync {
    /// Hand `text` to the user's messaging channel
    async fn deliver(&self, user_id: UserId, text: &str) -> Result<()>;
}

/// A message handed to the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Delivery {
    pub user_id: UserId,
    pub text: String,
}

/// Deliverer that publishes on a broadcast channel
///
/// Delivery fails when nobody is subscribed.
pub struct BroadcastDeliverer {
    sender: broadcast::Sender<Delivery>,
}

impl std::fmt::Debug for BroadcastDeliverer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastDeliverer")
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

impl BroadcastDeliverer {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Delivery> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastDeliverer {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Deliverer for BroadcastDeliverer {
    async fn deliver(&self, user_id: UserId, text: &str) -> Result<()> {
        self.sender
            .send(Delivery {
                user_id,
                text: text.to_string(),
            })
            .map(|_| ())
            .map_err(|_| DeskError::DeliveryFailure {
                user_id,
                reason: "no transport is listening".to_string(),
            })
    }
}

/// Deliverer that only writes to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDeliverer;

#[async_trait]
impl Deliverer for LogDeliverer {
    async fn deliver(&self, user_id: UserId, text: &str) -> Result<()> {
        tracing::info!(user_id, text, "Notification");
        Ok(())
    }
}

/// User-facing events derived from committed changes
#[derive(Debug, Clone, Copy)]
pub enum Notice<'a> {
    /// Confirmation to the owner of a new ticket
    Created { ticket: &'a Ticket },
    /// Alert to an operator about a new ticket
    NewTicket { ticket: &'a Ticket },
    Resolved { ticket: &'a Ticket },
    Rejected { ticket: &'a Ticket, reason: &'a str },
    Closed { ticket: &'a Ticket, by_operator: bool },
    AutoClosed { ticket: &'a Ticket, inactivity_hours: u64 },
    /// Operator reply forwarded to the owner
    Reply { ticket_id: &'a TicketId, text: &'a str },
    Rated { ticket: &'a Ticket, rating: u8 },
}

impl Notice<'_> {
    #[must_use]
    pub fn text(&self) -> String {
        match self {
            Self::Created { ticket } => format!(
                "Your ticket #{} has been created.\nCategory: {}\nPriority: {}\nWe will get back to you as soon as possible.",
                ticket.id, ticket.category, ticket.priority
            ),
            Self::NewTicket { ticket } => format!(
                "New ticket #{} from user {}\nCategory: {}\nPriority: {}\n\n{}",
                ticket.id,
                ticket.user_id,
                ticket.category,
                ticket.priority,
                ticket.summary(200)
            ),
            Self::Resolved { ticket } => format!(
                "Your ticket #{} has been resolved. Please rate how we did (1-5).",
                ticket.id
            ),
            Self::Rejected { ticket, reason } => {
                format!("Your ticket #{} has been rejected.\nReason: {reason}", ticket.id)
            },
            Self::Closed {
                ticket,
                by_operator: true,
            } => format!("Your ticket #{} has been closed by support.", ticket.id),
            Self::Closed { ticket, .. } => format!("Ticket #{} is now closed.", ticket.id),
            Self::AutoClosed {
                ticket,
                inactivity_hours,
            } => format!(
                "Your ticket #{} was closed automatically after {inactivity_hours} hours without activity.",
                ticket.id
            ),
            Self::Reply { ticket_id, text } => {
                format!("Support replied on ticket #{ticket_id}:\n\n{text}")
            },
            Self::Rated { ticket, rating } => format!(
                "Thank you for rating ticket #{} with {rating}/5!",
                ticket.id
            ),
        }
    }
}

/// What happened to one notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyOutcome {
    /// Outbox row, if it could be written
    pub recorded: Option<Notification>,
    pub delivered: bool,
}

/// Records and delivers notifications
#[derive(Clone)]
pub struct Dispatcher {
    store: Store,
    deliverer: Arc<dyn Deliverer>,
    clock: Arc<dyn Clock>,
}

impl Dispatcher {
    pub fn new(store: Store, deliverer: Arc<dyn Deliverer>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            deliverer,
            clock,
        }
    }

    /// Record `notice` for `user_id` and try to deliver it once
    pub async fn send(&self, user_id: UserId, notice: Notice<'_>) -> NotifyOutcome {
        self.notify(user_id, &notice.text()).await
    }

    /// Record `text` for `user_id` and try to deliver it once
    ///
    /// Failures are logged and reflected in the outcome, never returned.
    pub async fn notify(&self, user_id: UserId, text: &str) -> NotifyOutcome {
        let created_at = self.clock.utc();
        let message = text.to_string();

        let recorded = match self
            .store
            .execute("record notification", move |conn| {
                let message = message.clone();
                Box::pin(async move {
                    notifications::insert(conn, user_id, &message, created_at).await
                })
            })
            .await
        {
            Ok(notification) => Some(notification),
            Err(err) => {
                tracing::error!(user_id, error = %err, "Failed to record notification");
                None
            },
        };

        let delivered = match self.deliverer.deliver(user_id, text).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(user_id, error = %err, "Notification delivery failed");
                false
            },
        };

        NotifyOutcome {
            recorded,
            delivered,
        }
    }
}
