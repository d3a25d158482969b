//! Suspended multi-step flows
//!
//! Some intents need a follow-up message from the same user: a ticket draft
//! waits for its description, an operator reply or rejection waits for its
//! text. The [`DraftCache`] keeps one pending flow per user between inbound
//! events. It is process-local; a restart drops every flow, which is fine
//! because nothing has been committed for them yet.

use crate::core::{TicketId, UserId};
use chrono::{DateTime, TimeDelta, Utc};
use mockable::Clock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Where a ticket draft is in the report flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftStep {
    AwaitingCategory,
    AwaitingDescription,
}

/// A flow waiting for the user's next text message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "flow", rename_all = "snake_case")]
pub enum PendingFlow {
    /// New ticket with a pre-generated id
    Draft {
        ticket_id: TicketId,
        category: Option<String>,
        step: DraftStep,
    },
    /// Operator reply shown to the owner
    Reply { ticket_id: TicketId },
    /// Operator-only note
    Note { ticket_id: TicketId },
    /// Comment from the ticket owner
    Comment { ticket_id: TicketId },
    /// Operator is typing a rejection reason
    RejectReason { ticket_id: TicketId },
}

impl PendingFlow {
    #[must_use]
    pub const fn ticket_id(&self) -> &TicketId {
        match self {
            Self::Draft { ticket_id, .. }
            | Self::Reply { ticket_id }
            | Self::Note { ticket_id }
            | Self::Comment { ticket_id }
            | Self::RejectReason { ticket_id } => ticket_id,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    flow: PendingFlow,
    started_at: DateTime<Utc>,
}

/// Per-user pending flows with expiry
pub struct DraftCache {
    entries: Mutex<HashMap<UserId, Entry>>,
    ttl: TimeDelta,
    clock: Arc<dyn Clock>,
}

impl DraftCache {
    #[must_use]
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<UserId, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_expired(&self, entry: &Entry, now: DateTime<Utc>) -> bool {
        now - entry.started_at > self.ttl
    }

    /// Start a fresh ticket draft, replacing whatever `user_id` had pending
    ///
    /// The generated id is distinct from every other draft in flight.
    pub fn begin_draft(&self, user_id: UserId) -> TicketId {
        let now = self.clock.utc();
        let mut entries = self.lock();
        entries.remove(&user_id);

        let ticket_id = loop {
            let candidate = TicketId::generate();
            let taken = entries.values().any(|entry| {
                !self.is_expired(entry, now) && entry.flow.ticket_id() == &candidate
            });
            if !taken {
                break candidate;
            }
        };

        entries.insert(
            user_id,
            Entry {
                flow: PendingFlow::Draft {
                    ticket_id: ticket_id.clone(),
                    category: None,
                    step: DraftStep::AwaitingCategory,
                },
                started_at: now,
            },
        );
        tracing::debug!(user_id, ticket_id = %ticket_id, "Draft started");
        ticket_id
    }

    /// Record the category on the user's draft, starting one if needed
    pub fn choose_category(&self, user_id: UserId, category: &str) -> TicketId {
        let now = self.clock.utc();
        {
            let mut entries = self.lock();
            if let Some(entry) = entries.get_mut(&user_id) {
                if !self.is_expired(entry, now) {
                    if let PendingFlow::Draft {
                        ticket_id,
                        category: chosen,
                        step,
                    } = &mut entry.flow
                    {
                        *chosen = Some(category.to_string());
                        *step = DraftStep::AwaitingDescription;
                        return ticket_id.clone();
                    }
                }
            }
        }

        let ticket_id = self.begin_draft(user_id);
        let mut entries = self.lock();
        if let Some(Entry {
            flow: PendingFlow::Draft {
                category: chosen,
                step,
                ..
            },
            ..
        }) = entries.get_mut(&user_id)
        {
            *chosen = Some(category.to_string());
            *step = DraftStep::AwaitingDescription;
        }
        ticket_id
    }

    /// Park `flow` until the user's next message
    pub fn suspend(&self, user_id: UserId, flow: PendingFlow) {
        let started_at = self.clock.utc();
        tracing::debug!(user_id, ticket_id = %flow.ticket_id(), "Flow suspended");
        self.lock().insert(user_id, Entry { flow, started_at });
    }

    /// Remove and return the pending flow; expired flows count as absent
    pub fn take(&self, user_id: UserId) -> Option<PendingFlow> {
        let now = self.clock.utc();
        let entry = self.lock().remove(&user_id)?;
        if self.is_expired(&entry, now) {
            tracing::debug!(user_id, "Pending flow expired");
            None
        } else {
            Some(entry.flow)
        }
    }

    /// Put back a flow that was taken but could not be completed
    ///
    /// The original start time is kept so a failing flow still expires.
    pub fn restore(&self, user_id: UserId, flow: PendingFlow, started_at: DateTime<Utc>) {
        self.lock()
            .entry(user_id)
            .or_insert(Entry { flow, started_at });
    }

    /// Start time of the user's pending flow
    pub fn started_at(&self, user_id: UserId) -> Option<DateTime<Utc>> {
        self.lock().get(&user_id).map(|entry| entry.started_at)
    }

    /// Drop the user's pending flow
    pub fn cancel(&self, user_id: UserId) -> Option<PendingFlow> {
        let flow = self.take(user_id);
        if flow.is_some() {
            tracing::debug!(user_id, "Pending flow cancelled");
        }
        flow
    }

    /// Remove every expired flow, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.utc();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| !self.is_expired(entry, now));
        before - entries.len()
    }

    /// Whether an unexpired flow refers to `ticket_id`
    pub fn contains_ticket_id(&self, ticket_id: &TicketId) -> bool {
        let now = self.clock.utc();
        self.lock()
            .values()
            .any(|entry| !self.is_expired(entry, now) && entry.flow.ticket_id() == ticket_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
