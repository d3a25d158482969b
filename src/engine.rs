//! Ticket engine
//!
//! Entry point for every inbound intent. [`TicketEngine::handle`] registers
//! the sender, resolves any pending multi-step flow, runs the change through
//! one [`Store`] transaction and only then lets the notification dispatcher
//! and the stat aggregator react to what was committed.

use crate::config::{DeskConfig, LimitsConfig, SweeperConfig};
use crate::core::{
    Action, Actor, CategoryCatalog, Command, Feedback, Inbound, Message, Notification,
    StaticCatalog, Status, Ticket, TicketId, Transition, User, UserId, UserProfile,
};
use crate::error::{DeskError, Result};
use crate::notify::{Deliverer, Dispatcher, Notice};
use crate::session::{DraftCache, DraftStep, PendingFlow};
use crate::stats::StatAggregator;
use crate::storage::{Report, Store, TicketFilter, messages, notifications, reports, tickets, users};
use crate::sweeper::Sweeper;
use chrono::TimeDelta;
use mockable::{Clock, DefaultClock};
use serde::Serialize;
use std::sync::Arc;

/// Fresh ids tried before a creation clash is reported
const MAX_ID_ATTEMPTS: u32 = 5;

/// Default size of the operator queue
pub const DEFAULT_QUEUE_LIMIT: u32 = 10;

/// Default number of notifications listed
pub const DEFAULT_NOTIFICATION_LIMIT: u32 = 50;

/// Result of handling one inbound intent
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// A draft was started and is waiting for a category
    DraftStarted { ticket_id: TicketId },
    /// The draft has a category and is waiting for the description
    CategoryChosen { ticket_id: TicketId, category: String },
    Created { ticket: Ticket },
    Transitioned {
        action: String,
        previous: Status,
        ticket: Ticket,
    },
    /// The next text message from the sender continues `flow`
    AwaitingText { flow: PendingFlow },
    Abandoned { flow: Option<PendingFlow> },
    BanUpdated { user_id: UserId, banned: bool },
}

impl Outcome {
    /// Short confirmation for the sender
    #[must_use]
    pub fn reply_text(&self) -> String {
        match self {
            Self::DraftStarted { .. } => "Please choose the category of your problem.".to_string(),
            Self::CategoryChosen { category, .. } => {
                format!("Category: {category}\nPlease describe your problem.")
            },
            Self::Created { ticket } => format!("Ticket #{} created.", ticket.id),
            Self::Transitioned { action, ticket, .. } if action == "comment" => {
                format!("Message added to ticket #{}.", ticket.id)
            },
            Self::Transitioned { ticket, .. } => {
                format!("Ticket #{} is now {}.", ticket.id, ticket.status)
            },
            Self::AwaitingText { flow } => match flow {
                PendingFlow::Draft { .. } => "Please describe your problem.".to_string(),
                PendingFlow::Reply { ticket_id } => {
                    format!("Type your reply to ticket #{ticket_id}.")
                },
                PendingFlow::Note { ticket_id } => {
                    format!("Type an internal note for ticket #{ticket_id}.")
                },
                PendingFlow::Comment { ticket_id } => {
                    format!("Type your comment for ticket #{ticket_id}.")
                },
                PendingFlow::RejectReason { ticket_id } => {
                    format!("Type the reason for rejecting ticket #{ticket_id}.")
                },
            },
            Self::Abandoned { flow: Some(_) } => "Cancelled.".to_string(),
            Self::Abandoned { flow: None } => "Nothing to cancel.".to_string(),
            Self::BanUpdated {
                user_id,
                banned: true,
            } => format!("User {user_id} has been banned."),
            Self::BanUpdated { user_id, .. } => format!("User {user_id} has been unbanned."),
        }
    }
}

/// A ticket with its message trail, as shown to one viewer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TicketDetails {
    pub ticket: Ticket,
    pub messages: Vec<Message>,
    pub feedback: Option<Feedback>,
}

/// The support desk's ticket lifecycle engine
#[derive(Clone)]
pub struct TicketEngine {
    store: Store,
    drafts: Arc<DraftCache>,
    dispatcher: Dispatcher,
    stats: StatAggregator,
    catalog: Arc<dyn CategoryCatalog>,
    clock: Arc<dyn Clock>,
    operators: Arc<[UserId]>,
    limits: LimitsConfig,
    sweeper: SweeperConfig,
}

impl TicketEngine {
    /// Assemble an engine over an already migrated store
    pub fn new(
        store: Store,
        config: &DeskConfig,
        catalog: Arc<dyn CategoryCatalog>,
        deliverer: Arc<dyn Deliverer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            drafts: Arc::new(DraftCache::new(config.session.draft_ttl(), clock.clone())),
            dispatcher: Dispatcher::new(store.clone(), deliverer, clock.clone()),
            stats: StatAggregator::new(store.clone()),
            store,
            catalog,
            clock,
            operators: config.operators.iter().copied().collect(),
            limits: config.limits.clone(),
            sweeper: config.sweeper.clone(),
        }
    }

    /// Open the configured database, apply the schema and register operators
    pub async fn start(config: &DeskConfig, deliverer: Arc<dyn Deliverer>) -> Result<Self> {
        let store = Store::open(&config.database, &config.retry).await?;
        store.migrate().await?;

        let catalog: Arc<dyn CategoryCatalog> = match &config.catalog_path {
            Some(path) => Arc::new(StaticCatalog::load(path)?),
            None => Arc::new(StaticCatalog::builtin()),
        };

        let engine = Self::new(store, config, catalog, deliverer, Arc::new(DefaultClock));
        engine.ensure_operators().await?;
        tracing::info!(
            database = %config.database_path().display(),
            operators = engine.operators.len(),
            "Ticket engine started"
        );
        Ok(engine)
    }

    /// Make sure every configured operator has a user row
    pub async fn ensure_operators(&self) -> Result<()> {
        let operators = self.operators.clone();
        let now = self.clock.utc();
        self.store
            .execute("ensure operators", move |conn| {
                let operators = operators.clone();
                Box::pin(async move {
                    for operator in operators.iter() {
                        users::ensure(conn, *operator, now).await?;
                    }
                    Ok(())
                })
            })
            .await
    }

    #[must_use]
    pub const fn store(&self) -> &Store {
        &self.store
    }

    /// Background sweeper sharing this engine's store and dispatcher
    #[must_use]
    pub fn sweeper(&self) -> Sweeper {
        Sweeper::new(
            self.store.clone(),
            self.dispatcher.clone(),
            self.clock.clone(),
            self.sweeper.threshold(),
            self.sweeper.interval(),
        )
    }

    /// Actor role for `user_id`
    #[must_use]
    pub fn actor_for(&self, user_id: UserId) -> Actor {
        if self.operators.contains(&user_id) {
            Actor::Operator(user_id)
        } else {
            Actor::User(user_id)
        }
    }

    /// Handle one inbound intent end to end
    pub async fn handle(&self, inbound: Inbound) -> Result<Outcome> {
        let Inbound {
            actor_id,
            profile,
            command,
        } = inbound;
        let actor = self.actor_for(actor_id);
        tracing::debug!(%actor, command = command.name(), "Handling intent");

        self.register_user(actor_id, profile).await?;

        match command {
            Command::StartReport => Ok(Outcome::DraftStarted {
                ticket_id: self.drafts.begin_draft(actor_id),
            }),
            Command::ChooseCategory { category } => {
                self.catalog.resolve(&category)?;
                let ticket_id = self.drafts.choose_category(actor_id, &category);
                Ok(Outcome::CategoryChosen {
                    ticket_id,
                    category,
                })
            },
            Command::CreateTicket {
                category,
                description,
            } => {
                let ticket_id = self.fresh_ticket_id();
                let ticket = self
                    .create_ticket(actor_id, ticket_id, &category, &description)
                    .await?;
                Ok(Outcome::Created { ticket })
            },
            Command::Resolve { ticket_id } => self.transition(actor, ticket_id, Action::Resolve).await,
            Command::Reject { ticket_id, reason } => {
                self.transition(actor, ticket_id, Action::Reject { reason })
                    .await
            },
            Command::Cancel { ticket_id } => self.transition(actor, ticket_id, Action::Cancel).await,
            Command::Close { ticket_id } => self.transition(actor, ticket_id, Action::Close).await,
            Command::Rate {
                ticket_id,
                rating,
                comment,
            } => {
                self.transition(actor, ticket_id, Action::Rate { rating, comment })
                    .await
            },
            Command::Comment {
                ticket_id,
                text,
                internal,
            } => {
                self.transition(actor, ticket_id, Action::Comment { text, internal })
                    .await
            },
            Command::BeginReply { ticket_id } => {
                self.begin_flow(actor, PendingFlow::Reply { ticket_id }).await
            },
            Command::BeginNote { ticket_id } => {
                self.begin_flow(actor, PendingFlow::Note { ticket_id }).await
            },
            Command::BeginComment { ticket_id } => {
                self.begin_flow(actor, PendingFlow::Comment { ticket_id }).await
            },
            Command::BeginReject { ticket_id } => {
                self.begin_flow(actor, PendingFlow::RejectReason { ticket_id })
                    .await
            },
            Command::Text { body } => self.continue_flow(actor, body).await,
            Command::Abandon => Ok(Outcome::Abandoned {
                flow: self.drafts.cancel(actor_id),
            }),
            Command::SetBan { user_id, banned } => self.set_ban(actor, user_id, banned).await,
        }
    }

    /// Register the user on first contact and record activity
    pub async fn register_user(&self, user_id: UserId, profile: Option<UserProfile>) -> Result<()> {
        let now = self.clock.utc();
        self.store
            .execute("register user", move |conn| {
                let profile = profile.clone();
                Box::pin(async move { users::upsert(conn, user_id, profile.as_ref(), now).await })
            })
            .await
    }

    /// Id for a new ticket that no in-flight draft holds
    fn fresh_ticket_id(&self) -> TicketId {
        loop {
            let candidate = TicketId::generate();
            if !self.drafts.contains_ticket_id(&candidate) {
                return candidate;
            }
        }
    }

    fn check_length(&self, text: &str) -> Result<()> {
        let max = self.limits.max_message_length;
        if text.chars().count() > max {
            return Err(DeskError::validation(format!(
                "Message is too long (maximum {max} characters)"
            )));
        }
        Ok(())
    }

    /// Persist a completed draft as a new `Open` ticket
    ///
    /// On an id clash with an existing ticket a new id is drawn and the
    /// insert retried.
    pub async fn create_ticket(
        &self,
        user_id: UserId,
        ticket_id: TicketId,
        category: &str,
        description: &str,
    ) -> Result<Ticket> {
        let priority = self.catalog.resolve(category)?;
        self.check_length(description)?;

        let now = self.clock.utc();
        let mut ticket = Ticket::open(ticket_id, user_id, category, priority, description, now)?;
        let since = now - TimeDelta::hours(24);
        let daily_cap = i64::from(self.limits.max_daily_tickets);

        let mut attempt = 1;
        let ticket = loop {
            let candidate = ticket.clone();
            let created = self
                .store
                .execute("create ticket", move |conn| {
                    let ticket = candidate.clone();
                    Box::pin(async move {
                        let owner = users::load(conn, ticket.user_id).await?;
                        if owner.is_banned {
                            return Err(DeskError::NotPermitted {
                                action: "create".to_string(),
                                actor: owner.id,
                            });
                        }
                        if daily_cap > 0
                            && tickets::count_created_since(conn, owner.id, since).await? >= daily_cap
                        {
                            return Err(DeskError::validation(format!(
                                "You can open at most {daily_cap} tickets per day"
                            )));
                        }
                        tickets::insert(conn, &ticket).await?;
                        users::increment_requests(conn, owner.id).await?;
                        Ok(ticket)
                    })
                })
                .await;

            match created {
                Ok(ticket) => break ticket,
                Err(err) if err.is_unique_violation() && attempt < MAX_ID_ATTEMPTS => {
                    tracing::warn!(ticket_id = %ticket.id, attempt, "Ticket id already taken, drawing a new one");
                    ticket.id = self.fresh_ticket_id();
                    attempt += 1;
                },
                Err(err) => return Err(err),
            }
        };

        tracing::info!(
            ticket_id = %ticket.id,
            user_id,
            category = %ticket.category,
            priority = %ticket.priority,
            "Ticket created"
        );

        self.dispatcher
            .send(user_id, Notice::Created { ticket: &ticket })
            .await;
        for operator in self.operators.iter().filter(|op| **op != user_id) {
            self.dispatcher
                .send(*operator, Notice::NewTicket { ticket: &ticket })
                .await;
        }

        Ok(ticket)
    }

    /// Apply `action` to a stored ticket in one transaction
    pub async fn transition(&self, actor: Actor, ticket_id: TicketId, action: Action) -> Result<Outcome> {
        match &action {
            Action::Comment { text, .. } => self.check_length(text)?,
            Action::Reject { reason } => self.check_length(reason)?,
            _ => {},
        }

        let now = self.clock.utc();
        let operation = action.name();
        let committed = {
            let action = action.clone();
            self.store
                .execute(operation, move |conn| {
                    let ticket_id = ticket_id.clone();
                    let action = action.clone();
                    Box::pin(async move { apply_in_tx(conn, &ticket_id, &action, actor, now).await })
                })
                .await
        };

        let transition = match committed {
            Ok(transition) => transition,
            Err(err) => {
                tracing::debug!(%actor, action = operation, error = %err, "Intent rejected");
                return Err(err);
            },
        };

        tracing::info!(
            ticket_id = %transition.ticket.id,
            %actor,
            action = operation,
            from = %transition.previous,
            to = %transition.ticket.status,
            "Ticket updated"
        );

        self.after_commit(actor, &action, &transition).await;

        Ok(Outcome::Transitioned {
            action: operation.to_string(),
            previous: transition.previous,
            ticket: transition.ticket,
        })
    }

    /// Notifications and derived stats for a committed transition
    async fn after_commit(&self, actor: Actor, action: &Action, transition: &Transition) {
        let ticket = &transition.ticket;
        let owner = ticket.user_id;

        match action {
            Action::Resolve => {
                self.dispatcher.send(owner, Notice::Resolved { ticket }).await;
                self.stats.refresh(owner).await;
            },
            Action::Reject { reason } => {
                self.dispatcher
                    .send(
                        owner,
                        Notice::Rejected {
                            ticket,
                            reason: reason.trim(),
                        },
                    )
                    .await;
            },
            Action::Close => {
                self.dispatcher
                    .send(
                        owner,
                        Notice::Closed {
                            ticket,
                            by_operator: actor.is_operator() && !actor.owns(ticket),
                        },
                    )
                    .await;
            },
            Action::Rate { rating, .. } => {
                self.dispatcher
                    .send(
                        owner,
                        Notice::Rated {
                            ticket,
                            rating: *rating,
                        },
                    )
                    .await;
                self.stats.refresh(owner).await;
            },
            Action::Comment {
                text,
                internal: false,
            } if actor.is_operator() && !actor.owns(ticket) => {
                self.dispatcher
                    .send(
                        owner,
                        Notice::Reply {
                            ticket_id: &ticket.id,
                            text: text.trim(),
                        },
                    )
                    .await;
            },
            Action::Cancel | Action::AutoExpire { .. } | Action::Comment { .. } => {},
        }
    }

    /// Park a flow that waits for the sender's next text message
    async fn begin_flow(&self, actor: Actor, flow: PendingFlow) -> Result<Outcome> {
        let ticket_id = flow.ticket_id().clone();
        let ticket = self
            .store
            .execute("load ticket", move |conn| {
                let ticket_id = ticket_id.clone();
                Box::pin(async move { tickets::load(conn, &ticket_id).await })
            })
            .await?;

        let permitted = match flow {
            PendingFlow::Comment { .. } => actor.is_operator() || actor.owns(&ticket),
            PendingFlow::Draft { .. } => false,
            _ => actor.is_operator(),
        };
        let user_id = match (permitted, actor.id()) {
            (true, Some(user_id)) => user_id,
            _ => {
                return Err(DeskError::NotPermitted {
                    action: "reply to".to_string(),
                    actor: actor.id().unwrap_or_default(),
                });
            },
        };
        if matches!(flow, PendingFlow::RejectReason { .. }) && ticket.status != Status::Open {
            return Err(DeskError::InvalidTransition {
                action: "reject".to_string(),
                status: ticket.status,
            });
        }

        self.drafts.suspend(user_id, flow.clone());
        Ok(Outcome::AwaitingText { flow })
    }

    /// Feed a text message into the sender's pending flow
    ///
    /// When the text is rejected as invalid the flow stays pending so the
    /// sender can try again.
    async fn continue_flow(&self, actor: Actor, body: String) -> Result<Outcome> {
        let Some(user_id) = actor.id() else {
            return Err(DeskError::validation("Nothing is waiting for a message"));
        };
        let started_at = self.drafts.started_at(user_id);
        let Some(flow) = self.drafts.take(user_id) else {
            return Err(DeskError::validation(
                "Nothing is waiting for a message. Start by reporting a problem.",
            ));
        };

        let result = match &flow {
            PendingFlow::Draft {
                ticket_id,
                category: Some(category),
                step: DraftStep::AwaitingDescription,
            } => self
                .create_ticket(user_id, ticket_id.clone(), category, &body)
                .await
                .map(|ticket| Outcome::Created { ticket }),
            PendingFlow::Draft { .. } => Err(DeskError::validation(
                "Please choose a category first.",
            )),
            PendingFlow::Reply { ticket_id } | PendingFlow::Comment { ticket_id } => {
                self.transition(
                    actor,
                    ticket_id.clone(),
                    Action::Comment {
                        text: body,
                        internal: false,
                    },
                )
                .await
            },
            PendingFlow::Note { ticket_id } => {
                self.transition(
                    actor,
                    ticket_id.clone(),
                    Action::Comment {
                        text: body,
                        internal: true,
                    },
                )
                .await
            },
            PendingFlow::RejectReason { ticket_id } => {
                self.transition(actor, ticket_id.clone(), Action::Reject { reason: body })
                    .await
            },
        };

        if let (Err(DeskError::Validation(_)), Some(started_at)) = (&result, started_at) {
            self.drafts.restore(user_id, flow, started_at);
        }
        result
    }

    /// Ban or unban a user; operators only
    pub async fn set_ban(&self, actor: Actor, user_id: UserId, banned: bool) -> Result<Outcome> {
        if !actor.is_operator() {
            return Err(DeskError::NotPermitted {
                action: if banned { "ban" } else { "unban" }.to_string(),
                actor: actor.id().unwrap_or_default(),
            });
        }

        self.store
            .execute("set ban", move |conn| {
                Box::pin(async move { users::set_banned(conn, user_id, banned).await })
            })
            .await?;
        tracing::info!(%actor, user_id, banned, "Ban status changed");
        Ok(Outcome::BanUpdated { user_id, banned })
    }

    /// Drop pending flows that outlived their time to live
    pub fn purge_expired_flows(&self) -> usize {
        self.drafts.purge_expired()
    }

    pub async fn list_tickets(&self, filter: TicketFilter, limit: Option<u32>) -> Result<Vec<Ticket>> {
        self.store
            .execute("list tickets", move |conn| {
                Box::pin(async move { tickets::list(conn, filter, limit).await })
            })
            .await
    }

    /// Ticket and trail as `viewer` may see them
    ///
    /// Internal notes are only included for operators. Without a viewer the
    /// full trail is returned, as the operator console shows it.
    pub async fn ticket_details(
        &self,
        ticket_id: &TicketId,
        viewer: Option<UserId>,
    ) -> Result<TicketDetails> {
        let actor = viewer.map(|user_id| self.actor_for(user_id));
        let include_internal = actor.is_none_or(Actor::is_operator);
        let ticket_id = ticket_id.clone();
        let details = self
            .store
            .execute("ticket details", move |conn| {
                let ticket_id = ticket_id.clone();
                Box::pin(async move {
                    let ticket = tickets::load(conn, &ticket_id).await?;
                    let messages = messages::trail(conn, &ticket_id, include_internal).await?;
                    let feedback = messages::feedback_for(conn, &ticket_id).await?;
                    Ok(TicketDetails {
                        ticket,
                        messages,
                        feedback: feedback.into_iter().next(),
                    })
                })
            })
            .await?;

        match actor {
            Some(actor) if !actor.is_operator() && !actor.owns(&details.ticket) => {
                Err(DeskError::NotPermitted {
                    action: "view".to_string(),
                    actor: actor.id().unwrap_or_default(),
                })
            },
            _ => Ok(details),
        }
    }

    /// Unrated resolved tickets of `user_id`, newest first
    pub async fn pending_feedback(&self, user_id: UserId) -> Result<Vec<Ticket>> {
        self.store
            .execute("pending feedback", move |conn| {
                Box::pin(async move { tickets::pending_feedback(conn, user_id).await })
            })
            .await
    }

    pub async fn operator_queue(&self, limit: u32) -> Result<Vec<Ticket>> {
        self.store
            .execute("operator queue", move |conn| {
                Box::pin(async move { tickets::operator_queue(conn, limit).await })
            })
            .await
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        self.store
            .execute("list users", |conn| Box::pin(async move { users::list(conn).await }))
            .await
    }

    pub async fn recent_notifications(
        &self,
        user_id: Option<UserId>,
        limit: u32,
    ) -> Result<Vec<Notification>> {
        self.store
            .execute("recent notifications", move |conn| {
                Box::pin(async move { notifications::recent(conn, user_id, limit).await })
            })
            .await
    }

    /// Returns whether the notification existed
    pub async fn mark_notification_read(&self, id: i64) -> Result<bool> {
        self.store
            .execute("mark notification read", move |conn| {
                Box::pin(async move { notifications::mark_read(conn, id).await })
            })
            .await
    }

    pub async fn report(&self) -> Result<Report> {
        self.store
            .execute("report", |conn| Box::pin(async move { reports::full(conn).await }))
            .await
    }
}

/// Load, validate and write one transition
///
/// Runs inside a store transaction; any error rolls everything back.
async fn apply_in_tx(
    conn: &mut sqlx::SqliteConnection,
    ticket_id: &TicketId,
    action: &Action,
    actor: Actor,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<Transition> {
    let current = tickets::load(conn, ticket_id).await?;
    let transition = current.apply(action, actor, now)?;

    tickets::update_guarded(conn, &current, &transition.ticket).await?;
    if let Some(message) = &transition.message {
        messages::append(conn, ticket_id, message, now).await?;
    }
    if let Some(feedback) = &transition.feedback {
        messages::insert_feedback(conn, ticket_id, feedback, now).await?;
    }
    Ok(transition)
}
