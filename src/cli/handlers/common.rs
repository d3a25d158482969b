use crate::config::DeskConfig;
use crate::core::{Ticket, User};
use crate::engine::TicketEngine;
use crate::error::Result;
use crate::notify::{Deliverer, LogDeliverer};
use chrono::{DateTime, Local, Utc};
use std::sync::Arc;

/// Common context for all handler operations
pub struct HandlerContext {
    pub config: DeskConfig,
    pub engine: TicketEngine,
}

impl HandlerContext {
    /// Start an engine that only logs deliveries
    pub async fn new(config: &DeskConfig) -> Result<Self> {
        Self::with_deliverer(config, Arc::new(LogDeliverer)).await
    }

    /// Start an engine over `deliverer`
    pub async fn with_deliverer(config: &DeskConfig, deliverer: Arc<dyn Deliverer>) -> Result<Self> {
        let engine = TicketEngine::start(config, deliverer).await?;
        Ok(Self {
            config: config.clone(),
            engine,
        })
    }

    /// Release the database before exiting
    pub async fn shutdown(self) {
        self.engine.store().close().await;
    }
}

/// Format a timestamp in the local timezone
pub fn format_datetime(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

/// One-line summary of a ticket for list views
pub fn ticket_line(ticket: &Ticket) -> String {
    format!(
        "#{}  {:<9} {:<8} {:<24} {}  {}",
        ticket.id,
        ticket.status.as_str(),
        ticket.priority.as_str(),
        ticket.category,
        format_datetime(ticket.created_at),
        ticket.summary(40)
    )
}

/// One-line summary of a user for list views
pub fn user_line(user: &User) -> String {
    let rating = user
        .rating
        .map_or_else(|| "-".to_string(), |rating| format!("{rating:.1}"));
    format!(
        "{:>12}  {:<32} requests: {:<4} solved: {:<4} rating: {}{}",
        user.id,
        user.display_name(),
        user.requests_count,
        user.solved_issues,
        rating,
        if user.is_banned { "  [banned]" } else { "" }
    )
}
