//! Handler for the `list` command

use super::{HandlerContext, ticket_line};
use crate::cli::OutputFormatter;
use crate::config::DeskConfig;
use crate::core::{Status, UserId};
use crate::engine::DEFAULT_QUEUE_LIMIT;
use crate::error::Result;
use crate::storage::TicketFilter;

/// Tickets listed when no limit is given
const DEFAULT_LIST_LIMIT: u32 = 20;

/// Filters accepted by `list`
#[derive(Debug, Clone, Default)]
pub struct ListArgs {
    pub user: Option<UserId>,
    pub status: Option<String>,
    pub limit: Option<u32>,
    pub queue: bool,
}

impl ListArgs {
    /// Turn the flags into a store filter and row limit
    fn filter(&self) -> Result<(TicketFilter, Option<u32>)> {
        if let Some(user) = self.user {
            return Ok((TicketFilter::ByUser(user), self.limit));
        }
        if let Some(status) = &self.status {
            return Ok((TicketFilter::ByStatus(status.parse::<Status>()?), self.limit));
        }
        Ok((TicketFilter::Recent(self.limit.unwrap_or(DEFAULT_LIST_LIMIT)), None))
    }
}

pub async fn handle_list(
    args: ListArgs,
    config: &DeskConfig,
    output: &OutputFormatter,
) -> Result<()> {
    let ctx = HandlerContext::new(config).await?;

    let tickets = if args.queue {
        ctx.engine
            .operator_queue(args.limit.unwrap_or(DEFAULT_QUEUE_LIMIT))
            .await?
    } else {
        let (filter, limit) = args.filter()?;
        ctx.engine.list_tickets(filter, limit).await?
    };

    if output.is_json() {
        output.print_json(&tickets)?;
    } else if tickets.is_empty() {
        output.info("No tickets found");
    } else {
        for ticket in &tickets {
            output.info(&ticket_line(ticket));
        }
        output.info("");
        output.info(&format!("{} ticket(s)", tickets.len()));
    }

    ctx.shutdown().await;
    Ok(())
}
