//! Handler for the `show` command

use super::{HandlerContext, format_datetime};
use crate::cli::OutputFormatter;
use crate::config::DeskConfig;
use crate::core::{TicketId, UserId};
use crate::engine::TicketDetails;
use crate::error::Result;
use colored::Colorize;

/// Show a ticket with its trail and feedback
///
/// With `viewer` set, the ticket is shown the way that user would see it:
/// internal notes are hidden from non-operators and strangers are refused.
pub async fn handle_show(
    ticket: &str,
    viewer: Option<UserId>,
    config: &DeskConfig,
    output: &OutputFormatter,
) -> Result<()> {
    let ticket_id = TicketId::parse_str(ticket)?;
    let ctx = HandlerContext::new(config).await?;
    let details = ctx.engine.ticket_details(&ticket_id, viewer).await?;

    if output.is_json() {
        output.print_json(&details)?;
    } else {
        display_details(&details, output);
    }

    ctx.shutdown().await;
    Ok(())
}

fn display_details(details: &TicketDetails, output: &OutputFormatter) {
    let ticket = &details.ticket;
    output.heading(&format!("Ticket #{}", ticket.id));
    output.info(&format!("Status:   {}", ticket.status));
    output.info(&format!("Priority: {}", ticket.priority));
    output.info(&format!("Category: {}", ticket.category));
    output.info(&format!("User:     {}", ticket.user_id));
    output.info(&format!("Created:  {}", format_datetime(ticket.created_at)));
    output.info(&format!("Updated:  {}", format_datetime(ticket.last_update)));
    if let Some(operator) = ticket.assigned_to {
        output.info(&format!("Assigned: {operator}"));
    }
    if let Some(minutes) = ticket.response_time {
        output.info(&format!("Response: {minutes} min"));
    }
    output.info("");
    output.info(&ticket.description);

    if !details.messages.is_empty() {
        output.info("");
        output.heading("Messages");
        for message in &details.messages {
            let marker = if message.internal {
                " [internal]".dimmed().to_string()
            } else {
                String::new()
            };
            output.info(&format!(
                "{} {}{}: {}",
                format_datetime(message.sent_at),
                message.sender_id,
                marker,
                message.body
            ));
        }
    }

    if let Some(feedback) = &details.feedback {
        output.info("");
        output.info(&format!("Rating: {}/5", feedback.rating));
        if let Some(comment) = &feedback.comment {
            output.info(&format!("Comment: {comment}"));
        }
    }
}
