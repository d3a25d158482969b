//! Handler for the `notifications` command

use super::{HandlerContext, format_datetime};
use crate::cli::OutputFormatter;
use crate::config::DeskConfig;
use crate::core::UserId;
use crate::error::Result;

/// List recent notifications, or mark one as read
pub async fn handle_notifications(
    user: Option<UserId>,
    limit: u32,
    mark_read: Option<i64>,
    config: &DeskConfig,
    output: &OutputFormatter,
) -> Result<()> {
    let ctx = HandlerContext::new(config).await?;

    if let Some(id) = mark_read {
        let found = ctx.engine.mark_notification_read(id).await?;
        if output.is_json() {
            output.print_json(&serde_json::json!({ "id": id, "marked_read": found }))?;
        } else if found {
            output.success(&format!("Notification {id} marked as read"));
        } else {
            output.warning(&format!("Notification {id} does not exist"));
        }
        ctx.shutdown().await;
        return Ok(());
    }

    let notifications = ctx.engine.recent_notifications(user, limit).await?;
    if output.is_json() {
        output.print_json(&notifications)?;
    } else if notifications.is_empty() {
        output.info("No notifications");
    } else {
        for notification in &notifications {
            let unread = if notification.is_read { " " } else { "*" };
            let first_line = notification.message.lines().next().unwrap_or_default();
            output.info(&format!(
                "{unread} {:>6}  {}  user {:<12} {}",
                notification.id,
                format_datetime(notification.created_at),
                notification.user_id,
                first_line
            ));
        }
    }

    ctx.shutdown().await;
    Ok(())
}
