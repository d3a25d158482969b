//! Handler for the `users` command

use super::{HandlerContext, user_line};
use crate::cli::OutputFormatter;
use crate::config::DeskConfig;
use crate::error::Result;

/// List users, busiest first
pub async fn handle_users(config: &DeskConfig, output: &OutputFormatter) -> Result<()> {
    let ctx = HandlerContext::new(config).await?;
    let users = ctx.engine.list_users().await?;

    if output.is_json() {
        output.print_json(&users)?;
    } else if users.is_empty() {
        output.info("No users registered yet");
    } else {
        for user in &users {
            output.info(&user_line(user));
        }
    }

    ctx.shutdown().await;
    Ok(())
}
