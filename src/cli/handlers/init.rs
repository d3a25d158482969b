//! Handler for the `init` command

use super::HandlerContext;
use crate::cli::OutputFormatter;
use crate::config::DeskConfig;
use crate::error::Result;

/// Create the database and its schema
///
/// Safe to run against an existing database; tables that already exist are
/// left alone.
pub async fn handle_init(config: &DeskConfig, output: &OutputFormatter) -> Result<()> {
    let ctx = HandlerContext::new(config).await?;
    let path = ctx.config.database_path().to_path_buf();

    if output.is_json() {
        output.print_json(&serde_json::json!({
            "status": "initialized",
            "database": path,
            "operators": ctx.config.operators,
        }))?;
    } else {
        output.success(&format!("Initialized database at {}", path.display()));
        if ctx.config.operators.is_empty() {
            output.warning("No operators configured; set `operators` in the config file");
        }
    }

    ctx.shutdown().await;
    Ok(())
}
