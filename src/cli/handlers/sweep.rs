//! Handler for the `sweep` command

use super::HandlerContext;
use crate::cli::OutputFormatter;
use crate::config::DeskConfig;
use crate::error::Result;

/// Run a single auto-close cycle and report what it did
pub async fn handle_sweep(config: &DeskConfig, output: &OutputFormatter) -> Result<()> {
    let ctx = HandlerContext::new(config).await?;
    let report = ctx.engine.sweeper().sweep().await?;

    if output.is_json() {
        output.print_json(&report)?;
    } else if report.examined == 0 {
        output.info(&format!(
            "No open tickets idle for more than {} hours",
            ctx.config.sweeper.inactivity_hours
        ));
    } else {
        output.success(&format!(
            "Closed {} of {} idle tickets",
            report.closed, report.examined
        ));
        if report.skipped > 0 {
            output.info(&format!("  Skipped (updated meanwhile): {}", report.skipped));
        }
        if report.failed > 0 {
            output.warning(&format!("{} tickets could not be closed", report.failed));
        }
    }

    ctx.shutdown().await;
    Ok(())
}
