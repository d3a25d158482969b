//! Handler for the `report` command

use super::HandlerContext;
use crate::cli::OutputFormatter;
use crate::config::DeskConfig;
use crate::error::Result;
use crate::storage::Report;

pub async fn handle_report(config: &DeskConfig, output: &OutputFormatter) -> Result<()> {
    let ctx = HandlerContext::new(config).await?;
    let report = ctx.engine.report().await?;

    if output.is_json() {
        output.print_json(&report)?;
    } else {
        display_report(&report, output);
    }

    ctx.shutdown().await;
    Ok(())
}

fn display_report(report: &Report, output: &OutputFormatter) {
    let summary = &report.summary;
    output.heading("Summary");
    output.info(&format!("  Total tickets: {}", summary.total));
    output.info(&format!("  Solved: {}", summary.solved));
    output.info(&format!(
        "  Average response time: {}",
        summary
            .avg_response_time
            .map_or_else(|| "-".to_string(), |minutes| format!("{minutes:.1} min"))
    ));
    output.info(&format!(
        "  Average rating: {}",
        summary
            .avg_rating
            .map_or_else(|| "-".to_string(), |rating| format!("{rating:.2}"))
    ));

    if !report.by_category.is_empty() {
        output.info("");
        output.heading("By category");
        for row in &report.by_category {
            output.info(&format!("  {:<28} {}", row.category, row.count));
        }
    }

    if !report.by_priority.is_empty() {
        output.info("");
        output.heading("By priority");
        for row in &report.by_priority {
            let avg = row
                .avg_response_time
                .map_or_else(|| "-".to_string(), |minutes| format!("{minutes:.1} min"));
            output.info(&format!("  {:<10} {:<6} avg response: {avg}", row.priority.as_str(), row.count));
        }
    }

    if !report.by_hour.is_empty() {
        output.info("");
        output.heading("By hour (UTC)");
        for row in &report.by_hour {
            output.info(&format!("  {:02}:00  {}", row.hour, row.count));
        }
    }

    if !report.by_weekday.is_empty() {
        output.info("");
        output.heading("By weekday");
        for row in &report.by_weekday {
            output.info(&format!("  {:<10} {}", row.name(), row.count));
        }
    }
}
