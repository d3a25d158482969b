//! Handler for the `serve` command
//!
//! Every stdin line is one [`Inbound`] intent in JSON. Each is handled on its
//! own task, so slow intents never hold up the others. Replies and
//! notification deliveries are written to stdout as JSON lines by a single
//! writer task. The sweeper runs alongside until stdin closes or Ctrl-C is
//! received.

use super::HandlerContext;
use crate::cli::OutputFormatter;
use crate::config::DeskConfig;
use crate::core::{Inbound, UserId};
use crate::engine::{Outcome, TicketEngine};
use crate::error::{DeskError, Result};
use crate::notify::{BroadcastDeliverer, Delivery};
use serde::Serialize;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Capacity of the outbound line queue
const OUTBOUND_CAPACITY: usize = 256;

/// A line written to stdout
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServeEvent {
    /// Answer to one inbound line
    Reply {
        actor_id: Option<UserId>,
        ok: bool,
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        outcome: Option<Outcome>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Notification for the transport to hand to a user
    Delivery(Delivery),
}

/// Handle one raw inbound line
pub async fn respond(engine: &TicketEngine, line: &str) -> ServeEvent {
    let inbound: Inbound = match serde_json::from_str(line) {
        Ok(inbound) => inbound,
        Err(err) => {
            tracing::warn!(error = %err, "Malformed inbound line");
            return ServeEvent::Reply {
                actor_id: None,
                ok: false,
                text: "Could not understand the request.".to_string(),
                outcome: None,
                error: Some(err.to_string()),
            };
        },
    };

    let actor_id = Some(inbound.actor_id);
    match engine.handle(inbound).await {
        Ok(outcome) => ServeEvent::Reply {
            actor_id,
            ok: true,
            text: outcome.reply_text(),
            outcome: Some(outcome),
            error: None,
        },
        Err(err) => {
            if matches!(
                err,
                DeskError::Database(_) | DeskError::Io(_) | DeskError::Timeout { .. }
            ) {
                tracing::error!(actor_id, error = %err, "Intent failed");
            }
            ServeEvent::Reply {
                actor_id,
                ok: false,
                text: err.user_message(),
                outcome: None,
                error: Some(err.to_string()),
            }
        },
    }
}

pub async fn handle_serve(
    no_sweeper: bool,
    config: &DeskConfig,
    output: &OutputFormatter,
) -> Result<()> {
    let deliverer = Arc::new(BroadcastDeliverer::default());
    let deliveries = deliverer.subscribe();
    let ctx = HandlerContext::with_deliverer(config, deliverer).await?;
    let shutdown = CancellationToken::new();
    let (events, outbound) = mpsc::channel(OUTBOUND_CAPACITY);

    let writer = tokio::spawn(write_events(outbound));
    let forwarder = tokio::spawn(forward_deliveries(deliveries, events.clone(), shutdown.clone()));

    let sweeper = (ctx.config.sweeper.enabled && !no_sweeper)
        .then(|| tokio::spawn(ctx.engine.sweeper().run(shutdown.clone())));
    let purger = tokio::spawn(purge_flows(
        ctx.engine.clone(),
        ctx.config.session.draft_ttl(),
        shutdown.clone(),
    ));

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received, shutting down");
                shutdown.cancel();
            }
        });
    }

    output.warning("Reading intents from stdin, one JSON object per line");
    tracing::info!("Serving");

    let handled = read_intents(
        BufReader::new(tokio::io::stdin()),
        &ctx.engine,
        &events,
        &shutdown,
    )
    .await;
    tracing::debug!(handled, "Input finished");
    shutdown.cancel();

    for task in [Some(forwarder), sweeper, Some(purger)].into_iter().flatten() {
        if let Err(err) = task.await {
            tracing::error!(error = %err, "Background task panicked");
        }
    }
    drop(events);
    match writer.await {
        Ok(result) => result?,
        Err(err) => tracing::error!(error = %err, "Writer task panicked"),
    }

    ctx.shutdown().await;
    tracing::info!("Stopped");
    Ok(())
}

/// Handle every intent line from `reader` until EOF or `shutdown`
///
/// A line that is not valid UTF-8 is answered with an error reply and
/// skipped. Any other read error ends the input. Returns once every spawned
/// intent has finished, with the number of lines handled.
async fn read_intents<R>(
    reader: R,
    engine: &TicketEngine,
    events: &mpsc::Sender<ServeEvent>,
    shutdown: &CancellationToken,
) -> usize
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut handlers = JoinSet::new();
    let mut handled = 0;

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) if line.trim().is_empty() => {},
                Ok(Some(line)) => {
                    handled += 1;
                    let engine = engine.clone();
                    let events = events.clone();
                    handlers.spawn(async move {
                        let event = respond(&engine, &line).await;
                        if events.send(event).await.is_err() {
                            tracing::warn!("Output closed, dropping reply");
                        }
                    });
                },
                Ok(None) => break,
                Err(err) if err.kind() == std::io::ErrorKind::InvalidData => {
                    tracing::warn!(error = %err, "Skipping unreadable input line");
                    let event = ServeEvent::Reply {
                        actor_id: None,
                        ok: false,
                        text: "Could not understand the request.".to_string(),
                        outcome: None,
                        error: Some(err.to_string()),
                    };
                    if events.send(event).await.is_err() {
                        tracing::warn!("Output closed, dropping reply");
                    }
                },
                Err(err) => {
                    tracing::error!(error = %err, "Reading input failed, shutting down");
                    break;
                },
            },
        }
    }

    // Let in-flight intents finish before the background tasks stop
    while let Some(joined) = handlers.join_next().await {
        if let Err(err) = joined {
            tracing::error!(error = %err, "Intent task panicked");
        }
    }
    handled
}

/// Write every event to stdout until all senders are gone
async fn write_events(mut outbound: mpsc::Receiver<ServeEvent>) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    while let Some(event) = outbound.recv().await {
        let mut line = serde_json::to_vec(&event)?;
        line.push(b'\n');
        stdout.write_all(&line).await?;
        stdout.flush().await?;
    }
    Ok(())
}

/// Relay broadcast deliveries to the writer
///
/// Pending deliveries are drained before honouring `shutdown`.
async fn forward_deliveries(
    mut deliveries: broadcast::Receiver<Delivery>,
    events: mpsc::Sender<ServeEvent>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            received = deliveries.recv() => match received {
                Ok(delivery) => {
                    if events.send(ServeEvent::Delivery(delivery)).await.is_err() {
                        break;
                    }
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Delivery relay fell behind");
                },
                Err(broadcast::error::RecvError::Closed) => break,
            },
            () = shutdown.cancelled() => break,
        }
    }
}

async fn purge_flows(engine: TicketEngine, every: std::time::Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(every.max(std::time::Duration::from_secs(1)));
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let purged = engine.purge_expired_flows();
                if purged > 0 {
                    tracing::debug!(purged, "Expired pending flows dropped");
                }
            },
        }
    }
}
