//! Auto-close sweeper
//!
//! Periodically closes `Open` tickets nobody has touched for longer than the
//! inactivity threshold. Each ticket is expired in its own transaction with
//! the threshold re-checked against fresh state, so a ticket updated after
//! the candidate scan is skipped rather than closed.

use crate::core::{Action, Actor, Ticket};
use crate::error::{DeskError, Result};
use crate::notify::{Dispatcher, Notice};
use crate::storage::{Store, tickets};
use chrono::{DateTime, TimeDelta, Utc};
use mockable::Clock;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Counts from one sweep cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Candidates returned by the scan
    pub examined: usize,
    pub closed: usize,
    /// Candidates that were no longer eligible
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct Sweeper {
    store: Store,
    dispatcher: Dispatcher,
    clock: Arc<dyn Clock>,
    threshold: TimeDelta,
    interval: Duration,
}

impl Sweeper {
    pub fn new(
        store: Store,
        dispatcher: Dispatcher,
        clock: Arc<dyn Clock>,
        threshold: TimeDelta,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            dispatcher,
            clock,
            threshold,
            interval,
        }
    }

    /// Run one cycle at the current clock time
    pub async fn sweep(&self) -> Result<SweepReport> {
        self.sweep_at(self.clock.utc()).await
    }

    /// Run one cycle as if the time were `now`
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let Some(cutoff) = now.checked_sub_signed(self.threshold) else {
            tracing::warn!(
                threshold_hours = self.threshold.num_hours(),
                "Inactivity threshold is out of range, nothing to sweep"
            );
            return Ok(SweepReport::default());
        };
        let candidates = self
            .store
            .execute("scan overdue tickets", move |conn| {
                Box::pin(async move { tickets::overdue(conn, cutoff).await })
            })
            .await?;

        let mut report = SweepReport {
            examined: candidates.len(),
            ..SweepReport::default()
        };

        for candidate in candidates {
            match self.expire(&candidate, now).await {
                Ok(ticket) => {
                    report.closed += 1;
                    tracing::info!(
                        ticket_id = %ticket.id,
                        user_id = ticket.user_id,
                        "Ticket auto-closed after inactivity"
                    );
                    let hours = u64::try_from(self.threshold.num_hours()).unwrap_or_default();
                    self.dispatcher
                        .send(
                            ticket.user_id,
                            Notice::AutoClosed {
                                ticket: &ticket,
                                inactivity_hours: hours,
                            },
                        )
                        .await;
                },
                Err(DeskError::InvalidTransition { .. }) => {
                    report.skipped += 1;
                    tracing::debug!(ticket_id = %candidate.id, "Ticket no longer eligible for auto-close");
                },
                Err(err) => {
                    report.failed += 1;
                    tracing::error!(ticket_id = %candidate.id, error = %err, "Failed to auto-close ticket");
                },
            }
        }

        Ok(report)
    }

    async fn expire(&self, candidate: &Ticket, now: DateTime<Utc>) -> Result<Ticket> {
        let id = candidate.id.clone();
        let threshold = self.threshold;

        self.store
            .execute("auto-expire ticket", move |conn| {
                let id = id.clone();
                Box::pin(async move {
                    let current = tickets::load(conn, &id).await?;
                    let transition =
                        current.apply(&Action::AutoExpire { threshold }, Actor::Sweeper, now)?;
                    tickets::update_guarded(conn, &current, &transition.ticket).await?;
                    Ok(transition.ticket)
                })
            })
            .await
    }

    /// Sweep on every interval tick until `shutdown` is cancelled
    ///
    /// A failing cycle is logged and the loop carries on.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            threshold_hours = self.threshold.num_hours(),
            "Sweeper started"
        );

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    match self.sweep().await {
                        Ok(report) if report.examined > 0 => {
                            tracing::info!(
                                examined = report.examined,
                                closed = report.closed,
                                skipped = report.skipped,
                                failed = report.failed,
                                "Sweep cycle finished"
                            );
                        },
                        Ok(_) => tracing::debug!("Sweep cycle found nothing to close"),
                        Err(err) => tracing::error!(error = %err, "Sweep cycle failed"),
                    }
                },
            }
        }

        tracing::info!("Sweeper stopped");
    }
}
