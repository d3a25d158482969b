//! Derived user metrics
//!
//! Recomputed from scratch after a ticket is resolved or rated, in a
//! transaction of its own so a failure here never undoes the change that
//! triggered it.

use crate::core::{UserId, UserStats};
use crate::error::Result;
use crate::storage::{Store, users};

#[derive(Clone)]
pub struct StatAggregator {
    store: Store,
}

impl StatAggregator {
    #[must_use]
    pub const fn new(store: Store) -> Self {
        Self { store }
    }

    /// Recompute and persist `user_id`'s solved count, average response time
    /// and average rating
    pub async fn recompute(&self, user_id: UserId) -> Result<UserStats> {
        let stats = self
            .store
            .execute("recompute user stats", move |conn| {
                Box::pin(async move {
                    let stats = users::compute_stats(conn, user_id).await?;
                    users::write_stats(conn, user_id, &stats).await?;
                    Ok(stats)
                })
            })
            .await?;

        tracing::debug!(
            user_id,
            solved = stats.solved_issues,
            avg_response_time = ?stats.avg_response_time,
            rating = ?stats.rating,
            "User stats recomputed"
        );
        Ok(stats)
    }

    /// Like [`recompute`](Self::recompute), logging instead of failing
    pub async fn refresh(&self, user_id: UserId) {
        if let Err(err) = self.recompute(user_id).await {
            tracing::error!(user_id, error = %err, "Failed to recompute user stats");
        }
    }
}
