//! Resilient transaction executor
//!
//! [`Store::execute`] is the only way the rest of the crate touches the
//! database. Each call runs its body inside one transaction, retries the
//! whole body when SQLite reports lock contention or an optimistic guard
//! misses, and gives up after [`RetryPolicy::max_attempts`].
//!
//! Transactions start with `BEGIN IMMEDIATE`, so concurrent writers wait
//! for each other on SQLite's busy timeout rather than racing.

use super::schema;
use crate::config::{DatabaseConfig, RetryConfig};
use crate::error::{DeskError, Result};
use sqlx::SqliteConnection;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{sleep, timeout};

/// Boxed future returned by a transaction body
pub type TxFuture<'c, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'c>>;

/// Retry schedule for transient store conflicts
///
/// The delay before attempt `n + 1` is `base_delay * n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given failed attempt (1-based)
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    /// Sum of every delay the policy can incur
    #[must_use]
    pub fn total_delay(&self) -> Duration {
        (1..self.max_attempts)
            .map(|attempt| self.delay_after(attempt))
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_delay(),
        }
    }
}

/// Shared handle to the SQLite database
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    policy: RetryPolicy,
    busy_timeout: Duration,
}

impl Store {
    /// Open (creating if needed) the database described by `config`
    pub async fn open(config: &DatabaseConfig, retry: &RetryConfig) -> Result<Self> {
        Self::open_with(
            &config.path,
            config.max_connections,
            config.busy_timeout(),
            RetryPolicy::from(retry),
        )
        .await
    }

    /// Open a database file with explicit settings
    pub async fn open_with(
        path: &Path,
        max_connections: u32,
        busy_timeout: Duration,
        policy: RetryPolicy,
    ) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(busy_timeout)
            .connect_with(options)
            .await?;

        tracing::debug!(path = %path.display(), max_connections, "Opened ticket store");

        Ok(Self {
            pool,
            policy,
            busy_timeout,
        })
    }

    /// Create every table and index that does not exist yet
    pub async fn migrate(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        for statement in schema::STATEMENTS {
            sqlx::query(*statement).execute(&mut *conn).await?;
        }
        tracing::debug!("Schema is up to date");
        Ok(())
    }

    /// Upper bound on the wall-clock time of one [`execute`](Self::execute)
    #[must_use]
    pub fn time_budget(&self) -> Duration {
        self.busy_timeout
            .saturating_mul(self.policy.max_attempts)
            .saturating_add(self.policy.total_delay())
    }

    /// Run `body` in a transaction, retrying on transient conflicts
    ///
    /// The body may be invoked several times and must not have side effects
    /// outside the connection it is handed. Non-transient errors roll the
    /// transaction back and are returned unchanged; transient ones that
    /// outlast the retry policy come back as
    /// [`DeskError::TransientStoreConflict`].
    pub async fn execute<T, F>(&self, operation: &str, body: F) -> Result<T>
    where
        T: Send,
        F: for<'c> FnMut(&'c mut SqliteConnection) -> TxFuture<'c, T> + Send,
    {
        let budget = self.time_budget();
        match timeout(budget, self.execute_with_retry(operation, body)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(
                    operation,
                    budget_ms = budget.as_millis(),
                    "Store operation exceeded its time budget"
                );
                Err(DeskError::Timeout {
                    operation: operation.to_string(),
                    millis: budget.as_millis(),
                })
            },
        }
    }

    async fn execute_with_retry<T, F>(&self, operation: &str, mut body: F) -> Result<T>
    where
        T: Send,
        F: for<'c> FnMut(&'c mut SqliteConnection) -> TxFuture<'c, T> + Send,
    {
        let mut attempt = 1;

        loop {
            match self.run_once(&mut body).await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(operation, attempt, "Transaction succeeded after retry");
                    }
                    return Ok(value);
                },
                Err(err) if err.is_transient() => {
                    if attempt >= self.policy.max_attempts {
                        tracing::error!(
                            operation,
                            attempt,
                            error = %err,
                            "Transaction failed after max attempts"
                        );
                        return Err(DeskError::TransientStoreConflict {
                            operation: operation.to_string(),
                            attempts: attempt,
                            reason: err.to_string(),
                        });
                    }

                    let delay = self.policy.delay_after(attempt);
                    tracing::warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis(),
                        error = %err,
                        "Transient store conflict, retrying"
                    );
                    sleep(delay).await;
                    attempt += 1;
                },
                Err(err) => return Err(err),
            }
        }
    }

    async fn run_once<T, F>(&self, body: &mut F) -> Result<T>
    where
        T: Send,
        F: for<'c> FnMut(&'c mut SqliteConnection) -> TxFuture<'c, T> + Send,
    {
        // Writers queue on busy_timeout here, never on a lock upgrade
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;

        match body(&mut *tx).await {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            },
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!(
                        error = %rollback_err,
                        original = %err,
                        "Rollback failed"
                    );
                }
                Err(err)
            },
        }
    }

    /// Raw connection outside any transaction, for fixtures
    #[cfg(test)]
    pub(crate) async fn acquire(&self) -> Result<sqlx::pool::PoolConnection<sqlx::Sqlite>> {
        Ok(self.pool.acquire().await?)
    }

    /// Close every pooled connection
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    async fn open_store(temp_dir: &TempDir, policy: RetryPolicy) -> Store {
        let store = Store::open_with(
            &temp_dir.path().join("store.db"),
            4,
            Duration::from_secs(5),
            policy,
        )
        .await
        .expect("Failed to open store");
        store.migrate().await.expect("Failed to migrate");
        store
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_retry_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(300));
        assert_eq!(policy.total_delay(), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = open_store(&temp_dir, fast_policy(3)).await;
        store.migrate().await.expect("Second migration should succeed");
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = open_store(&temp_dir, fast_policy(3)).await;
        let calls = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&calls);
        let value = store
            .execute("flaky", move |conn| {
                let counter = Arc::clone(&counter);
                Box::pin(async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 3 {
                        return Err(DeskError::StaleWrite {
                            ticket_id: "ABCDEFGH".to_string(),
                        });
                    }
                    let one: i64 = sqlx::query_scalar("SELECT 1").fetch_one(&mut *conn).await?;
                    Ok(one)
                })
            })
            .await
            .expect("Third attempt should succeed");

        assert_eq!(value, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_exhaust_into_conflict() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = open_store(&temp_dir, fast_policy(3)).await;
        let calls = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&calls);
        let err = store
            .execute("always-stale", move |_conn| {
                let counter = Arc::clone(&counter);
                Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(DeskError::StaleWrite {
                        ticket_id: "ABCDEFGH".to_string(),
                    })
                })
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DeskError::TransientStoreConflict { attempts: 3, .. }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_failed_body_rolls_back_without_retry() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = open_store(&temp_dir, fast_policy(3)).await;
        let calls = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&calls);
        let err = store
            .execute("insert-then-fail", move |conn| {
                let counter = Arc::clone(&counter);
                Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    sqlx::query(
                        "INSERT INTO users (user_id, registration_date) VALUES (1, '2024-01-01')",
                    )
                    .execute(&mut *conn)
                    .await?;
                    Err::<(), _>(DeskError::validation("nope"))
                })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DeskError::Validation(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let count: i64 = store
            .execute("count", |conn| {
                Box::pin(async move {
                    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
                        .fetch_one(&mut *conn)
                        .await?;
                    Ok::<_, DeskError>(count)
                })
            })
            .await
            .expect("Failed to count users");
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_writer_waits_for_held_write_lock() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = open_store(&temp_dir, RetryPolicy::default()).await;

        let mut holder = store.acquire().await.expect("Failed to acquire connection");
        sqlx::query("BEGIN IMMEDIATE")
            .execute(&mut *holder)
            .await
            .expect("Failed to take write lock");
        sqlx::query("INSERT INTO users (user_id, registration_date) VALUES (1, '2024-01-01')")
            .execute(&mut *holder)
            .await
            .expect("Failed to insert under lock");

        let waiting = tokio::spawn({
            let store = store.clone();
            async move {
                store
                    .execute("insert second user", |conn| {
                        Box::pin(async move {
                            let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
                                .fetch_one(&mut *conn)
                                .await?;
                            sqlx::query(
                                "INSERT INTO users (user_id, registration_date) VALUES (2, '2024-01-01')",
                            )
                            .execute(&mut *conn)
                            .await?;
                            Ok(existing)
                        })
                    })
                    .await
            }
        });

        tokio::time::sleep(Duration::from_millis(400)).await;
        sqlx::query("COMMIT")
            .execute(&mut *holder)
            .await
            .expect("Failed to release write lock");
        drop(holder);

        let seen = waiting
            .await
            .expect("Writer task panicked")
            .expect("Writer should wait out the lock, not fail");
        assert_eq!(seen, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_read_then_write_bodies_all_commit() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = open_store(&temp_dir, RetryPolicy::default()).await;

        let mut writers = Vec::new();
        for user_id in 1..=16_i64 {
            let store = store.clone();
            writers.push(tokio::spawn(async move {
                store
                    .execute("count then insert", move |conn| {
                        Box::pin(async move {
                            let _: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
                                .fetch_one(&mut *conn)
                                .await?;
                            sqlx::query(
                                "INSERT INTO users (user_id, registration_date) VALUES (?, '2024-01-01')",
                            )
                            .bind(user_id)
                            .execute(&mut *conn)
                            .await?;
                            Ok(())
                        })
                    })
                    .await
            }));
        }
        for writer in writers {
            writer
                .await
                .expect("Writer task panicked")
                .expect("Writer failed under contention");
        }

        let count: i64 = store
            .execute("count", |conn| {
                Box::pin(async move {
                    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
                        .fetch_one(&mut *conn)
                        .await?;
                    Ok::<_, DeskError>(count)
                })
            })
            .await
            .expect("Failed to count users");
        assert_eq!(count, 16);
    }
}
