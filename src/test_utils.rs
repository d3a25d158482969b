//! Test utilities for support-desk
//!
//! Common fixtures shared by the unit tests: a file-backed temporary store,
//! a settable clock and ticket factories.

#![cfg(test)]

use crate::core::{Status, Ticket, TicketBuilder, UserId};
use crate::storage::{RetryPolicy, Store};
use chrono::{DateTime, Local, TimeDelta, Utc};
use mockable::Clock;
use sqlx::Sqlite;
use sqlx::pool::PoolConnection;
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

/// Clock that only moves when told to
pub struct MutableClock(Mutex<DateTime<Utc>>);

impl MutableClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self(Mutex::new(now))
    }

    pub fn advance_seconds(&self, seconds: i64) {
        *self.lock_clock() += TimeDelta::seconds(seconds);
    }

    pub fn advance_hours(&self, hours: i64) {
        *self.lock_clock() += TimeDelta::hours(hours);
    }

    fn lock_clock(&self) -> std::sync::MutexGuard<'_, DateTime<Utc>> {
        match self.0.lock() {
            Ok(guard) => guard,
            Err(_) => panic!("clock mutex"),
        }
    }
}

impl Clock for MutableClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.lock_clock()
    }
}

/// Migrated store in a temporary directory
pub struct TestStore {
    pub temp_dir: TempDir,
    pub store: Store,
}

impl TestStore {
    pub async fn new() -> Self {
        Self::with_policy(RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(5),
        })
        .await
    }

    pub async fn with_policy(policy: RetryPolicy) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = Store::open_with(
            &temp_dir.path().join("desk.db"),
            4,
            Duration::from_secs(5),
            policy,
        )
        .await
        .expect("Failed to open store");
        store.migrate().await.expect("Failed to migrate store");

        Self { temp_dir, store }
    }

    /// Connection outside the retry wrapper, for seeding and assertions
    pub async fn store_connection(&self) -> PoolConnection<Sqlite> {
        self.store
            .acquire()
            .await
            .expect("Failed to acquire connection")
    }
}

/// Helper function to create a test ticket
pub fn create_test_ticket(user_id: UserId, status: Status) -> Ticket {
    TicketBuilder::new()
        .user_id(user_id)
        .category("internet")
        .description("Test problem description")
        .status(status)
        .build()
}
