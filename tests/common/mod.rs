//! Shared fixtures for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeDelta, Utc};
use mockable::Clock;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use support_desk::config::DeskConfig;
use support_desk::core::{Command, Inbound, StaticCatalog, Ticket, UserId};
use support_desk::notify::{Deliverer, Delivery};
use support_desk::storage::{RetryPolicy, Store};
use support_desk::{Outcome, TicketEngine};
use tempfile::TempDir;

pub const OWNER: UserId = 100;
pub const OPERATOR: UserId = 900;

/// Clock that only moves when told to
pub struct TestClock(Mutex<DateTime<Utc>>);

impl TestClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self(Mutex::new(now))
    }

    pub fn advance_hours(&self, hours: i64) {
        *self.0.lock().unwrap() += TimeDelta::hours(hours);
    }
}

impl Clock for TestClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

/// Deliverer that keeps every message it is handed
#[derive(Default)]
pub struct RecordingDeliverer(Mutex<Vec<Delivery>>);

impl RecordingDeliverer {
    pub fn sent_to(&self, user_id: UserId) -> Vec<String> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.user_id == user_id)
            .map(|d| d.text.clone())
            .collect()
    }
}

#[async_trait]
impl Deliverer for RecordingDeliverer {
    async fn deliver(&self, user_id: UserId, text: &str) -> support_desk::Result<()> {
        self.0.lock().unwrap().push(Delivery {
            user_id,
            text: text.to_string(),
        });
        Ok(())
    }
}

pub struct Desk {
    pub _temp_dir: TempDir,
    pub engine: TicketEngine,
    pub clock: Arc<TestClock>,
    pub deliverer: Arc<RecordingDeliverer>,
}

impl Desk {
    pub async fn new() -> Self {
        Self::with(
            RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(5),
            },
            |_| {},
        )
        .await
    }

    pub async fn with(policy: RetryPolicy, configure: impl FnOnce(&mut DeskConfig)) -> Self {
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

        let mut config = DeskConfig {
            operators: vec![OPERATOR],
            ..DeskConfig::default()
        };
        configure(&mut config);

        let clock = Arc::new(TestClock::new(Utc::now()));
        let deliverer = Arc::new(RecordingDeliverer::default());
        let engine = TicketEngine::new(
            store,
            &config,
            Arc::new(StaticCatalog::builtin()),
            deliverer.clone(),
            clock.clone(),
        );
        engine
            .ensure_operators()
            .await
            .expect("Failed to ensure operators");

        Self {
            _temp_dir: temp_dir,
            engine,
            clock,
            deliverer,
        }
    }

    pub async fn create(&self, user_id: UserId, description: &str) -> Ticket {
        let outcome = self
            .engine
            .handle(Inbound::new(
                user_id,
                Command::CreateTicket {
                    category: "internet/slow".to_string(),
                    description: description.to_string(),
                },
            ))
            .await
            .expect("Failed to create ticket");
        match outcome {
            Outcome::Created { ticket } => ticket,
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
