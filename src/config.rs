//! Layered configuration
//!
//! Values are resolved in order: built-in defaults, an optional config file,
//! `SUPPORT_DESK__*` environment variables, then command-line overrides.
//! Nested keys use a double underscore in the environment, for example
//! `SUPPORT_DESK__RETRY__MAX_ATTEMPTS=5`.

use crate::core::UserId;
use crate::error::{DeskError, Result};
use chrono::TimeDelta;
use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "SUPPORT_DESK";
const CONFIG_FILE_NAME: &str = "support-desk.yaml";
const DATABASE_FILE_NAME: &str = "support_desk.db";

/// Largest accepted `sweeper.inactivity_hours`, ten years
pub const MAX_INACTIVITY_HOURS: u64 = 10 * 366 * 24;

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeskConfig {
    pub database: DatabaseConfig,
    pub retry: RetryConfig,
    pub sweeper: SweeperConfig,
    pub session: SessionConfig,
    pub limits: LimitsConfig,
    /// User ids that act as operators
    pub operators: Vec<UserId>,
    /// YAML category catalog replacing the built-in one
    pub catalog_path: Option<PathBuf>,
    pub log_level: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per transaction, including the first
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweeperConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    /// Open tickets idle for longer than this are auto-closed
    pub inactivity_hours: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Lifetime of a suspended multi-step flow
    pub draft_ttl_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_message_length: usize,
    /// Tickets a user may open per rolling 24 hours, `0` for no limit
    pub max_daily_tickets: u32,
}

impl Default for DeskConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            retry: RetryConfig::default(),
            sweeper: SweeperConfig::default(),
            session: SessionConfig::default(),
            limits: LimitsConfig::default(),
            operators: Vec::new(),
            catalog_path: None,
            log_level: "info".to_string(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        let path = ProjectDirs::from("", "", "support-desk").map_or_else(
            || PathBuf::from(DATABASE_FILE_NAME),
            |dirs| dirs.data_dir().join(DATABASE_FILE_NAME),
        );

        Self {
            path,
            max_connections: 5,
            busy_timeout_ms: 5000,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
        }
    }
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 3600,
            inactivity_hours: 48,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            draft_ttl_secs: 3600,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_message_length: 4000,
            max_daily_tickets: 5,
        }
    }
}

/// Command-line values that take precedence over every other layer
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_file: Option<PathBuf>,
    pub database_path: Option<PathBuf>,
}

impl DeskConfig {
    /// Default location of the config file
    #[must_use]
    pub fn default_config_file() -> Option<PathBuf> {
        ProjectDirs::from("", "", "support-desk")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Resolve configuration from every layer
    pub fn load(overrides: &ConfigOverrides) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        match &overrides.config_file {
            Some(path) => builder = builder.add_source(File::from(path.as_path()).required(true)),
            None => {
                if let Some(path) = Self::default_config_file() {
                    builder = builder.add_source(File::from(path).required(false));
                }
            },
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("operators")
                .try_parsing(true),
        );

        if let Some(path) = &overrides.database_path {
            builder = builder.set_override("database.path", path.to_string_lossy().to_string())?;
        }

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        tracing::debug!(
            database = %config.database.path.display(),
            operators = config.operators.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        let checks = [
            (self.retry.max_attempts == 0, "retry.max_attempts must be at least 1"),
            (self.sweeper.interval_secs == 0, "sweeper.interval_secs must be at least 1"),
            (
                self.sweeper.inactivity_hours == 0,
                "sweeper.inactivity_hours must be at least 1",
            ),
            (
                self.sweeper.inactivity_hours > MAX_INACTIVITY_HOURS,
                "sweeper.inactivity_hours must be at most 87840 (ten years)",
            ),
            (
                self.database.max_connections == 0,
                "database.max_connections must be at least 1",
            ),
            (
                self.limits.max_message_length == 0,
                "limits.max_message_length must be at least 1",
            ),
        ];

        match checks.into_iter().find(|(failed, _)| *failed) {
            Some((_, message)) => Err(DeskError::InvalidConfig(message.to_string())),
            None => Ok(()),
        }
    }

    /// Whether `user_id` is configured as an operator
    #[must_use]
    pub fn is_operator(&self, user_id: UserId) -> bool {
        self.operators.contains(&user_id)
    }

    #[must_use]
    pub fn database_path(&self) -> &Path {
        &self.database.path
    }
}

impl DatabaseConfig {
    #[must_use]
    pub const fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

impl RetryConfig {
    #[must_use]
    pub const fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

impl SweeperConfig {
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Inactivity threshold as a signed delta for timestamp arithmetic
    #[must_use]
    pub fn threshold(&self) -> TimeDelta {
        i64::try_from(self.inactivity_hours)
            .ok()
            .and_then(TimeDelta::try_hours)
            .unwrap_or(TimeDelta::MAX)
    }
}

impl SessionConfig {
    #[must_use]
    pub const fn draft_ttl(&self) -> Duration {
        Duration::from_secs(self.draft_ttl_secs)
    }
}
