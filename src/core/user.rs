use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque numeric user identity supplied by the transport
pub type UserId = i64;

/// Display fields reported by the transport on contact
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

/// A registered user
///
/// `rating`, `solved_issues` and `avg_response_time` are derived by the
/// [`StatAggregator`](crate::stats::StatAggregator) and never written
/// directly by lifecycle transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub registered_at: DateTime<Utc>,
    pub last_activity: Option<DateTime<Utc>>,
    pub requests_count: i64,
    pub is_banned: bool,
    pub rating: Option<f64>,
    pub solved_issues: i64,
    /// Average minutes to first response across the user's tickets
    pub avg_response_time: Option<f64>,
}

impl User {
    /// Name to show in operator views
    #[must_use]
    pub fn display_name(&self) -> String {
        let full = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        match (full.is_empty(), self.username.as_deref()) {
            (false, Some(username)) => format!("{full} (@{username})"),
            (false, None) => full,
            (true, Some(username)) => format!("@{username}"),
            (true, None) => format!("user {}", self.id),
        }
    }
}

/// Derived per-user metrics written back by the stat aggregator
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UserStats {
    pub solved_issues: i64,
    pub avg_response_time: Option<f64>,
    pub rating: Option<f64>,
}
