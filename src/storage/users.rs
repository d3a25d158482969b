//! User rows

use crate::core::{User, UserId, UserProfile, UserStats};
use crate::error::{DeskError, Result};
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

const USER_COLUMNS: &str = "user_id, username, first_name, last_name, registration_date, \
     last_activity, requests_count, is_banned, rating, solved_issues, avg_response_time";

#[derive(sqlx::FromRow)]
struct UserRow {
    user_id: i64,
    username: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    registration_date: DateTime<Utc>,
    last_activity: Option<DateTime<Utc>>,
    requests_count: i64,
    is_banned: bool,
    rating: Option<f64>,
    solved_issues: i64,
    avg_response_time: Option<f64>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.user_id,
            username: row.username,
            first_name: row.first_name,
            last_name: row.last_name,
            registered_at: row.registration_date,
            last_activity: row.last_activity,
            requests_count: row.requests_count,
            is_banned: row.is_banned,
            rating: row.rating,
            solved_issues: row.solved_issues,
            avg_response_time: row.avg_response_time,
        }
    }
}

/// Register the user on first contact and record activity on every contact
///
/// Profile fields are only overwritten with values that are present.
pub async fn upsert(
    conn: &mut SqliteConnection,
    user_id: UserId,
    profile: Option<&UserProfile>,
    now: DateTime<Utc>,
) -> Result<()> {
    let profile = profile.cloned().unwrap_or_default();
    sqlx::query(
        "INSERT INTO users (user_id, username, first_name, last_name, registration_date, last_activity) \
         VALUES (?, ?, ?, ?, ?, ?) \
         ON CONFLICT(user_id) DO UPDATE SET \
             username = COALESCE(excluded.username, users.username), \
             first_name = COALESCE(excluded.first_name, users.first_name), \
             last_name = COALESCE(excluded.last_name, users.last_name), \
             last_activity = excluded.last_activity",
    )
    .bind(user_id)
    .bind(profile.username)
    .bind(profile.first_name)
    .bind(profile.last_name)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Make sure a row exists without touching activity
pub async fn ensure(conn: &mut SqliteConnection, user_id: UserId, now: DateTime<Utc>) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO users (user_id, registration_date) VALUES (?, ?)")
        .bind(user_id)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn find(conn: &mut SqliteConnection, user_id: UserId) -> Result<Option<User>> {
    let row: Option<UserRow> =
        sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = ?"))
            .bind(user_id)
            .fetch_optional(&mut *conn)
            .await?;
    Ok(row.map(User::from))
}

/// Load a user or fail with [`DeskError::UserNotFound`]
pub async fn load(conn: &mut SqliteConnection, user_id: UserId) -> Result<User> {
    find(conn, user_id)
        .await?
        .ok_or(DeskError::UserNotFound { id: user_id })
}

pub async fn increment_requests(conn: &mut SqliteConnection, user_id: UserId) -> Result<()> {
    let result = sqlx::query("UPDATE users SET requests_count = requests_count + 1 WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(DeskError::UserNotFound { id: user_id });
    }
    Ok(())
}

pub async fn set_banned(conn: &mut SqliteConnection, user_id: UserId, banned: bool) -> Result<()> {
    let result = sqlx::query("UPDATE users SET is_banned = ? WHERE user_id = ?")
        .bind(banned)
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(DeskError::UserNotFound { id: user_id });
    }
    Ok(())
}

/// Recompute derived metrics from the user's tickets
///
/// Solved counts tickets whose current status is `resolved`.
pub async fn compute_stats(conn: &mut SqliteConnection, user_id: UserId) -> Result<UserStats> {
    let (solved_issues, avg_response_time, rating): (i64, Option<f64>, Option<f64>) =
        sqlx::query_as(
            "SELECT \
                 COALESCE(SUM(CASE WHEN status = 'resolved' THEN 1 ELSE 0 END), 0), \
                 AVG(response_time), \
                 AVG(satisfaction_rating) \
             FROM tickets WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?;

    Ok(UserStats {
        solved_issues,
        avg_response_time,
        rating,
    })
}

pub async fn write_stats(
    conn: &mut SqliteConnection,
    user_id: UserId,
    stats: &UserStats,
) -> Result<()> {
    let result = sqlx::query(
        "UPDATE users SET solved_issues = ?, avg_response_time = ?, rating = ? WHERE user_id = ?",
    )
    .bind(stats.solved_issues)
    .bind(stats.avg_response_time)
    .bind(stats.rating)
    .bind(user_id)
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(DeskError::UserNotFound { id: user_id });
    }
    Ok(())
}

/// All users, most active reporters first
pub async fn list(conn: &mut SqliteConnection) -> Result<Vec<User>> {
    let rows: Vec<UserRow> = sqlx::query_as(&format!(
        "SELECT {USER_COLUMNS} FROM users ORDER BY requests_count DESC, user_id"
    ))
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows.into_iter().map(User::from).collect())
}
