//! Notification outbox rows

use crate::core::{Notification, UserId};
use crate::error::Result;
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: i64,
    user_id: i64,
    message: String,
    is_read: bool,
    created_at: DateTime<Utc>,
}

impl From<NotificationRow> for Notification {
    fn from(row: NotificationRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            message: row.message,
            is_read: row.is_read,
            created_at: row.created_at,
        }
    }
}

pub async fn insert(
    conn: &mut SqliteConnection,
    user_id: UserId,
    message: &str,
    created_at: DateTime<Utc>,
) -> Result<Notification> {
    let id = sqlx::query_scalar(
        "INSERT INTO notifications (user_id, message, created_at) VALUES (?, ?, ?) RETURNING id",
    )
    .bind(user_id)
    .bind(message)
    .bind(created_at)
    .fetch_one(&mut *conn)
    .await?;

    Ok(Notification {
        id,
        user_id,
        message: message.to_string(),
        is_read: false,
        created_at,
    })
}

/// Newest notifications first, optionally for one user
pub async fn recent(
    conn: &mut SqliteConnection,
    user_id: Option<UserId>,
    limit: u32,
) -> Result<Vec<Notification>> {
    let rows: Vec<NotificationRow> = sqlx::query_as(
        "SELECT id, user_id, message, is_read, created_at FROM notifications \
         WHERE (? IS NULL OR user_id = ?) ORDER BY created_at DESC, id DESC LIMIT ?",
    )
    .bind(user_id)
    .bind(user_id)
    .bind(i64::from(limit))
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows.into_iter().map(Notification::from).collect())
}

/// Returns whether the notification existed
pub async fn mark_read(conn: &mut SqliteConnection, id: i64) -> Result<bool> {
    let result = sqlx::query("UPDATE notifications SET is_read = 1 WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}
