//! Message trail and feedback rows

use crate::core::{Feedback, Message, NewFeedback, NewMessage, TicketId};
use crate::error::{DeskError, Result};
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: i64,
    ticket_id: String,
    sender_id: i64,
    message: String,
    sent_at: DateTime<Utc>,
    is_internal: bool,
}

impl TryFrom<MessageRow> for Message {
    type Error = DeskError;

    fn try_from(row: MessageRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            ticket_id: TicketId::parse_str(&row.ticket_id)?,
            sender_id: row.sender_id,
            body: row.message,
            sent_at: row.sent_at,
            internal: row.is_internal,
        })
    }
}

#[derive(sqlx::FromRow)]
struct FeedbackRow {
    id: i64,
    ticket_id: String,
    user_id: i64,
    rating: i64,
    comment: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<FeedbackRow> for Feedback {
    type Error = DeskError;

    fn try_from(row: FeedbackRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            ticket_id: TicketId::parse_str(&row.ticket_id)?,
            user_id: row.user_id,
            rating: u8::try_from(row.rating)
                .map_err(|_| DeskError::validation(format!("Corrupt rating {}", row.rating)))?,
            comment: row.comment,
            created_at: row.created_at,
        })
    }
}

pub async fn append(
    conn: &mut SqliteConnection,
    ticket_id: &TicketId,
    message: &NewMessage,
    sent_at: DateTime<Utc>,
) -> Result<i64> {
    let id = sqlx::query_scalar(
        "INSERT INTO ticket_messages (ticket_id, sender_id, message, sent_at, is_internal) \
         VALUES (?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(ticket_id.as_str())
    .bind(message.sender_id)
    .bind(&message.body)
    .bind(sent_at)
    .bind(message.internal)
    .fetch_one(&mut *conn)
    .await?;
    Ok(id)
}

/// Message trail in the order it was written
///
/// Internal notes are left out unless `include_internal` is set.
pub async fn trail(
    conn: &mut SqliteConnection,
    ticket_id: &TicketId,
    include_internal: bool,
) -> Result<Vec<Message>> {
    let rows: Vec<MessageRow> = sqlx::query_as(
        "SELECT id, ticket_id, sender_id, message, sent_at, is_internal FROM ticket_messages \
         WHERE ticket_id = ? AND (? OR is_internal = 0) ORDER BY sent_at, id",
    )
    .bind(ticket_id.as_str())
    .bind(include_internal)
    .fetch_all(&mut *conn)
    .await?;
    rows.into_iter().map(Message::try_from).collect()
}

/// Record a rating; a second row for the same ticket is a validation error
pub async fn insert_feedback(
    conn: &mut SqliteConnection,
    ticket_id: &TicketId,
    feedback: &NewFeedback,
    created_at: DateTime<Utc>,
) -> Result<()> {
    let inserted = sqlx::query(
        "INSERT INTO feedback (ticket_id, user_id, rating, comment, created_at) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(ticket_id.as_str())
    .bind(feedback.user_id)
    .bind(i64::from(feedback.rating))
    .bind(feedback.comment.as_deref())
    .bind(created_at)
    .execute(&mut *conn)
    .await;

    match inserted.map_err(DeskError::from) {
        Ok(_) => Ok(()),
        Err(err) if err.is_unique_violation() => Err(DeskError::validation(
            "This ticket has already been rated",
        )),
        Err(err) => Err(err),
    }
}

pub async fn feedback_for(
    conn: &mut SqliteConnection,
    ticket_id: &TicketId,
) -> Result<Vec<Feedback>> {
    let rows: Vec<FeedbackRow> = sqlx::query_as(
        "SELECT id, ticket_id, user_id, rating, comment, created_at FROM feedback \
         WHERE ticket_id = ? ORDER BY id",
    )
    .bind(ticket_id.as_str())
    .fetch_all(&mut *conn)
    .await?;
    rows.into_iter().map(Feedback::try_from).collect()
}
