//! Ticket rows
//!
//! All functions run against a connection handed out by
//! [`Store::execute`](super::Store::execute) and never open their own
//! transaction.

use crate::core::{Status, Ticket, TicketId, UserId};
use crate::error::{DeskError, Result};
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

const TICKET_COLUMNS: &str = "ticket_id, user_id, category, priority, problem, status, \
     created_at, last_update, assigned_to, response_time, satisfaction_rating";

/// Which tickets a listing returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketFilter {
    ByUser(UserId),
    ByStatus(Status),
    /// Every ticket, newest `n` first
    Recent(u32),
}

#[derive(sqlx::FromRow)]
struct TicketRow {
    ticket_id: String,
    user_id: i64,
    category: String,
    priority: String,
    problem: String,
    status: String,
    created_at: DateTime<Utc>,
    last_update: DateTime<Utc>,
    assigned_to: Option<i64>,
    response_time: Option<i64>,
    satisfaction_rating: Option<i64>,
}

impl TryFrom<TicketRow> for Ticket {
    type Error = DeskError;

    fn try_from(row: TicketRow) -> Result<Self> {
        let rating = row
            .satisfaction_rating
            .map(u8::try_from)
            .transpose()
            .map_err(|_| DeskError::validation(format!("Corrupt rating on ticket {}", row.ticket_id)))?;

        Ok(Self {
            id: TicketId::parse_str(&row.ticket_id)?,
            user_id: row.user_id,
            category: row.category,
            priority: row.priority.parse()?,
            description: row.problem,
            status: row.status.parse()?,
            created_at: row.created_at,
            last_update: row.last_update,
            assigned_to: row.assigned_to,
            response_time: row.response_time,
            rating,
        })
    }
}

fn into_tickets(rows: Vec<TicketRow>) -> Result<Vec<Ticket>> {
    rows.into_iter().map(Ticket::try_from).collect()
}

/// Insert a freshly opened ticket
///
/// A clash on `ticket_id` surfaces as a unique violation for the caller to
/// handle.
pub async fn insert(conn: &mut SqliteConnection, ticket: &Ticket) -> Result<()> {
    sqlx::query(
        "INSERT INTO tickets (ticket_id, user_id, category, priority, problem, status, \
         created_at, last_update, assigned_to, response_time, satisfaction_rating) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(ticket.id.as_str())
    .bind(ticket.user_id)
    .bind(&ticket.category)
    .bind(ticket.priority.as_str())
    .bind(&ticket.description)
    .bind(ticket.status.as_str())
    .bind(ticket.created_at)
    .bind(ticket.last_update)
    .bind(ticket.assigned_to)
    .bind(ticket.response_time)
    .bind(ticket.rating.map(i64::from))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn find(conn: &mut SqliteConnection, id: &TicketId) -> Result<Option<Ticket>> {
    let row: Option<TicketRow> =
        sqlx::query_as(&format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE ticket_id = ?"))
            .bind(id.as_str())
            .fetch_optional(&mut *conn)
            .await?;
    row.map(Ticket::try_from).transpose()
}

/// Load a ticket or fail with [`DeskError::TicketNotFound`]
pub async fn load(conn: &mut SqliteConnection, id: &TicketId) -> Result<Ticket> {
    find(conn, id)
        .await?
        .ok_or_else(|| DeskError::TicketNotFound { id: id.to_string() })
}

/// Write `after` over `before`, guarded on the state that was read
///
/// Fails with [`DeskError::StaleWrite`] when another writer changed the
/// ticket's status or `last_update` in the meantime.
pub async fn update_guarded(
    conn: &mut SqliteConnection,
    before: &Ticket,
    after: &Ticket,
) -> Result<()> {
    let result = sqlx::query(
        "UPDATE tickets SET status = ?, last_update = ?, assigned_to = ?, response_time = ?, \
         satisfaction_rating = ? \
         WHERE ticket_id = ? AND status = ? AND last_update = ?",
    )
    .bind(after.status.as_str())
    .bind(after.last_update)
    .bind(after.assigned_to)
    .bind(after.response_time)
    .bind(after.rating.map(i64::from))
    .bind(before.id.as_str())
    .bind(before.status.as_str())
    .bind(before.last_update)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DeskError::StaleWrite {
            ticket_id: before.id.to_string(),
        });
    }
    Ok(())
}

/// List tickets newest first
pub async fn list(
    conn: &mut SqliteConnection,
    filter: TicketFilter,
    limit: Option<u32>,
) -> Result<Vec<Ticket>> {
    let mut query = QueryBuilder::<Sqlite>::new(format!("SELECT {TICKET_COLUMNS} FROM tickets"));

    let limit = match filter {
        TicketFilter::ByUser(user_id) => {
            query.push(" WHERE user_id = ").push_bind(user_id);
            limit
        },
        TicketFilter::ByStatus(status) => {
            query.push(" WHERE status = ").push_bind(status.as_str());
            limit
        },
        TicketFilter::Recent(n) => Some(limit.map_or(n, |l| l.min(n))),
    };

    query.push(" ORDER BY created_at DESC, id DESC");
    if let Some(limit) = limit {
        query.push(" LIMIT ").push_bind(i64::from(limit));
    }

    let rows: Vec<TicketRow> = query.build_query_as().fetch_all(&mut *conn).await?;
    into_tickets(rows)
}

/// Open tickets whose last update is older than `cutoff`
pub async fn overdue(conn: &mut SqliteConnection, cutoff: DateTime<Utc>) -> Result<Vec<Ticket>> {
    let rows: Vec<TicketRow> = sqlx::query_as(&format!(
        "SELECT {TICKET_COLUMNS} FROM tickets WHERE status = ? AND last_update < ? \
         ORDER BY last_update"
    ))
    .bind(Status::Open.as_str())
    .bind(cutoff)
    .fetch_all(&mut *conn)
    .await?;
    into_tickets(rows)
}

/// Work queue for operators: everything not closed, open first
pub async fn operator_queue(conn: &mut SqliteConnection, limit: u32) -> Result<Vec<Ticket>> {
    let rows: Vec<TicketRow> = sqlx::query_as(&format!(
        "SELECT {TICKET_COLUMNS} FROM tickets WHERE status != ? \
         ORDER BY CASE status WHEN 'open' THEN 1 WHEN 'resolved' THEN 2 ELSE 3 END, \
         created_at DESC, id DESC LIMIT ?"
    ))
    .bind(Status::Closed.as_str())
    .bind(i64::from(limit))
    .fetch_all(&mut *conn)
    .await?;
    into_tickets(rows)
}

/// Resolved tickets of `user_id` still waiting for a rating
pub async fn pending_feedback(conn: &mut SqliteConnection, user_id: UserId) -> Result<Vec<Ticket>> {
    let rows: Vec<TicketRow> = sqlx::query_as(&format!(
        "SELECT {TICKET_COLUMNS} FROM tickets \
         WHERE user_id = ? AND status = ? AND satisfaction_rating IS NULL \
         ORDER BY created_at DESC, id DESC"
    ))
    .bind(user_id)
    .bind(Status::Resolved.as_str())
    .fetch_all(&mut *conn)
    .await?;
    into_tickets(rows)
}

/// Tickets `user_id` opened after `since`
pub async fn count_created_since(
    conn: &mut SqliteConnection,
    user_id: UserId,
    since: DateTime<Utc>,
) -> Result<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM tickets WHERE user_id = ? AND created_at > ?")
        .bind(user_id)
        .bind(since)
        .fetch_one(&mut *conn)
        .await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Priority, TicketBuilder};
    use crate::storage::users;
    use crate::test_utils::TestStore;
    use chrono::Duration;

    async fn seed(fixture: &TestStore, tickets: Vec<Ticket>) {
        fixture
            .store
            .execute("seed", move |conn| {
                let tickets = tickets.clone();
                Box::pin(async move {
                    for user_id in [1, 2] {
                        users::ensure(conn, user_id, Utc::now()).await?;
                    }
                    for ticket in &tickets {
                        insert(conn, ticket).await?;
                    }
                    Ok(())
                })
            })
            .await
            .expect("Failed to seed tickets");
    }

    #[tokio::test]
    async fn test_insert_and_load() {
        let fixture = TestStore::new().await;
        let ticket = TicketBuilder::new()
            .user_id(1)
            .category("internet/no_connection")
            .priority(Priority::High)
            .description("Nothing loads")
            .build();
        seed(&fixture, vec![ticket.clone()]).await;

        let id = ticket.id.clone();
        let loaded = fixture
            .store
            .execute("load", move |conn| {
                let id = id.clone();
                Box::pin(async move { load(conn, &id).await })
            })
            .await
            .expect("Failed to load ticket");
        assert_eq!(loaded, ticket);
    }

    #[tokio::test]
    async fn test_duplicate_id_is_unique_violation() {
        let fixture = TestStore::new().await;
        let ticket = TicketBuilder::new().user_id(1).description("first").build();
        seed(&fixture, vec![ticket.clone()]).await;

        let err = fixture
            .store
            .execute("dup", move |conn| {
                let ticket = ticket.clone();
                Box::pin(async move { insert(conn, &ticket).await })
            })
            .await
            .unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn test_guarded_update_detects_stale_state() {
        let fixture = TestStore::new().await;
        let before = TicketBuilder::new().user_id(1).description("slow").build();
        seed(&fixture, vec![before.clone()]).await;

        let mut after = before.clone();
        after.status = Status::Resolved;
        after.last_update = before.last_update + Duration::minutes(5);

        let (b, a) = (before.clone(), after.clone());
        fixture
            .store
            .execute("update", move |conn| {
                let (b, a) = (b.clone(), a.clone());
                Box::pin(async move { update_guarded(conn, &b, &a).await })
            })
            .await
            .expect("First guarded write should apply");

        let mut conn = fixture.store_connection().await;
        let err = update_guarded(&mut conn, &before, &after).await.unwrap_err();
        assert!(matches!(err, DeskError::StaleWrite { .. }));
    }

    #[tokio::test]
    async fn test_list_filters_and_queue_order() {
        let fixture = TestStore::new().await;
        let base = Utc::now() - Duration::days(3);
        let tickets = vec![
            TicketBuilder::new().user_id(1).created_at(base).status(Status::Closed).build(),
            TicketBuilder::new()
                .user_id(1)
                .created_at(base + Duration::hours(1))
                .status(Status::Resolved)
                .build(),
            TicketBuilder::new().user_id(2).created_at(base + Duration::hours(2)).build(),
            TicketBuilder::new()
                .user_id(2)
                .created_at(base + Duration::hours(3))
                .status(Status::Rejected)
                .build(),
            TicketBuilder::new().user_id(1).created_at(base + Duration::hours(4)).build(),
        ];
        seed(&fixture, tickets.clone()).await;

        let mut conn = fixture.store_connection().await;

        let mine = list(&mut conn, TicketFilter::ByUser(1), None).await.unwrap();
        assert_eq!(mine.len(), 3);
        assert_eq!(mine[0].id, tickets[4].id);

        let open = list(&mut conn, TicketFilter::ByStatus(Status::Open), None).await.unwrap();
        assert_eq!(open.len(), 2);

        let recent = list(&mut conn, TicketFilter::Recent(2), Some(10)).await.unwrap();
        assert_eq!(
            recent.iter().map(|t| t.id.clone()).collect::<Vec<_>>(),
            vec![tickets[4].id.clone(), tickets[3].id.clone()]
        );

        let queue = operator_queue(&mut conn, 10).await.unwrap();
        let statuses: Vec<Status> = queue.iter().map(|t| t.status).collect();
        assert_eq!(
            statuses,
            vec![Status::Open, Status::Open, Status::Resolved, Status::Rejected]
        );
        assert_eq!(queue[0].id, tickets[4].id);

        let pending = pending_feedback(&mut conn, 1).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, tickets[1].id);
    }

    #[tokio::test]
    async fn test_overdue_uses_last_update() {
        let fixture = TestStore::new().await;
        let now = Utc::now();
        let stale = TicketBuilder::new()
            .user_id(1)
            .created_at(now - Duration::hours(60))
            .build();
        let fresh = TicketBuilder::new()
            .user_id(1)
            .created_at(now - Duration::hours(60))
            .last_update(now - Duration::hours(1))
            .build();
        let resolved = TicketBuilder::new()
            .user_id(2)
            .created_at(now - Duration::hours(60))
            .status(Status::Resolved)
            .build();
        seed(&fixture, vec![stale.clone(), fresh, resolved]).await;

        let mut conn = fixture.store_connection().await;
        let overdue = overdue(&mut conn, now - Duration::hours(48)).await.unwrap();
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].id, stale.id);

        let count = count_created_since(&mut conn, 1, now - Duration::hours(72))
            .await
            .unwrap();
        assert_eq!(count, 2);
    }
}
