//! Aggregate queries for operator reporting

use crate::core::Priority;
use crate::error::{DeskError, Result};
use serde::Serialize;
use sqlx::SqliteConnection;

/// Desk-wide totals
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub total: i64,
    /// Tickets whose current status is `resolved`
    pub solved: i64,
    pub avg_response_time: Option<f64>,
    pub avg_rating: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: i64,
}

/// Tickets created during one hour of the day (UTC)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HourCount {
    pub hour: u8,
    pub count: i64,
}

/// Tickets created on one weekday, `0` being Sunday
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WeekdayCount {
    pub weekday: u8,
    pub count: i64,
}

impl WeekdayCount {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self.weekday {
            0 => "Sunday",
            1 => "Monday",
            2 => "Tuesday",
            3 => "Wednesday",
            4 => "Thursday",
            5 => "Friday",
            _ => "Saturday",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriorityStat {
    pub priority: Priority,
    pub count: i64,
    pub avg_response_time: Option<f64>,
}

/// Everything the `report` view shows
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub summary: Summary,
    pub by_category: Vec<CategoryCount>,
    pub by_hour: Vec<HourCount>,
    pub by_weekday: Vec<WeekdayCount>,
    pub by_priority: Vec<PriorityStat>,
}

pub async fn summary(conn: &mut SqliteConnection) -> Result<Summary> {
    let (total, solved, avg_response_time, avg_rating): (i64, i64, Option<f64>, Option<f64>) =
        sqlx::query_as(
            "SELECT COUNT(*), \
                 COALESCE(SUM(CASE WHEN status = 'resolved' THEN 1 ELSE 0 END), 0), \
                 AVG(response_time), \
                 AVG(satisfaction_rating) \
             FROM tickets",
        )
        .fetch_one(&mut *conn)
        .await?;

    Ok(Summary {
        total,
        solved,
        avg_response_time,
        avg_rating,
    })
}

pub async fn by_category(conn: &mut SqliteConnection) -> Result<Vec<CategoryCount>> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT category, COUNT(*) AS count FROM tickets \
         GROUP BY category ORDER BY count DESC, category",
    )
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(category, count)| CategoryCount { category, count })
        .collect())
}

pub async fn by_hour(conn: &mut SqliteConnection) -> Result<Vec<HourCount>> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT strftime('%H', created_at) AS hour, COUNT(*) FROM tickets \
         WHERE hour IS NOT NULL GROUP BY hour ORDER BY hour",
    )
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter()
        .map(|(hour, count)| Ok(HourCount { hour: parse_bucket(&hour)?, count }))
        .collect()
}

pub async fn by_weekday(conn: &mut SqliteConnection) -> Result<Vec<WeekdayCount>> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT strftime('%w', created_at) AS weekday, COUNT(*) FROM tickets \
         WHERE weekday IS NOT NULL GROUP BY weekday ORDER BY weekday",
    )
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter()
        .map(|(weekday, count)| {
            Ok(WeekdayCount {
                weekday: parse_bucket(&weekday)?,
                count,
            })
        })
        .collect()
}

pub async fn by_priority(conn: &mut SqliteConnection) -> Result<Vec<PriorityStat>> {
    let rows: Vec<(String, i64, Option<f64>)> = sqlx::query_as(
        "SELECT priority, COUNT(*) AS count, AVG(response_time) FROM tickets \
         GROUP BY priority ORDER BY count DESC, priority",
    )
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter()
        .map(|(priority, count, avg_response_time)| {
            Ok(PriorityStat {
                priority: priority.parse()?,
                count,
                avg_response_time,
            })
        })
        .collect()
}

/// Run every report query
pub async fn full(conn: &mut SqliteConnection) -> Result<Report> {
    Ok(Report {
        summary: summary(conn).await?,
        by_category: by_category(conn).await?,
        by_hour: by_hour(conn).await?,
        by_weekday: by_weekday(conn).await?,
        by_priority: by_priority(conn).await?,
    })
}

fn parse_bucket(value: &str) -> Result<u8> {
    value
        .parse()
        .map_err(|_| DeskError::validation(format!("Unexpected time bucket: {value}")))
}
