//! SQLite persistence
//!
//! [`Store`] owns the connection pool and the retry discipline. The row
//! modules hold the queries; they take a bare connection and are only ever
//! called from inside a [`Store::execute`] body.

pub mod messages;
pub mod notifications;
pub mod reports;
mod schema;
mod store;
pub mod tickets;
pub mod users;

pub use reports::{CategoryCount, HourCount, PriorityStat, Report, Summary, WeekdayCount};
pub use store::{RetryPolicy, Store, TxFuture};
pub use tickets::TicketFilter;
