//! Command handlers
//!
//! One module per subcommand. Each handler builds a [`HandlerContext`] from
//! the resolved configuration, runs against the engine and prints through
//! the [`OutputFormatter`](crate::cli::OutputFormatter).

mod common;
mod init;
mod notifications;
mod report;
mod serve;
mod show;
mod sweep;
mod tickets;
mod users;

pub use common::{HandlerContext, format_datetime, ticket_line, user_line};
pub use init::handle_init;
pub use notifications::handle_notifications;
pub use report::handle_report;
pub use serve::{ServeEvent, handle_serve, respond};
pub use show::handle_show;
pub use sweep::handle_sweep;
pub use tickets::{ListArgs, handle_list};
pub use users::handle_users;
