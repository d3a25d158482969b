//! Core domain types for the support desk
//!
//! Tickets, users and the records hanging off them, the typed intents the
//! engine accepts, and the lifecycle state machine that validates them.
//! Nothing in here touches storage or the clock directly.

mod builders;
mod catalog;
mod intent;
mod lifecycle;
mod records;
mod ticket;
mod user;

pub use builders::TicketBuilder;
pub use catalog::{CategoryCatalog, StaticCatalog};
pub use intent::{Action, Actor, Command, Inbound};
pub use lifecycle::{RATING_RANGE, Transition};
pub use records::{Feedback, Message, NewFeedback, NewMessage, Notification};
pub use ticket::{Priority, Status, Ticket, TicketId};
pub use user::{User, UserId, UserProfile, UserStats};
