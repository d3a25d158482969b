//! Ticket lifecycle state machine
//!
//! Pure transition logic: given the current ticket, an [`Action`] and the
//! [`Actor`] performing it, either produce the next ticket state (plus any
//! message or feedback the transition records) or reject the intent without
//! touching anything.
//!
//! | From     | Action      | Actor                 | To        |
//! |----------|-------------|-----------------------|-----------|
//! | Open     | resolve     | operator or owner     | Resolved  |
//! | Open     | reject      | operator              | Rejected  |
//! | Open     | cancel      | owner                 | Cancelled |
//! | Open     | auto-expire | sweeper               | Closed    |
//! | Resolved | rate        | owner                 | Resolved  |
//! | Resolved | close       | owner or operator     | Closed    |
//! | any      | comment     | owner or operator     | unchanged |

use super::{Action, Actor, NewFeedback, NewMessage, Status, Ticket};
use crate::error::{DeskError, Result};
use chrono::{DateTime, Utc};

/// Lowest and highest accepted satisfaction rating
pub const RATING_RANGE: std::ops::RangeInclusive<u8> = 1..=5;

/// Outcome of a successful transition
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Status before the action was applied
    pub previous: Status,
    /// The ticket after the action
    pub ticket: Ticket,
    /// Message to append to the ticket's trail
    pub message: Option<NewMessage>,
    /// Feedback row to record
    pub feedback: Option<NewFeedback>,
}

impl Ticket {
    /// Validate and apply `action` performed by `actor` at `now`
    ///
    /// State is checked first, then the actor, then the payload. On any
    /// failure `self` is left as it was and nothing is produced.
    pub fn apply(&self, action: &Action, actor: Actor, now: DateTime<Utc>) -> Result<Transition> {
        let mut next = self.clone();
        let mut message = None;
        let mut feedback = None;

        match action {
            Action::Resolve => {
                self.require_status(action, &[Status::Open])?;
                self.require_actor(action, actor, actor.is_operator() || actor.owns(self))?;
                next.status = Status::Resolved;
            },
            Action::Reject { reason } => {
                self.require_status(action, &[Status::Open])?;
                self.require_actor(action, actor, actor.is_operator())?;
                let reason = non_empty(reason, "A rejection reason is required")?;
                next.status = Status::Rejected;
                message = Some(NewMessage {
                    sender_id: actor.id().unwrap_or(self.user_id),
                    body: format!("Ticket rejected. Reason: {reason}"),
                    internal: false,
                });
            },
            Action::Cancel => {
                self.require_status(action, &[Status::Open])?;
                self.require_actor(action, actor, actor.owns(self))?;
                next.status = Status::Cancelled;
            },
            Action::AutoExpire { threshold } => {
                self.require_status(action, &[Status::Open])?;
                self.require_actor(action, actor, actor == Actor::Sweeper)?;
                if now - self.last_update <= *threshold {
                    return Err(self.invalid(action));
                }
                next.status = Status::Closed;
            },
            Action::Rate { rating, comment } => {
                self.require_status(action, &[Status::Resolved])?;
                self.require_actor(action, actor, actor.owns(self))?;
                if self.rating.is_some() {
                    return Err(DeskError::validation("This ticket has already been rated"));
                }
                if !RATING_RANGE.contains(rating) {
                    return Err(DeskError::validation(format!(
                        "Rating must be between {} and {}",
                        RATING_RANGE.start(),
                        RATING_RANGE.end()
                    )));
                }
                next.rating = Some(*rating);
                feedback = Some(NewFeedback {
                    user_id: self.user_id,
                    rating: *rating,
                    comment: comment
                        .as_deref()
                        .map(str::trim)
                        .filter(|c| !c.is_empty())
                        .map(str::to_string),
                });
            },
            Action::Close => {
                self.require_status(action, &[Status::Resolved])?;
                self.require_actor(action, actor, actor.is_operator() || actor.owns(self))?;
                next.status = Status::Closed;
            },
            Action::Comment { text, internal } => {
                self.require_actor(action, actor, actor.is_operator() || actor.owns(self))?;
                if *internal && !actor.is_operator() {
                    return Err(self.not_permitted(action, actor));
                }
                let text = non_empty(text, "Message cannot be empty")?;
                message = Some(NewMessage {
                    sender_id: actor.id().unwrap_or(self.user_id),
                    body: text.to_string(),
                    internal: *internal,
                });
            },
        }

        if self.status == Status::Open && next.status != Status::Open && next.response_time.is_none()
        {
            next.response_time = Some((now - self.created_at).num_minutes().max(0));
        }
        if let Actor::Operator(operator) = actor {
            if self.status == Status::Open && next.assigned_to.is_none() {
                next.assigned_to = Some(operator);
            }
        }
        next.last_update = now;

        Ok(Transition {
            previous: self.status,
            ticket: next,
            message,
            feedback,
        })
    }

    fn require_status(&self, action: &Action, allowed: &[Status]) -> Result<()> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(self.invalid(action))
        }
    }

    fn require_actor(&self, action: &Action, actor: Actor, permitted: bool) -> Result<()> {
        if permitted {
            Ok(())
        } else {
            Err(self.not_permitted(action, actor))
        }
    }

    fn invalid(&self, action: &Action) -> DeskError {
        DeskError::InvalidTransition {
            action: action.name().to_string(),
            status: self.status,
        }
    }

    fn not_permitted(&self, action: &Action, actor: Actor) -> DeskError {
        DeskError::NotPermitted {
            action: action.name().to_string(),
            actor: actor.id().unwrap_or_default(),
        }
    }
}

fn non_empty<'a>(text: &'a str, message: &str) -> Result<&'a str> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        Err(DeskError::validation(message))
    } else {
        Ok(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TicketBuilder;
    use chrono::{Duration, TimeDelta};

    const OWNER: i64 = 100;
    const OPERATOR: i64 = 900;

    fn open_ticket(created: DateTime<Utc>) -> Ticket {
        TicketBuilder::new()
            .user_id(OWNER)
            .category("internet")
            .description("Router keeps rebooting")
            .created_at(created)
            .build()
    }

    fn all_actions() -> Vec<Action> {
        vec![
            Action::Resolve,
            Action::Reject {
                reason: "duplicate".to_string(),
            },
            Action::Cancel,
            Action::AutoExpire {
                threshold: TimeDelta::hours(48),
            },
            Action::Rate {
                rating: 5,
                comment: None,
            },
            Action::Close,
        ]
    }

    #[test]
    fn test_resolve_sets_response_time_once() {
        let created = Utc::now() - Duration::minutes(90);
        let ticket = open_ticket(created);
        let now = created + Duration::minutes(45);

        let transition = ticket
            .apply(&Action::Resolve, Actor::Operator(OPERATOR), now)
            .unwrap();
        assert_eq!(transition.previous, Status::Open);
        assert_eq!(transition.ticket.status, Status::Resolved);
        assert_eq!(transition.ticket.response_time, Some(45));
        assert_eq!(transition.ticket.assigned_to, Some(OPERATOR));
        assert_eq!(transition.ticket.last_update, now);

        let later = now + Duration::hours(3);
        let closed = transition
            .ticket
            .apply(&Action::Close, Actor::User(OWNER), later)
            .unwrap();
        assert_eq!(closed.ticket.status, Status::Closed);
        assert_eq!(closed.ticket.response_time, Some(45));
    }

    #[test]
    fn test_owner_can_self_resolve() {
        let ticket = open_ticket(Utc::now());
        let transition = ticket
            .apply(&Action::Resolve, Actor::User(OWNER), Utc::now())
            .unwrap();
        assert_eq!(transition.ticket.status, Status::Resolved);
        assert!(transition.ticket.assigned_to.is_none());
    }

    #[test]
    fn test_stranger_cannot_resolve() {
        let ticket = open_ticket(Utc::now());
        let err = ticket
            .apply(&Action::Resolve, Actor::User(OWNER + 1), Utc::now())
            .unwrap_err();
        assert!(matches!(err, DeskError::NotPermitted { .. }));
    }

    #[test]
    fn test_reject_requires_operator_and_reason() {
        let ticket = open_ticket(Utc::now());
        let reason = Action::Reject {
            reason: "out of scope".to_string(),
        };

        assert!(matches!(
            ticket.apply(&reason, Actor::User(OWNER), Utc::now()),
            Err(DeskError::NotPermitted { .. })
        ));
        assert!(matches!(
            ticket.apply(
                &Action::Reject {
                    reason: "   ".to_string()
                },
                Actor::Operator(OPERATOR),
                Utc::now()
            ),
            Err(DeskError::Validation(_))
        ));

        let transition = ticket
            .apply(&reason, Actor::Operator(OPERATOR), Utc::now())
            .unwrap();
        assert_eq!(transition.ticket.status, Status::Rejected);
        let message = transition.message.unwrap();
        assert_eq!(message.body, "Ticket rejected. Reason: out of scope");
        assert_eq!(message.sender_id, OPERATOR);
        assert!(!message.internal);
    }

    #[test]
    fn test_cancel_is_owner_only() {
        let ticket = open_ticket(Utc::now());
        assert!(matches!(
            ticket.apply(&Action::Cancel, Actor::Operator(OPERATOR), Utc::now()),
            Err(DeskError::NotPermitted { .. })
        ));
        let transition = ticket
            .apply(&Action::Cancel, Actor::User(OWNER), Utc::now())
            .unwrap();
        assert_eq!(transition.ticket.status, Status::Cancelled);
        assert!(transition.ticket.response_time.is_some());
    }

    #[test]
    fn test_auto_expire_respects_threshold() {
        let created = Utc::now() - Duration::hours(72);
        let mut ticket = open_ticket(created);
        let expire = Action::AutoExpire {
            threshold: TimeDelta::hours(48),
        };

        ticket.last_update = Utc::now() - Duration::hours(47);
        assert!(matches!(
            ticket.apply(&expire, Actor::Sweeper, Utc::now()),
            Err(DeskError::InvalidTransition { .. })
        ));

        ticket.last_update = Utc::now() - Duration::hours(49);
        let transition = ticket.apply(&expire, Actor::Sweeper, Utc::now()).unwrap();
        assert_eq!(transition.ticket.status, Status::Closed);

        assert!(matches!(
            ticket.apply(&expire, Actor::User(OWNER), Utc::now()),
            Err(DeskError::NotPermitted { .. })
        ));
    }

    #[test]
    fn test_rate_only_once_and_in_range() {
        let ticket = open_ticket(Utc::now() - Duration::hours(1));
        let resolved = ticket
            .apply(&Action::Resolve, Actor::Operator(OPERATOR), Utc::now())
            .unwrap()
            .ticket;

        for bad in [0, 6] {
            let err = resolved
                .apply(
                    &Action::Rate {
                        rating: bad,
                        comment: None,
                    },
                    Actor::User(OWNER),
                    Utc::now(),
                )
                .unwrap_err();
            assert!(matches!(err, DeskError::Validation(_)));
        }

        let rated = resolved
            .apply(
                &Action::Rate {
                    rating: 4,
                    comment: Some(" quick fix ".to_string()),
                },
                Actor::User(OWNER),
                Utc::now(),
            )
            .unwrap();
        assert_eq!(rated.ticket.status, Status::Resolved);
        assert_eq!(rated.ticket.rating, Some(4));
        assert_eq!(rated.previous, Status::Resolved);
        let feedback = rated.feedback.unwrap();
        assert_eq!(feedback.rating, 4);
        assert_eq!(feedback.comment.as_deref(), Some("quick fix"));

        let err = rated
            .ticket
            .apply(
                &Action::Rate {
                    rating: 5,
                    comment: None,
                },
                Actor::User(OWNER),
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, DeskError::Validation(_)));
    }

    #[test]
    fn test_rate_requires_resolved() {
        let ticket = open_ticket(Utc::now());
        let err = ticket
            .apply(
                &Action::Rate {
                    rating: 3,
                    comment: None,
                },
                Actor::User(OWNER),
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            DeskError::InvalidTransition {
                status: Status::Open,
                ..
            }
        ));
    }

    #[test]
    fn test_terminal_states_reject_every_transition() {
        let now = Utc::now();
        for status in [Status::Closed, Status::Cancelled, Status::Rejected] {
            let ticket = TicketBuilder::new()
                .user_id(OWNER)
                .status(status)
                .created_at(now - Duration::days(10))
                .build();
            let before = ticket.clone();

            for action in all_actions() {
                let actor = match action {
                    Action::AutoExpire { .. } => Actor::Sweeper,
                    Action::Reject { .. } => Actor::Operator(OPERATOR),
                    _ => Actor::User(OWNER),
                };
                match ticket.apply(&action, actor, now) {
                    Err(DeskError::InvalidTransition {
                        action: name,
                        status: current,
                    }) => {
                        assert_eq!(name, action.name());
                        assert_eq!(current, status);
                    },
                    other => panic!("expected InvalidTransition for {action:?}, got {other:?}"),
                }
            }
            assert_eq!(ticket, before);
        }
    }

    #[test]
    fn test_comment_allowed_in_any_state() {
        let now = Utc::now();
        let closed = TicketBuilder::new()
            .user_id(OWNER)
            .status(Status::Closed)
            .response_time(12)
            .build();

        let transition = closed
            .apply(
                &Action::Comment {
                    text: "Thanks again!".to_string(),
                    internal: false,
                },
                Actor::User(OWNER),
                now,
            )
            .unwrap();
        assert_eq!(transition.ticket.status, Status::Closed);
        assert_eq!(transition.ticket.response_time, Some(12));
        assert_eq!(transition.ticket.last_update, now);
        assert_eq!(transition.message.unwrap().body, "Thanks again!");
    }

    #[test]
    fn test_internal_note_is_operator_only() {
        let ticket = open_ticket(Utc::now());
        let note = Action::Comment {
            text: "customer is on legacy plan".to_string(),
            internal: true,
        };
        assert!(matches!(
            ticket.apply(&note, Actor::User(OWNER), Utc::now()),
            Err(DeskError::NotPermitted { .. })
        ));
        let transition = ticket
            .apply(&note, Actor::Operator(OPERATOR), Utc::now())
            .unwrap();
        assert!(transition.message.unwrap().internal);
        assert_eq!(transition.ticket.status, Status::Open);
        assert!(transition.ticket.response_time.is_none());
    }
}
