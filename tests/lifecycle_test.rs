//! End-to-end ticket lifecycle through the engine

mod common;

use common::{Desk, OPERATOR, OWNER};
use support_desk::core::{Action, Command, Inbound, Status};
use support_desk::{DeskError, Outcome};

#[tokio::test]
async fn test_full_lifecycle() {
    let desk = Desk::new().await;
    let ticket = desk.create(OWNER, "Router drops every few minutes").await;
    assert_eq!(ticket.status, Status::Open);

    desk.clock.advance_hours(2);
    let outcome = desk
        .engine
        .handle(Inbound::new(
            OPERATOR,
            Command::Resolve {
                ticket_id: ticket.id.clone(),
            },
        ))
        .await
        .unwrap();
    match outcome {
        Outcome::Transitioned {
            previous, ticket, ..
        } => {
            assert_eq!(previous, Status::Open);
            assert_eq!(ticket.status, Status::Resolved);
            assert_eq!(ticket.response_time, Some(120));
            assert_eq!(ticket.assigned_to, Some(OPERATOR));
        },
        other => panic!("unexpected outcome: {other:?}"),
    }

    desk.engine
        .handle(Inbound::new(
            OWNER,
            Command::Rate {
                ticket_id: ticket.id.clone(),
                rating: 4,
                comment: Some("Quick fix".to_string()),
            },
        ))
        .await
        .unwrap();
    desk.engine
        .handle(Inbound::new(
            OWNER,
            Command::Close {
                ticket_id: ticket.id.clone(),
            },
        ))
        .await
        .unwrap();

    let details = desk.engine.ticket_details(&ticket.id, None).await.unwrap();
    assert_eq!(details.ticket.status, Status::Closed);
    assert_eq!(details.ticket.rating, Some(4));
    assert_eq!(details.ticket.response_time, Some(120));
    let feedback = details.feedback.expect("feedback recorded");
    assert_eq!(feedback.rating, 4);
    assert_eq!(feedback.comment.as_deref(), Some("Quick fix"));

    // created, resolved, rated, closed
    assert!(desk.deliverer.sent_to(OWNER).len() >= 4);
    assert!(!desk.deliverer.sent_to(OPERATOR).is_empty());

    let recorded = desk
        .engine
        .recent_notifications(Some(OWNER), 50)
        .await
        .unwrap();
    assert_eq!(recorded.len(), desk.deliverer.sent_to(OWNER).len());
}

#[tokio::test]
async fn test_rating_twice_is_rejected() {
    let desk = Desk::new().await;
    let ticket = desk.create(OWNER, "No connection since morning").await;
    let owner = desk.engine.actor_for(OWNER);

    desk.engine
        .transition(owner, ticket.id.clone(), Action::Resolve)
        .await
        .unwrap();
    let rate = Action::Rate {
        rating: 5,
        comment: None,
    };
    desk.engine
        .transition(owner, ticket.id.clone(), rate.clone())
        .await
        .unwrap();

    let result = desk.engine.transition(owner, ticket.id.clone(), rate).await;
    assert!(matches!(result, Err(DeskError::Validation(_))));

    let details = desk.engine.ticket_details(&ticket.id, None).await.unwrap();
    assert!(details.feedback.is_some());
    assert_eq!(details.ticket.rating, Some(5));
}

#[tokio::test]
async fn test_terminal_ticket_accepts_no_transitions() {
    let desk = Desk::new().await;
    let ticket = desk.create(OWNER, "Laptop overheats").await;
    let owner = desk.engine.actor_for(OWNER);

    desk.engine
        .transition(owner, ticket.id.clone(), Action::Cancel)
        .await
        .unwrap();

    for action in [Action::Resolve, Action::Cancel, Action::Close] {
        let result = desk.engine.transition(owner, ticket.id.clone(), action).await;
        assert!(matches!(result, Err(DeskError::InvalidTransition { .. })));
    }

    let details = desk.engine.ticket_details(&ticket.id, None).await.unwrap();
    assert_eq!(details.ticket.status, Status::Cancelled);
    assert_eq!(details.ticket.response_time, Some(0));
}

#[tokio::test]
async fn test_sweeper_respects_threshold() {
    let desk = Desk::new().await;
    let stale = desk.create(OWNER, "Printer offline").await;
    desk.clock.advance_hours(47);
    let fresh = desk.create(OWNER, "Phone battery drains").await;
    desk.clock.advance_hours(2);

    let report = desk.engine.sweeper().sweep().await.unwrap();
    assert_eq!(report.closed, 1);

    let stale = desk.engine.ticket_details(&stale.id, None).await.unwrap();
    let fresh = desk.engine.ticket_details(&fresh.id, None).await.unwrap();
    assert_eq!(stale.ticket.status, Status::Closed);
    assert_eq!(fresh.ticket.status, Status::Open);
    assert!(
        desk.deliverer
            .sent_to(OWNER)
            .iter()
            .any(|text| text.contains(&stale.ticket.id.to_string()) && text.contains("48"))
    );
}
