mod common;

use common::MockGateway;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use taskhold::application::dispatcher::EventDispatcher;
use taskhold::application::facade::EscrowFacade;
use taskhold::domain::event::{EventKind, GatewayEvent};
use taskhold::domain::ports::CaptureOutcome;
use taskhold::domain::task::TaskStatus;
use taskhold::error::EscrowError;
use taskhold::infrastructure::in_memory::InMemoryTaskStore;

#[tokio::test]
async fn test_concurrent_releases_capture_exactly_once() {
    // The capture delay keeps the first release inside the gateway call long
    // enough for the second to pile up behind the status check.
    let gateway = Arc::new(MockGateway::with_capture_delay(Duration::from_millis(50)));
    let store = Arc::new(InMemoryTaskStore::new());
    let facade = Arc::new(EscrowFacade::new(gateway.clone(), store));

    let created = facade.create_task(dec!(5.00), "Logo").await.unwrap();

    let a = tokio::spawn({
        let facade = facade.clone();
        let task_id = created.task_id.clone();
        async move { facade.release_task(&task_id).await }
    });
    let b = tokio::spawn({
        let facade = facade.clone();
        let task_id = created.task_id.clone();
        async move { facade.release_task(&task_id).await }
    });

    let results = [a.await.unwrap(), b.await.unwrap()];

    assert_eq!(gateway.capture_count(), 1);
    let successes = results
        .iter()
        .filter(|r| matches!(r, Ok(CaptureOutcome::Captured)))
        .count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(EscrowError::StateConflict { .. })))
        .count();
    assert_eq!(successes, 1);
    assert_eq!(conflicts, 1);

    let view = facade.get_status(&created.task_id).await.unwrap();
    assert_eq!(view.status, TaskStatus::Captured);
}

#[tokio::test]
async fn test_release_racing_notifications_converges_on_captured() {
    let gateway = Arc::new(MockGateway::with_capture_delay(Duration::from_millis(20)));
    let store = Arc::new(InMemoryTaskStore::new());
    let facade = Arc::new(EscrowFacade::new(gateway.clone(), store.clone()));
    let dispatcher = Arc::new(EventDispatcher::new(store));

    let created = facade.create_task(dec!(5.00), "Logo").await.unwrap();

    // Notification channel and command channel run concurrently: the gateway
    // authorizes then confirms the capture while the release is in flight.
    let release = tokio::spawn({
        let facade = facade.clone();
        let task_id = created.task_id.clone();
        async move { facade.release_task(&task_id).await }
    });
    let notifications = tokio::spawn({
        let dispatcher = dispatcher.clone();
        let payment_ref = created.payment_ref.clone();
        async move {
            for (id, kind) in [
                ("evt_auth", EventKind::HoldAuthorized),
                ("evt_cap", EventKind::CaptureSucceeded),
            ] {
                dispatcher
                    .dispatch(GatewayEvent {
                        id: id.to_string(),
                        kind,
                        payment_ref: payment_ref.clone(),
                        reported_status: None,
                        created: 0,
                    })
                    .await
                    .unwrap();
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }
    });

    release.await.unwrap().unwrap();
    notifications.await.unwrap();

    assert_eq!(gateway.capture_count(), 1);
    let view = facade.get_status(&created.task_id).await.unwrap();
    assert_eq!(view.status, TaskStatus::Captured);
}

#[tokio::test]
async fn test_duplicate_notification_storm_applies_once() {
    let gateway = Arc::new(MockGateway::new());
    let store = Arc::new(InMemoryTaskStore::new());
    let facade = EscrowFacade::new(gateway, store.clone());
    let dispatcher = Arc::new(EventDispatcher::new(store));

    let created = facade.create_task(dec!(5.00), "Logo").await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..16 {
        handles.push(tokio::spawn({
            let dispatcher = dispatcher.clone();
            let payment_ref = created.payment_ref.clone();
            async move {
                dispatcher
                    .dispatch(GatewayEvent {
                        id: "evt_dup".to_string(),
                        kind: EventKind::CaptureSucceeded,
                        payment_ref,
                        reported_status: None,
                        created: 0,
                    })
                    .await
                    .unwrap()
            }
        }));
    }

    let mut applied = 0;
    for handle in handles {
        if matches!(
            handle.await.unwrap(),
            taskhold::application::dispatcher::DispatchOutcome::Applied(_)
        ) {
            applied += 1;
        }
    }

    // Exactly one delivery wins the transition; the rest are no-ops.
    assert_eq!(applied, 1);
    let view = facade.get_status(&created.task_id).await.unwrap();
    assert_eq!(view.status, TaskStatus::Captured);
}
