use rust_decimal_macros::dec;
use std::sync::Arc;
use taskhold::application::dispatcher::{DispatchOutcome, EventDispatcher};
use taskhold::domain::event::{EventKind, GatewayEvent};
use taskhold::domain::ports::TaskStoreArc;
use taskhold::domain::task::{Amount, Currency, PaymentRef, Task, TaskId, TaskStatus};
use taskhold::infrastructure::in_memory::InMemoryTaskStore;

const PAYMENT_REF: &str = "pi_777";
const TASK_ID: &str = "a1b2c3d4";

async fn seeded() -> (TaskStoreArc, EventDispatcher) {
    let store: TaskStoreArc = Arc::new(InMemoryTaskStore::new());
    let task = Task::new(
        TaskId::new(TASK_ID),
        PaymentRef::new(PAYMENT_REF),
        Amount::new(dec!(5.00)).unwrap(),
        Currency::usd(),
        "Logo",
    );
    store.insert(task).await.unwrap();
    let dispatcher = EventDispatcher::new(store.clone());
    (store, dispatcher)
}

fn event(kind: EventKind) -> GatewayEvent {
    GatewayEvent {
        id: "evt_1".to_string(),
        kind,
        payment_ref: PaymentRef::new(PAYMENT_REF),
        reported_status: None,
        created: 1_700_000_000,
    }
}

async fn status_of(store: &TaskStoreArc) -> TaskStatus {
    store
        .get(&TaskId::new(TASK_ID))
        .await
        .unwrap()
        .unwrap()
        .status
}

#[tokio::test]
async fn test_replay_is_idempotent() {
    let (store, dispatcher) = seeded().await;

    let first = dispatcher.dispatch(event(EventKind::HoldAuthorized)).await.unwrap();
    assert_eq!(first, DispatchOutcome::Applied(TaskStatus::Authorized));

    for _ in 0..5 {
        let replay = dispatcher.dispatch(event(EventKind::HoldAuthorized)).await.unwrap();
        assert_eq!(replay, DispatchOutcome::NoOp);
    }
    assert_eq!(status_of(&store).await, TaskStatus::Authorized);
}

#[tokio::test]
async fn test_capture_event_skips_authorized() {
    let (store, dispatcher) = seeded().await;

    // A successful capture implies authorization; jumping from `new`
    // straight to `captured` is valid.
    let outcome = dispatcher
        .dispatch(event(EventKind::CaptureSucceeded))
        .await
        .unwrap();

    assert_eq!(outcome, DispatchOutcome::Applied(TaskStatus::Captured));
    assert_eq!(status_of(&store).await, TaskStatus::Captured);
}

#[tokio::test]
async fn test_monotonic_violation_leaves_status_unchanged() {
    let (store, dispatcher) = seeded().await;

    dispatcher
        .dispatch(event(EventKind::CaptureSucceeded))
        .await
        .unwrap();

    // An authorized notification arriving late must not move us backward.
    let late = dispatcher.dispatch(event(EventKind::HoldAuthorized)).await.unwrap();
    assert_eq!(late, DispatchOutcome::NoOp);
    assert_eq!(status_of(&store).await, TaskStatus::Captured);
}

#[tokio::test]
async fn test_failed_absorbs_authorized() {
    let (store, dispatcher) = seeded().await;

    dispatcher.dispatch(event(EventKind::HoldAuthorized)).await.unwrap();
    let outcome = dispatcher.dispatch(event(EventKind::PaymentFailed)).await.unwrap();

    assert_eq!(outcome, DispatchOutcome::Applied(TaskStatus::Failed));
    assert_eq!(status_of(&store).await, TaskStatus::Failed);
}

#[tokio::test]
async fn test_failed_is_terminal() {
    let (store, dispatcher) = seeded().await;

    dispatcher.dispatch(event(EventKind::PaymentFailed)).await.unwrap();

    let after = dispatcher.dispatch(event(EventKind::HoldAuthorized)).await.unwrap();
    assert_eq!(after, DispatchOutcome::NoOp);
    let after = dispatcher.dispatch(event(EventKind::CaptureSucceeded)).await.unwrap();
    assert_eq!(after, DispatchOutcome::NoOp);
    assert_eq!(status_of(&store).await, TaskStatus::Failed);
}

#[tokio::test]
async fn test_failed_after_captured_is_dropped() {
    let (store, dispatcher) = seeded().await;

    dispatcher.dispatch(event(EventKind::CaptureSucceeded)).await.unwrap();
    let late_failure = dispatcher.dispatch(event(EventKind::PaymentFailed)).await.unwrap();

    assert_eq!(late_failure, DispatchOutcome::NoOp);
    assert_eq!(status_of(&store).await, TaskStatus::Captured);
}
