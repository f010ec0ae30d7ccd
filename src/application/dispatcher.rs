use crate::domain::event::GatewayEvent;
use crate::domain::ports::TaskStoreArc;
use crate::domain::task::TaskStatus;
use crate::error::Result;

/// What the dispatcher did with a verified event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The task advanced to the given status.
    Applied(TaskStatus),
    /// The event targeted an already-reached or passed status; dropped.
    /// Duplicate deliveries land here.
    NoOp,
    /// No task is correlated with the referenced hold; dropped.
    UnknownRef,
    /// The event type is not one the state machine reacts to.
    Ignored,
}

/// Maps verified gateway notifications onto task-state transitions.
///
/// Stateless apart from the shared store handle; safe to call concurrently
/// with the command facade.
pub struct EventDispatcher {
    store: TaskStoreArc,
}

impl EventDispatcher {
    pub fn new(store: TaskStoreArc) -> Self {
        Self { store }
    }

    /// Applies one verified event under the monotonic-transition rule.
    ///
    /// Unknown payment references are not errors: gateway notifications may
    /// reference objects outside this process's lifetime. Errors surface only
    /// for store failures.
    pub async fn dispatch(&self, event: GatewayEvent) -> Result<DispatchOutcome> {
        let Some(target) = event.kind.target_status() else {
            tracing::debug!(
                target: "taskhold::dispatcher",
                event_id = %event.id,
                payment_ref = %event.payment_ref,
                "Ignoring event type outside the transition table"
            );
            return Ok(DispatchOutcome::Ignored);
        };

        let Some(task) = self.store.get_by_payment_ref(&event.payment_ref).await? else {
            tracing::info!(
                target: "taskhold::dispatcher",
                event_id = %event.id,
                payment_ref = %event.payment_ref,
                event_created = event.created,
                "Dropping notification for unknown payment reference"
            );
            return Ok(DispatchOutcome::UnknownRef);
        };

        let mut current = task.status;
        loop {
            if !current.can_transition_to(target) {
                if current == TaskStatus::Captured && target == TaskStatus::Failed {
                    // Policy: captured is absorbing; a late failure report is
                    // an anomaly worth surfacing in the logs, nothing more.
                    tracing::warn!(
                        target: "taskhold::dispatcher",
                        task_id = %task.task_id,
                        payment_ref = %event.payment_ref,
                        reported_status = event.reported_status.as_deref().unwrap_or("-"),
                        "Failure notification for an already-captured task, dropping"
                    );
                }
                return Ok(DispatchOutcome::NoOp);
            }

            if self
                .store
                .compare_and_transition(&task.task_id, current, target)
                .await?
            {
                tracing::info!(
                    target: "taskhold::dispatcher",
                    task_id = %task.task_id,
                    from = %current,
                    to = %target,
                    event_id = %event.id,
                    event_created = event.created,
                    "Task transitioned"
                );
                return Ok(DispatchOutcome::Applied(target));
            }

            // Lost a race with a concurrent writer; re-read and re-decide.
            // Status ranks only move forward, so this terminates.
            match self.store.get(&task.task_id).await? {
                Some(fresh) => current = fresh.status,
                None => return Ok(DispatchOutcome::UnknownRef),
            }
        }
    }
}
