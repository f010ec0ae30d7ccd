use crate::domain::ports::{
    CaptureOutcome, CreateHoldRequest, PaymentGatewayArc, TaskStoreArc,
};
use crate::domain::task::{Amount, Currency, PaymentRef, Task, TaskId, TaskStatus, TaskView};
use crate::error::{EscrowError, Result};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Identifiers handed back to the caller after a successful creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedTask {
    pub task_id: TaskId,
    pub payment_ref: PaymentRef,
}

/// The only surface the external messaging frontend calls.
///
/// Owns no task state itself; reads and writes go through the shared
/// [`TaskStore`](crate::domain::ports::TaskStore). Gateway calls always
/// complete before any state change is applied, so a failed call can never
/// leave the store partially updated.
pub struct EscrowFacade {
    gateway: PaymentGatewayArc,
    store: TaskStoreArc,
    currency: Currency,
    /// Per-task serialization of release attempts. Needed so that two
    /// concurrent releases issue exactly one capture call; the store's own
    /// lock cannot provide this because no gateway call may run under it.
    release_locks: Mutex<HashMap<TaskId, Arc<Mutex<()>>>>,
}

impl EscrowFacade {
    pub fn new(gateway: PaymentGatewayArc, store: TaskStoreArc) -> Self {
        Self::with_currency(gateway, store, Currency::usd())
    }

    pub fn with_currency(
        gateway: PaymentGatewayArc,
        store: TaskStoreArc,
        currency: Currency,
    ) -> Self {
        Self {
            gateway,
            store,
            currency,
            release_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Creates an escrow task: validates the amount, places the hold at the
    /// gateway, then records the task atomically with the fresh payment
    /// reference. The task starts in `new`.
    pub async fn create_task(&self, amount: Decimal, description: &str) -> Result<CreatedTask> {
        let amount = Amount::new(amount)?;
        let description = description.trim();
        if description.is_empty() {
            return Err(EscrowError::Validation(
                "description must not be empty".to_string(),
            ));
        }

        let task_id = TaskId::generate();
        let payment_ref = self
            .gateway
            .create_hold(CreateHoldRequest {
                amount,
                currency: self.currency.clone(),
                description: description.to_string(),
                correlation_key: task_id.clone(),
            })
            .await?;

        let task = Task::new(
            task_id.clone(),
            payment_ref.clone(),
            amount,
            self.currency.clone(),
            description,
        );
        self.store.insert(task).await?;

        tracing::info!(
            target: "taskhold::facade",
            task_id = %task_id,
            payment_ref = %payment_ref,
            %amount,
            "Escrow task created"
        );

        Ok(CreatedTask {
            task_id,
            payment_ref,
        })
    }

    pub async fn get_status(&self, task_id: &TaskId) -> Result<TaskView> {
        match self.store.get(task_id).await? {
            Some(task) => Ok(TaskView::from(&task)),
            None => Err(EscrowError::NotFound(format!("task {task_id}"))),
        }
    }

    /// Releases the escrow: captures the hold at the gateway, then
    /// optimistically transitions the task to `captured` (the matching
    /// capture-succeeded notification later confirms it as a no-op). A hold
    /// the gateway reports as already settled changes nothing locally; its
    /// notification decides the final status.
    ///
    /// Refused with a state conflict when the task is already terminal. Two
    /// concurrent calls for the same task result in exactly one capture call;
    /// the loser observes the conflict.
    pub async fn release_task(&self, task_id: &TaskId) -> Result<CaptureOutcome> {
        // Ids the store does not know never allocate a release lock, so
        // probing arbitrary ids cannot grow the lock map.
        if self.store.get(task_id).await?.is_none() {
            return self.release_unknown_task(task_id).await;
        }

        let guard = self.release_guard(task_id).await;
        let _released = guard.lock().await;

        let Some(task) = self.store.get(task_id).await? else {
            return self.release_unknown_task(task_id).await;
        };

        if task.status.is_terminal() {
            self.drop_release_guard(task_id).await;
            return Err(EscrowError::StateConflict {
                task_id: task_id.to_string(),
                status: task.status.to_string(),
            });
        }

        // Gateway first; only a successful capture may mutate the store.
        let outcome = self.gateway.capture(&task.payment_ref).await?;

        if outcome == CaptureOutcome::AlreadyFinal {
            // The hold already settled at the gateway, but this response does
            // not say which way: a hold that failed or was canceled reports
            // the same. Leave the status alone and let the gateway's own
            // notification carry the task to its true terminal state.
            tracing::info!(
                target: "taskhold::facade",
                task_id = %task_id,
                payment_ref = %task.payment_ref,
                "Hold already settled at the gateway, awaiting its notification"
            );
            return Ok(outcome);
        }

        let mut current = task.status;
        while current != TaskStatus::Captured {
            if self
                .store
                .compare_and_transition(task_id, current, TaskStatus::Captured)
                .await?
            {
                break;
            }
            match self.store.get(task_id).await? {
                Some(fresh) if fresh.status == TaskStatus::Failed => {
                    // The gateway reported success, so trust the capture; a
                    // concurrent failure event here is a gateway-side anomaly.
                    tracing::warn!(
                        target: "taskhold::facade",
                        task_id = %task_id,
                        "Task marked failed concurrently with a successful capture"
                    );
                    break;
                }
                Some(fresh) => current = fresh.status,
                None => break,
            }
        }

        // Terminal now; the task can never be released again.
        self.drop_release_guard(task_id).await;

        tracing::info!(
            target: "taskhold::facade",
            task_id = %task_id,
            payment_ref = %task.payment_ref,
            outcome = ?outcome,
            "Escrow released"
        );

        Ok(outcome)
    }

    /// Fallback for a release request the store cannot resolve: the hold may
    /// still exist at the gateway (e.g. the process restarted since the task
    /// was created), so search for it by correlation key.
    async fn release_unknown_task(&self, task_id: &TaskId) -> Result<CaptureOutcome> {
        let Some(payment_ref) = self.gateway.lookup(task_id).await? else {
            return Err(EscrowError::NotFound(format!("task {task_id}")));
        };

        tracing::info!(
            target: "taskhold::facade",
            task_id = %task_id,
            payment_ref = %payment_ref,
            "Recovered payment reference via gateway lookup"
        );

        // No local record exists to transition; the capture stands alone.
        self.gateway.capture(&payment_ref).await.map_err(Into::into)
    }

    async fn release_guard(&self, task_id: &TaskId) -> Arc<Mutex<()>> {
        let mut locks = self.release_locks.lock().await;
        locks.entry(task_id.clone()).or_default().clone()
    }

    /// Reclaims the lock entry for a task that reached a terminal status.
    /// Waiters already holding a clone still finish; they re-read the task
    /// and observe the conflict.
    async fn drop_release_guard(&self, task_id: &TaskId) {
        self.release_locks.lock().await.remove(task_id);
    }
}
