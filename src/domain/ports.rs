use super::task::{Amount, Currency, PaymentRef, Task, TaskId, TaskStatus};
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Parameters for placing a new hold at the gateway.
#[derive(Debug, Clone)]
pub struct CreateHoldRequest {
    pub amount: Amount,
    pub currency: Currency,
    pub description: String,
    /// Embedded in the gateway object's metadata so notifications and
    /// fallback lookups can be resolved back to the task.
    pub correlation_key: TaskId,
}

/// Result of a capture call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// The hold was captured by this call.
    Captured,
    /// The reference was already captured or already failed; nothing to do.
    AlreadyFinal,
}

/// Outbound boundary to the external payment gateway. Stateless.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Places a hold with manual-capture semantics (funds authorized, not
    /// transferred) and the correlation key embedded in metadata.
    async fn create_hold(
        &self,
        request: CreateHoldRequest,
    ) -> std::result::Result<PaymentRef, GatewayError>;

    /// Finalizes a previously placed hold. A second call against an already
    /// final reference reports [`CaptureOutcome::AlreadyFinal`] instead of a
    /// generic failure.
    async fn capture(
        &self,
        payment_ref: &PaymentRef,
    ) -> std::result::Result<CaptureOutcome, GatewayError>;

    /// Finds the hold carrying `correlation_key` in its metadata via the
    /// gateway's search facility. `Ok(None)` when no such object exists.
    async fn lookup(
        &self,
        correlation_key: &TaskId,
    ) -> std::result::Result<Option<PaymentRef>, GatewayError>;
}

/// The authoritative in-process record of every escrow task.
///
/// `compare_and_transition` is the sole mutation path after insert; both the
/// dispatcher and the facade's optimistic post-capture update go through it.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Records a freshly created task, atomically with its reverse
    /// `payment_ref -> task_id` mapping. Duplicate ids are rejected.
    async fn insert(&self, task: Task) -> Result<()>;

    async fn get(&self, task_id: &TaskId) -> Result<Option<Task>>;

    async fn get_by_payment_ref(&self, payment_ref: &PaymentRef) -> Result<Option<Task>>;

    /// Atomically moves the task from `expected` to `new_status`.
    ///
    /// Returns `Ok(false)` without mutating when the current status is not
    /// `expected`, or when the transition is illegal under the central
    /// transition table. Errors only when the task does not exist.
    async fn compare_and_transition(
        &self,
        task_id: &TaskId,
        expected: TaskStatus,
        new_status: TaskStatus,
    ) -> Result<bool>;
}

pub type PaymentGatewayArc = Arc<dyn PaymentGateway>;
pub type TaskStoreArc = Arc<dyn TaskStore>;
