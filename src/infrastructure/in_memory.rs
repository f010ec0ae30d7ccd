use crate::domain::ports::TaskStore;
use crate::domain::task::{PaymentRef, Task, TaskId, TaskStatus};
use crate::error::{EscrowError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Forward map plus reverse index, mutated together under one lock so the
/// two can never disagree.
#[derive(Default)]
struct Maps {
    tasks: HashMap<TaskId, Task>,
    by_payment_ref: HashMap<PaymentRef, TaskId>,
}

/// A thread-safe in-memory task store.
///
/// Uses `Arc<RwLock<..>>` for shared concurrent access from the notification
/// and command ingress paths. Compare-and-transition runs as a single
/// critical section; no caller holds the lock across a gateway call. Tasks
/// are retained for the lifetime of the process.
#[derive(Default, Clone)]
pub struct InMemoryTaskStore {
    inner: Arc<RwLock<Maps>>,
}

impl InMemoryTaskStore {
    /// Creates a new, empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn insert(&self, task: Task) -> Result<()> {
        let mut maps = self.inner.write().await;
        if maps.tasks.contains_key(&task.task_id) {
            return Err(EscrowError::Validation(format!(
                "duplicate task id {}",
                task.task_id
            )));
        }
        if maps.by_payment_ref.contains_key(&task.payment_ref) {
            return Err(EscrowError::Validation(format!(
                "payment reference {} is already bound to a task",
                task.payment_ref
            )));
        }
        maps.by_payment_ref
            .insert(task.payment_ref.clone(), task.task_id.clone());
        maps.tasks.insert(task.task_id.clone(), task);
        Ok(())
    }

    async fn get(&self, task_id: &TaskId) -> Result<Option<Task>> {
        let maps = self.inner.read().await;
        Ok(maps.tasks.get(task_id).cloned())
    }

    async fn get_by_payment_ref(&self, payment_ref: &PaymentRef) -> Result<Option<Task>> {
        let maps = self.inner.read().await;
        let task = maps
            .by_payment_ref
            .get(payment_ref)
            .and_then(|task_id| maps.tasks.get(task_id))
            .cloned();
        Ok(task)
    }

    async fn compare_and_transition(
        &self,
        task_id: &TaskId,
        expected: TaskStatus,
        new_status: TaskStatus,
    ) -> Result<bool> {
        let mut maps = self.inner.write().await;
        let task = maps
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| EscrowError::NotFound(format!("task {task_id}")))?;

        if task.status != expected || !expected.can_transition_to(new_status) {
            return Ok(false);
        }
        task.status = new_status;
        Ok(true)
    }
}
