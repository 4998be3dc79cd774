//! In-memory implementation of TaskStore for testing and embedding

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::debug;

use super::store::*;

/// In-memory implementation of TaskStore
///
/// All rows live behind a single lock, which makes every pick atomic with
/// respect to concurrent pickers. Rows are scanned in id order, so picks are
/// FIFO for tasks that became eligible at the same time.
///
/// # Example
///
/// ```
/// use lease_queue::InMemoryTaskStore;
///
/// let store = InMemoryTaskStore::new();
/// let id = store.enqueue("send_receipt", serde_json::json!({"donation_id": 42}));
/// assert_eq!(store.get(id).unwrap().task_type, "send_receipt");
/// ```
pub struct InMemoryTaskStore {
    tasks: RwLock<BTreeMap<TaskId, Task>>,
    next_id: AtomicI64,
}

impl InMemoryTaskStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    /// Insert a pending task with a generated id
    pub fn enqueue(&self, task_type: impl Into<String>, payload: serde_json::Value) -> TaskId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.tasks.write().insert(id, Task::new(id, task_type, payload));
        id
    }

    /// Insert a task as-is, replacing any row with the same id
    pub fn insert(&self, task: Task) {
        self.next_id.fetch_max(task.id + 1, Ordering::Relaxed);
        self.tasks.write().insert(task.id, task);
    }

    /// Get a snapshot of a task
    pub fn get(&self, id: TaskId) -> Option<Task> {
        self.tasks.read().get(&id).cloned()
    }

    /// Get the number of tasks with the given status
    pub fn count_by_status(&self, status: TaskStatus) -> usize {
        self.tasks
            .read()
            .values()
            .filter(|t| t.status == status)
            .count()
    }

    /// Get the total number of tasks
    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }

    /// Clear all data (for testing)
    pub fn clear(&self) {
        self.tasks.write().clear();
    }
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

fn is_eligible(task: &Task, now: DateTime<Utc>) -> bool {
    match task.status {
        TaskStatus::Pending => true,
        TaskStatus::ErrorRetryable => {
            task.attempt < task.max_retries && task.run_after.map_or(true, |at| at <= now)
        }
        // Lease expired: the previous owner lost its claim
        TaskStatus::Locked => task.locked_until.map_or(true, |until| until < now),
        TaskStatus::Done | TaskStatus::ErrorUnretryable => false,
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn pick_tasks(&self, params: PickTasksParams) -> Result<Vec<Task>, StoreError> {
        if params.max_count == 0 || params.supported_types.is_empty() {
            return Ok(vec![]);
        }

        let now = Utc::now();
        let locked_until = saturating_add(now, params.lease_duration);
        let mut tasks = self.tasks.write();
        let mut picked = Vec::with_capacity(params.max_count);

        for task in tasks.values_mut() {
            if picked.len() >= params.max_count {
                break;
            }

            if !params.supported_types.contains(&task.task_type) || !is_eligible(task, now) {
                continue;
            }

            task.status = TaskStatus::Locked;
            task.locked_until = Some(locked_until);
            task.locked_by = Some(params.lease_owner.clone());
            task.updated_at = now;
            picked.push(task.clone());
        }

        if !picked.is_empty() {
            debug!(owner = %params.lease_owner, count = picked.len(), "picked tasks");
        }

        Ok(picked)
    }

    async fn ack_tasks(&self, ids: &[TaskId]) -> Result<u64, StoreError> {
        let now = Utc::now();
        let mut tasks = self.tasks.write();
        let mut count = 0;

        for id in ids {
            if let Some(task) = tasks.get_mut(id) {
                task.status = TaskStatus::Done;
                task.locked_until = None;
                task.locked_by = None;
                task.updated_at = now;
                count += 1;
            }
        }

        Ok(count)
    }

    async fn nack_task(&self, params: NackTaskParams) -> Result<u64, StoreError> {
        let now = Utc::now();
        let mut tasks = self.tasks.write();
        let Some(task) = tasks.get_mut(&params.task_id) else {
            return Ok(0);
        };

        if task.locked_by.as_deref() != Some(params.lease_owner.as_str()) {
            debug!(
                task_id = params.task_id,
                owner = %params.lease_owner,
                "nack ignored, lease held by another owner"
            );
            return Ok(0);
        }

        task.status = params.status;
        task.last_error = params.error_message;
        task.locked_until = None;
        task.locked_by = None;
        task.updated_at = now;

        if params.status == TaskStatus::ErrorRetryable {
            task.attempt += 1;
            task.run_after = Some(saturating_add(now, params.retry_in.unwrap_or_default()));
        } else {
            task.run_after = None;
        }

        Ok(1)
    }
}
