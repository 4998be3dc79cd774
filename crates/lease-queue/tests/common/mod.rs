//! Shared helpers for queue integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use lease_queue::{
    NackTaskParams, PickTasksParams, Queue, QueueError, StoreError, Task, TaskId, TaskStatus,
    TaskStore,
};

/// Store double that hands out queued tasks and records every call
///
/// Picks ignore the type filter so tests can feed tasks the queue has no
/// handler for.
#[derive(Default)]
pub struct RecordingStore {
    queued: Mutex<VecDeque<Task>>,
    picks: Mutex<Vec<PickTasksParams>>,
    acks: Mutex<Vec<TaskId>>,
    nacks: Mutex<Vec<NackTaskParams>>,
    fail_ack: AtomicBool,
    failing_picks: AtomicUsize,
    oversized_picks: AtomicBool,
}

impl RecordingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_tasks(tasks: impl IntoIterator<Item = Task>) -> Arc<Self> {
        let store = Self::new();
        for task in tasks {
            store.push(task);
        }
        store
    }

    pub fn push(&self, task: Task) {
        self.queued.lock().push_back(task);
    }

    pub fn picks(&self) -> Vec<PickTasksParams> {
        self.picks.lock().clone()
    }

    pub fn pick_count(&self) -> usize {
        self.picks.lock().len()
    }

    pub fn acks(&self) -> Vec<TaskId> {
        self.acks.lock().clone()
    }

    pub fn nacks(&self) -> Vec<NackTaskParams> {
        self.nacks.lock().clone()
    }

    /// Make every ack call fail
    pub fn fail_acks(&self) {
        self.fail_ack.store(true, Ordering::SeqCst);
    }

    /// Hand out every queued task on each pick, whatever `max_count` says
    pub fn ignore_max_count(&self) {
        self.oversized_picks.store(true, Ordering::SeqCst);
    }

    /// Make the next `count` pick calls fail
    pub fn fail_next_picks(&self, count: usize) {
        self.failing_picks.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl TaskStore for RecordingStore {
    async fn pick_tasks(&self, params: PickTasksParams) -> Result<Vec<Task>, StoreError> {
        self.picks.lock().push(params.clone());

        let failing = self
            .failing_picks
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::Database("connection refused".into()));
        }

        let locked_until = Utc::now() + chrono::Duration::from_std(params.lease_duration).unwrap();
        let mut queued = self.queued.lock();
        let count = if self.oversized_picks.load(Ordering::SeqCst) {
            queued.len()
        } else {
            params.max_count.min(queued.len())
        };

        Ok(queued
            .drain(..count)
            .map(|mut task| {
                task.status = TaskStatus::Locked;
                task.locked_until = Some(locked_until);
                task.locked_by = Some(params.lease_owner.clone());
                task
            })
            .collect())
    }

    async fn ack_tasks(&self, ids: &[TaskId]) -> Result<u64, StoreError> {
        if self.fail_ack.load(Ordering::SeqCst) {
            return Err(StoreError::Database("connection reset".into()));
        }
        self.acks.lock().extend_from_slice(ids);
        Ok(ids.len() as u64)
    }

    async fn nack_task(&self, params: NackTaskParams) -> Result<u64, StoreError> {
        self.nacks.lock().push(params);
        Ok(1)
    }
}

/// Run `queue.start` in the background
pub fn spawn_queue(
    queue: &Arc<Queue>,
) -> (CancellationToken, JoinHandle<Result<(), QueueError>>) {
    let shutdown = CancellationToken::new();
    let handle = {
        let queue = Arc::clone(queue);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { queue.start(shutdown).await })
    };
    (shutdown, handle)
}

/// Cancel the queue and wait for `start` to return
pub async fn stop_queue(shutdown: CancellationToken, handle: JoinHandle<Result<(), QueueError>>) {
    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("queue did not stop in time")
        .expect("queue task panicked")
        .expect("queue returned an error");
}

/// Poll `condition` until it holds, failing the test after five seconds
pub async fn wait_until<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 5s"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Counts concurrently running invocations and remembers the peak
#[derive(Default)]
pub struct ConcurrencyTracker {
    running: AtomicUsize,
    peak: AtomicUsize,
    started: AtomicUsize,
    finished: AtomicUsize,
}

impl ConcurrencyTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Track `fut` as one invocation
    pub async fn track<F: Future>(&self, fut: F) -> F::Output {
        self.started.fetch_add(1, Ordering::SeqCst);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let output = fut.await;

        self.running.fetch_sub(1, Ordering::SeqCst);
        self.finished.fetch_add(1, Ordering::SeqCst);
        output
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

pub fn task(id: TaskId, task_type: &str) -> Task {
    Task::new(id, task_type, serde_json::json!({ "n": id }))
}
