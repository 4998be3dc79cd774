//! Worker slot loop

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::dispatch::Dispatcher;
use super::slots::SlotGuard;
use crate::persistence::Task;

/// A picked task travelling with the slot reserved for it
pub(crate) struct Job {
    pub(crate) task: Task,
    pub(crate) slot: SlotGuard,
}

/// Receiving half of the hand-off queue, shared by every worker
pub(crate) type JobReceiver = Arc<Mutex<mpsc::Receiver<Job>>>;

/// Receive and process jobs until the hand-off queue is closed and empty
pub(crate) async fn run_worker(
    worker: usize,
    jobs: JobReceiver,
    dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
) {
    debug!(worker, "worker started");

    loop {
        let next = { jobs.lock().await.recv().await };
        let Some(Job { task, slot }) = next else {
            break;
        };

        if shutdown.is_cancelled() {
            // Never start a handler on an already-cancelled scope
            debug!(worker, task_id = task.id, "shutdown in progress, not dispatching task");
            drop(slot);
            continue;
        }

        trace!(worker, task_id = task.id, "worker received task");
        dispatcher.process(task, &shutdown).await;
        drop(slot);
    }

    debug!(worker, "worker exited");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::handler::HandlerRegistry;
    use crate::persistence::{InMemoryTaskStore, PickTasksParams, TaskStatus, TaskStore};
    use crate::queue::slots::SlotTracker;
    use crate::reliability::RetryPolicy;

    const OWNER: &str = "test-queue";

    #[tokio::test]
    async fn test_task_received_after_shutdown_is_not_dispatched() {
        let store = Arc::new(InMemoryTaskStore::new());
        let id = store.enqueue("TEST", serde_json::json!({}));
        let task = store
            .pick_tasks(PickTasksParams {
                supported_types: vec!["TEST".to_string()],
                max_count: 1,
                lease_duration: Duration::from_secs(30),
                lease_owner: OWNER.to_string(),
            })
            .await
            .unwrap()
            .remove(0);

        let invoked = Arc::new(AtomicBool::new(false));
        let mut handlers = HandlerRegistry::new();
        let flag = Arc::clone(&invoked);
        handlers.register_fn("TEST", move |_ctx, _task| {
            let flag = Arc::clone(&flag);
            async move {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            }
        });

        let dispatcher = Arc::new(Dispatcher::new(
            store.clone(),
            handlers,
            OWNER.to_string(),
            Duration::from_secs(30),
            RetryPolicy::default(),
            false,
        ));

        // Job already waiting in the hand-off queue when shutdown begins
        let slots = Arc::new(SlotTracker::new(1));
        let (tx, rx) = mpsc::channel(1);
        let slot = slots.try_reserve().unwrap();
        assert!(tx.try_send(Job { task, slot }).is_ok());
        drop(tx);
        assert_eq!(slots.busy(), 1);

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        run_worker(0, Arc::new(Mutex::new(rx)), dispatcher, shutdown).await;

        assert!(!invoked.load(Ordering::SeqCst));
        assert_eq!(slots.busy(), 0);

        // Neither acked nor nacked: the lease is left to expire
        let stored = store.get(id).unwrap();
        assert_eq!(stored.status, TaskStatus::Locked);
        assert_eq!(stored.locked_by.as_deref(), Some(OWNER));
        assert_eq!(stored.attempt, 0);
        assert!(stored.last_error.is_none());
    }
}
