//! Poll tick
//!
//! Each tick asks the store for at most as many tasks as there are idle
//! slots and pushes them into the hand-off queue. Store failures are logged
//! and the tick is skipped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, trace, warn};

use super::slots::SlotTracker;
use super::worker::Job;
use crate::persistence::{PickTasksParams, TaskStore};

/// Feeds the hand-off queue from the store
///
/// The poller owns the only sender, so dropping it closes the queue.
pub(crate) struct Poller {
    store: Arc<dyn TaskStore>,
    queue_name: String,
    supported_types: Vec<String>,
    lease_duration: Duration,
    slots: Arc<SlotTracker>,
    jobs: mpsc::Sender<Job>,
}

impl Poller {
    pub(crate) fn new(
        store: Arc<dyn TaskStore>,
        queue_name: String,
        supported_types: Vec<String>,
        lease_duration: Duration,
        slots: Arc<SlotTracker>,
        jobs: mpsc::Sender<Job>,
    ) -> Self {
        Self {
            store,
            queue_name,
            supported_types,
            lease_duration,
            slots,
            jobs,
        }
    }

    /// Run one poll tick, returning the number of tasks handed to workers
    pub(crate) async fn tick(&self) -> usize {
        let idle = self.slots.idle();
        if idle == 0 {
            trace!(queue = %self.queue_name, "all worker slots busy, skipping poll");
            return 0;
        }

        let params = PickTasksParams {
            supported_types: self.supported_types.clone(),
            max_count: idle,
            lease_duration: self.lease_duration,
            lease_owner: self.queue_name.clone(),
        };

        let tasks = match self.store.pick_tasks(params).await {
            Ok(tasks) => tasks,
            Err(e) => {
                error!(queue = %self.queue_name, error = %e, "failed to pick tasks");
                return 0;
            }
        };

        if tasks.is_empty() {
            trace!(queue = %self.queue_name, "no tasks available");
            return 0;
        }

        let picked = tasks.len();
        let mut dispatched = 0;

        for task in tasks {
            let Some(slot) = self.slots.try_reserve() else {
                warn!(
                    queue = %self.queue_name,
                    task_id = task.id,
                    "store returned more tasks than requested, leaving lease to expire"
                );
                continue;
            };

            match self.jobs.try_send(Job { task, slot }) {
                Ok(()) => dispatched += 1,
                Err(TrySendError::Full(job)) => {
                    error!(queue = %self.queue_name, task_id = job.task.id, "hand-off queue full");
                }
                Err(TrySendError::Closed(job)) => {
                    debug!(queue = %self.queue_name, task_id = job.task.id, "hand-off queue closed");
                }
            }
        }

        debug!(queue = %self.queue_name, picked, dispatched, "dispatched tasks");
        dispatched
    }
}
