//! Queue orchestrator
//!
//! Owns the worker slots and the poll tick, and drives the lifecycle from
//! construction to a fully drained stop.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use super::config::{ConfigError, QueueConfig};
use super::dispatch::Dispatcher;
use super::poller::Poller;
use super::slots::SlotTracker;
use super::worker::{run_worker, JobReceiver};
use crate::handler::HandlerRegistry;
use crate::persistence::TaskStore;

/// Queue lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStatus {
    /// Constructed, not yet started
    Constructed,
    /// Polling and dispatching
    Running,
    /// Shutdown requested, waiting for in-flight tasks
    Draining,
    /// All workers have exited
    Stopped,
}

/// Queue errors
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The handler registry is empty
    #[error("queue requires at least one task handler")]
    NoHandlers,

    /// Configuration rejected
    #[error("invalid queue configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// `start` called while the queue is running or draining
    #[error("queue is already running")]
    AlreadyRunning,
}

/// Polling task queue
///
/// # Example
///
/// ```ignore
/// use lease_queue::prelude::*;
///
/// let mut handlers = HandlerRegistry::new();
/// handlers.register("SEND_EMAIL", SendEmailHandler::new(mailer));
///
/// let config = QueueConfig::from_env()?.with_worker_slots(4);
/// let queue = Queue::new(Arc::new(PostgresTaskStore::new(pool)), config, handlers)?;
///
/// // Runs until `shutdown` is cancelled, then waits for in-flight tasks
/// queue.start(shutdown).await?;
/// ```
pub struct Queue {
    store: Arc<dyn TaskStore>,
    config: QueueConfig,
    supported_types: Vec<String>,
    dispatcher: Arc<Dispatcher>,
    slots: Arc<SlotTracker>,
    status: RwLock<QueueStatus>,
}

impl Queue {
    /// Create a queue over `store`
    ///
    /// Unset configuration values are replaced by their defaults.
    pub fn new(
        store: Arc<dyn TaskStore>,
        config: QueueConfig,
        handlers: HandlerRegistry,
    ) -> Result<Self, QueueError> {
        if handlers.is_empty() {
            return Err(QueueError::NoHandlers);
        }
        let config = config.resolve()?;
        let supported_types = handlers.supported_types();

        info!(
            queue = %config.queue_name,
            worker_slots = config.worker_slots,
            poll_interval_ms = config.poll_interval.as_millis() as u64,
            lease_duration_ms = config.lease_duration.as_millis() as u64,
            task_types = ?supported_types,
            "queue created"
        );

        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&store),
            handlers,
            config.queue_name.clone(),
            config.lease_duration,
            config.retry_policy.clone(),
            config.retry_panics,
        ));

        Ok(Self {
            store,
            slots: Arc::new(SlotTracker::new(config.worker_slots)),
            config,
            supported_types,
            dispatcher,
            status: RwLock::new(QueueStatus::Constructed),
        })
    }

    /// Run the queue until `shutdown` is cancelled
    ///
    /// Returns once polling has stopped and every worker has finished its
    /// in-flight task. Task failures are handled internally and never
    /// surface here. A stopped queue may be started again.
    #[instrument(skip(self, shutdown), fields(queue = %self.config.queue_name))]
    pub async fn start(&self, shutdown: CancellationToken) -> Result<(), QueueError> {
        {
            let mut status = self.status.write();
            if matches!(*status, QueueStatus::Running | QueueStatus::Draining) {
                return Err(QueueError::AlreadyRunning);
            }
            *status = QueueStatus::Running;
        }

        info!(worker_slots = self.config.worker_slots, "starting queue");

        let (tx, rx) = mpsc::channel(self.config.worker_slots);
        let jobs: JobReceiver = Arc::new(Mutex::new(rx));

        let mut workers = JoinSet::new();
        for worker in 0..self.config.worker_slots {
            workers.spawn(run_worker(
                worker,
                Arc::clone(&jobs),
                Arc::clone(&self.dispatcher),
                shutdown.clone(),
            ));
        }

        let poller = Poller::new(
            Arc::clone(&self.store),
            self.config.queue_name.clone(),
            self.supported_types.clone(),
            self.config.lease_duration,
            Arc::clone(&self.slots),
            tx,
        );

        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    poller.tick().await;
                }
            }
        }

        *self.status.write() = QueueStatus::Draining;
        info!(busy_workers = self.slots.busy(), "shutdown requested, draining workers");

        // Closing the hand-off queue lets idle workers exit
        drop(poller);

        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "worker terminated abnormally");
            }
        }

        *self.status.write() = QueueStatus::Stopped;
        info!("queue stopped");

        Ok(())
    }

    pub fn status(&self) -> QueueStatus {
        *self.status.read()
    }

    /// Slots holding a task, queued or running
    pub fn busy_workers(&self) -> usize {
        self.slots.busy()
    }

    pub fn idle_workers(&self) -> usize {
        self.slots.idle()
    }

    pub fn worker_slots(&self) -> usize {
        self.config.worker_slots
    }

    /// Lease-owner identity of this queue
    pub fn queue_name(&self) -> &str {
        &self.config.queue_name
    }

    /// Task types this queue picks, sorted
    pub fn supported_types(&self) -> &[String] {
        &self.supported_types
    }

    /// Effective configuration, defaults applied
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("queue_name", &self.config.queue_name)
            .field("worker_slots", &self.config.worker_slots)
            .field("supported_types", &self.supported_types)
            .field("status", &self.status())
            .finish()
    }
}
