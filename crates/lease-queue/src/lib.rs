//! # Lease Queue
//!
//! An embedded polling task queue that leases persisted tasks to a bounded
//! pool of workers and dispatches them to handlers by task type.
//!
//! ## Features
//!
//! - **Lease-based picking**: the store atomically leases tasks to a named owner; expired leases are reclaimed
//! - **Bounded admission**: never picks more tasks than there are idle worker slots
//! - **Failure classification**: handlers return retryable or unretryable errors; retries back off linearly
//! - **Lease-aware cancellation**: every handler runs in a scope that ends at shutdown or lease expiry
//! - **Panic recovery**: a panicking handler fails its task without taking down the worker
//! - **Graceful shutdown**: `start` returns only after in-flight tasks finish
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                           Queue                              │
//! │  (poll tick, slot accounting, drain on shutdown)            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        TaskStore                             │
//! │  (PostgreSQL or in-memory: pick, ack, nack)                 │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     HandlerRegistry                          │
//! │  (task type → TaskHandler, run under a TaskContext)         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use lease_queue::prelude::*;
//!
//! struct SendEmail;
//!
//! #[async_trait]
//! impl TaskHandler for SendEmail {
//!     async fn handle_task(&self, ctx: &TaskContext, task: &Task) -> Result<(), TaskError> {
//!         let email: Email = decode_payload(task)?;
//!         ctx.run(deliver(email)).await?.retryable()
//!     }
//! }
//!
//! let handlers = HandlerRegistry::new().with_handler("SEND_EMAIL", SendEmail);
//! let store = Arc::new(PostgresTaskStore::new(pool));
//! let queue = Queue::new(store, QueueConfig::from_env()?, handlers)?;
//!
//! queue.start(shutdown_token).await?;
//! ```

pub mod handler;
pub mod persistence;
pub mod queue;
pub mod reliability;

/// Prelude for common imports
pub mod prelude {
    pub use async_trait::async_trait;
    pub use tokio_util::sync::CancellationToken;

    pub use crate::handler::{
        decode_payload, handler_fn, HandlerRegistry, TaskContext, TaskError, TaskHandler,
        TaskResultExt,
    };
    pub use crate::persistence::{
        InMemoryTaskStore, PostgresTaskStore, StoreError, Task, TaskId, TaskStatus, TaskStore,
    };
    pub use crate::queue::{Queue, QueueConfig, QueueError, QueueStatus};
    pub use crate::reliability::RetryPolicy;
}

// Re-export key types at crate root
pub use handler::{
    decode_payload, handler_fn, HandlerRegistry, TaskContext, TaskError, TaskHandler,
    TaskResultExt,
};
pub use persistence::{
    InMemoryTaskStore, NackTaskParams, PickTasksParams, PostgresTaskStore, StoreError, Task,
    TaskId, TaskStatus, TaskStore,
};
pub use queue::{ConfigError, Disposition, Queue, QueueConfig, QueueError, QueueStatus};
pub use reliability::RetryPolicy;
