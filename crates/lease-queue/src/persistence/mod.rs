//! Persistence layer for the task queue
//!
//! This module provides:
//! - [`TaskStore`] trait: atomic pick, acknowledge and negative-acknowledge
//! - [`InMemoryTaskStore`] for testing and single-process embedding
//! - [`PostgresTaskStore`] for production

mod memory;
mod postgres;
mod store;

pub use memory::InMemoryTaskStore;
pub use postgres::PostgresTaskStore;
pub(crate) use store::saturating_add;
pub use store::{
    NackTaskParams, PickTasksParams, StoreError, Task, TaskId, TaskStatus, TaskStore,
};
