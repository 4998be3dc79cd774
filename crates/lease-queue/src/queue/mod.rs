//! Polling task queue
//!
//! This module provides:
//! - [`Queue`] - Orchestrator owning the poll tick and the worker slots
//! - [`QueueConfig`] - Configuration with defaults and environment loading
//! - [`Disposition`] - How a handler outcome is applied to the store
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                            Queue                              │
//! │                                                               │
//! │  ┌────────────┐  pick(≤ idle)   ┌─────────────────────────┐   │
//! │  │   Poller   │ ──────────────▶ │        TaskStore        │   │
//! │  │ (interval) │                 └─────────────────────────┘   │
//! │  └─────┬──────┘                              ▲                │
//! │        │ reserve slot + push                 │ ack / nack     │
//! │        ▼                                     │                │
//! │  ┌──────────────────────────────┐   ┌────────┴──────────┐     │
//! │  │ hand-off queue (cap = slots) │──▶│  Worker 1..N       │     │
//! │  └──────────────────────────────┘   │  TaskContext       │     │
//! │                                     │  handler + catch   │     │
//! │                                     │  classify          │     │
//! │                                     └────────────────────┘     │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod dispatch;
mod orchestrator;
mod poller;
mod slots;
mod worker;

pub use config::{
    ConfigError, QueueConfig, DEFAULT_LEASE_DURATION, DEFAULT_POLL_INTERVAL, DEFAULT_WORKER_SLOTS,
};
pub use dispatch::Disposition;
pub use orchestrator::{Queue, QueueError, QueueStatus};
pub use slots::{SlotGuard, SlotTracker};
