//! Task handler abstractions
//!
//! Handlers execute tasks of a single type. They:
//! - Run inside a [`TaskContext`] bounded by shutdown and the lease deadline
//! - Classify their own failures with [`TaskError`]
//! - Are registered by task type in a [`HandlerRegistry`]

mod context;
mod definition;
mod error;
mod registry;

pub use context::TaskContext;
pub use definition::{decode_payload, handler_fn, FnHandler, TaskHandler};
pub use error::{TaskError, TaskResultExt};
pub use registry::HandlerRegistry;
