//! Tasks module - background work submission and tracking
//!
//! - [`TaskQueue`]: priority queue consumed by the worker
//! - [`TaskService`]: submission, event draining and retention
//! - types: [`TaskRecord`], [`TaskEvent`], [`TaskPayload`], [`Priority`]

pub mod queue;
pub mod service;
pub mod types;

pub use queue::TaskQueue;
pub use service::{ServiceConfig, TaskService};
pub use types::{
    CompletionParams, Priority, QueueEntry, QueuedTask, TaskEvent, TaskKind, TaskPayload,
    TaskRecord, TaskStatus, BOOTSTRAP_TASK_ID,
};
