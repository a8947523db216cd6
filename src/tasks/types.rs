//! Task types for ChatDeck
//!
//! The task kind set is closed, so payloads are an enum rather than a
//! free-form map. Status only moves forward:
//! `queued -> running -> {completed | failed}`.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Task id used for events that do not belong to a submitted task
/// (worker startup problems).
pub const BOOTSTRAP_TASK_ID: &str = "bootstrap";

/// Queue priority; lower values are dequeued first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Priority(pub u8);

impl Priority {
    pub const HIGH: Priority = Priority(0);
    pub const NORMAL: Priority = Priority(5);
    pub const LOW: Priority = Priority(10);

    /// Human label for the three standard bands.
    pub fn label(&self) -> String {
        match *self {
            Priority::HIGH => "high".to_string(),
            Priority::NORMAL => "normal".to_string(),
            Priority::LOW => "low".to_string(),
            Priority(p) => p.to_string(),
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::NORMAL
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Completion,
    Summarize,
    Shutdown,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskKind::Completion => "completion",
            TaskKind::Summarize => "summarize",
            TaskKind::Shutdown => "shutdown",
        };
        write!(f, "{}", s)
    }
}

/// Optional overrides for a completion; `None` defers to the agent profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionParams {
    pub agent: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub context_size: Option<u32>,
}

/// What the worker should do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TaskPayload {
    Completion(CompletionParams),
    Summarize,
    Shutdown,
}

impl TaskPayload {
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskPayload::Completion(_) => TaskKind::Completion,
            TaskPayload::Summarize => TaskKind::Summarize,
            TaskPayload::Shutdown => TaskKind::Shutdown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Forward-only transitions. A task may fail before it is ever marked running.
    pub fn can_transition_to(&self, target: TaskStatus) -> bool {
        matches!(
            (self, target),
            (TaskStatus::Queued, TaskStatus::Running)
                | (TaskStatus::Queued, TaskStatus::Completed)
                | (TaskStatus::Queued, TaskStatus::Failed)
                | (TaskStatus::Running, TaskStatus::Completed)
                | (TaskStatus::Running, TaskStatus::Failed)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// The service's view of one submitted task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    pub kind: TaskKind,
    pub conversation_id: Option<String>,
    pub priority: Priority,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub description: String,
    /// Message from the most recent event
    pub detail: Option<String>,
    pub agent: Option<String>,
}

/// Status report from the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEvent {
    pub task_id: String,
    pub status: TaskStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub data: Value,
}

impl TaskEvent {
    pub fn new(task_id: &str, status: TaskStatus, message: impl Into<String>, data: Value) -> Self {
        Self {
            task_id: task_id.to_string(),
            status,
            message: message.into(),
            timestamp: Utc::now(),
            data,
        }
    }

    pub fn running(task_id: &str) -> Self {
        Self::new(task_id, TaskStatus::Running, "Task started.", json!({}))
    }

    pub fn completed(task_id: &str, message: impl Into<String>, data: Value) -> Self {
        Self::new(task_id, TaskStatus::Completed, message, data)
    }

    pub fn failed(task_id: &str, message: impl Into<String>) -> Self {
        Self::new(task_id, TaskStatus::Failed, message, json!({}))
    }

    /// Whether the event asks for the conversation summary to be refreshed.
    pub fn requires_summary(&self) -> bool {
        self.data
            .get("requires_summary")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// The unit of work carried on the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedTask {
    pub task_id: String,
    pub conversation_id: Option<String>,
    pub payload: TaskPayload,
}

impl QueuedTask {
    pub fn kind(&self) -> TaskKind {
        self.payload.kind()
    }
}

/// A queued task with its ordering key.
///
/// Ordered by `(priority, sequence)` only; the task body does not take part.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub priority: Priority,
    pub sequence: u64,
    pub task: QueuedTask,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.priority, self.sequence).cmp(&(other.priority, other.sequence))
    }
}
