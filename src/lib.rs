//! ChatDeck - core of a local chat dashboard
//!
//! Conversations are append-only JSONL logs. Replies and summaries are
//! produced by a single background worker fed through a priority queue;
//! the [`TaskService`] submits work and observes progress by draining
//! worker events. An [`IdleMonitor`] reports activity edges so callers can
//! schedule maintenance such as summary refreshes.

pub mod config;
pub mod conversation;
pub mod error;
pub mod idle;
pub mod providers;
pub mod tasks;
pub mod tools;
pub mod utils;
pub mod worker;

pub use config::{Settings, SettingsSource};
pub use conversation::{ConversationEntry, ConversationLog, IndexStore, JsonlConversationLog};
pub use error::{DeckError, Result};
pub use idle::{IdleMonitor, IdleTransition};
pub use providers::{LlamaCppClient, ModelClient, ModelClientFactory};
pub use tasks::{CompletionParams, Priority, TaskEvent, TaskRecord, TaskService, TaskStatus};
pub use tools::{Tool, ToolHook, ToolRegistry};
pub use worker::{Worker, WorkerDeps};
