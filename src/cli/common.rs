//! Shared CLI helpers used across multiple command handlers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use chatdeck::config::{FileSettings, Settings, WorkerConfig};
use chatdeck::conversation::{IndexStore, JsonlConversationLog};
use chatdeck::providers::LlamaCppFactory;
use chatdeck::tasks::{ServiceConfig, TaskRecord, TaskService, TaskStatus};
use chatdeck::tools::NoopToolHook;
use chatdeck::worker::WorkerDeps;

/// How often the CLI polls the service while waiting on a task.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub(crate) fn completion_timeout(worker: &WorkerConfig) -> Duration {
    let iterations = worker.max_tool_iterations.max(1) as u64;
    Duration::from_secs(
        worker
            .request_timeout_secs
            .saturating_mul(iterations)
            .saturating_add(5),
    )
}

/// Stores and task service wired up from the on-disk settings.
pub(crate) struct Deck {
    pub settings: Settings,
    pub conversations: Arc<JsonlConversationLog>,
    pub index: Arc<IndexStore>,
    pub service: TaskService,
}

impl Deck {
    pub(crate) fn open(settings: Settings) -> Result<Self> {
        let data_dir = settings.data_path();
        let conversations = Arc::new(
            JsonlConversationLog::new(&data_dir)
                .with_context(|| format!("Failed to open conversations in {}", data_dir.display()))?,
        );
        let index = Arc::new(
            IndexStore::open(&data_dir).context("Failed to open conversation index")?,
        );

        let deps = WorkerDeps {
            settings: Arc::new(FileSettings::new(Settings::path())),
            conversations: conversations.clone(),
            index: Arc::clone(&index),
            clients: Arc::new(LlamaCppFactory::new(Duration::from_secs(
                settings.worker.request_timeout_secs,
            ))),
            tool_hook: Some(Arc::new(NoopToolHook)),
        };
        let service = TaskService::new(deps, ServiceConfig::from_worker_config(&settings.worker));

        Ok(Self {
            settings,
            conversations,
            index,
            service,
        })
    }

    /// Upper bound for one completion task: every model call may hit the
    /// request timeout.
    pub(crate) fn completion_timeout(&self) -> Duration {
        completion_timeout(&self.settings.worker)
    }

    /// Wait for a task and turn a failure into an error.
    pub(crate) async fn finish(&self, task_id: &str, timeout: Duration) -> Result<TaskRecord> {
        let record = self
            .service
            .wait_for(task_id, POLL_INTERVAL, timeout)
            .await
            .with_context(|| format!("Task {} did not finish", task_id))?;
        if record.status == TaskStatus::Failed {
            anyhow::bail!(
                "{}",
                record.detail.unwrap_or_else(|| "Task failed".to_string())
            );
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_timeout_scales_with_iterations() {
        let worker = WorkerConfig::default();
        let expected = worker.request_timeout_secs * worker.max_tool_iterations as u64 + 5;
        assert_eq!(completion_timeout(&worker), Duration::from_secs(expected));
    }

    #[test]
    fn test_completion_timeout_saturates() {
        let worker = WorkerConfig {
            request_timeout_secs: u64::MAX,
            max_tool_iterations: 4,
            ..WorkerConfig::default()
        };
        assert_eq!(completion_timeout(&worker), Duration::from_secs(u64::MAX));
    }
}
