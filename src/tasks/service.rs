//! Task service - the request side of the task system
//!
//! Owns the queue, the event channel, the worker handle and the table of
//! [`TaskRecord`]s. Submission never fails and never waits on the worker;
//! progress is observed by draining events.
//!
//! Retention, applied after every drain:
//! - failed tasks are dropped as soon as they have been observed,
//! - only the `completed_retained` most recently updated completed tasks stay,
//! - at most `max_tasks` tasks are kept overall.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::WorkerConfig;
use crate::conversation::new_id;
use crate::error::{DeckError, Result};
use crate::worker::{Worker, WorkerDeps};

use super::queue::TaskQueue;
use super::types::{
    CompletionParams, Priority, QueuedTask, TaskEvent, TaskKind, TaskPayload, TaskRecord,
    TaskStatus, BOOTSTRAP_TASK_ID,
};

/// Limits and timeouts for a [`TaskService`].
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// How long `stop()` waits for the worker before aborting it
    pub shutdown_timeout: Duration,
    pub max_tasks: usize,
    pub completed_retained: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::from_worker_config(&WorkerConfig::default())
    }
}

impl ServiceConfig {
    pub fn from_worker_config(config: &WorkerConfig) -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(config.shutdown_timeout_secs),
            max_tasks: config.max_tasks,
            completed_retained: config.completed_retained,
        }
    }
}

struct ServiceState {
    tasks: HashMap<String, TaskRecord>,
    pending_summaries: HashSet<String>,
    worker: Option<JoinHandle<()>>,
    events: UnboundedReceiver<TaskEvent>,
    bootstrap_error: Option<String>,
}

pub struct TaskService {
    deps: WorkerDeps,
    config: ServiceConfig,
    queue: Arc<TaskQueue>,
    events_tx: UnboundedSender<TaskEvent>,
    state: Mutex<ServiceState>,
}

impl TaskService {
    /// Create a service. The worker is not started until `start()` or the
    /// first enqueue.
    pub fn new(deps: WorkerDeps, config: ServiceConfig) -> Self {
        let (events_tx, events) = unbounded_channel();
        Self {
            deps,
            config,
            queue: Arc::new(TaskQueue::new()),
            events_tx,
            state: Mutex::new(ServiceState {
                tasks: HashMap::new(),
                pending_summaries: HashSet::new(),
                worker: None,
                events,
                bootstrap_error: None,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, ServiceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ------------------------------------------------------------------
    // Worker lifecycle
    // ------------------------------------------------------------------

    /// Spawn the worker unless one is already alive. Returns `true` if a
    /// worker was spawned.
    pub fn start(&self) -> bool {
        let mut state = self.state();
        if state.worker.as_ref().is_some_and(|h| !h.is_finished()) {
            return false;
        }
        state.worker = Some(Worker::spawn(
            self.deps.clone(),
            Arc::clone(&self.queue),
            self.events_tx.clone(),
        ));
        crate::log_component!(info, "tasks", "Worker spawned");
        true
    }

    /// Ask the worker to exit, aborting it if it does not within the timeout.
    pub async fn stop(&self) {
        let handle = {
            let mut state = self.state();
            match state.worker.take() {
                Some(handle) if !handle.is_finished() => handle,
                _ => return,
            }
        };

        self.queue.push(
            Priority::HIGH,
            QueuedTask {
                task_id: new_id(),
                conversation_id: None,
                payload: TaskPayload::Shutdown,
            },
        );

        let mut handle = handle;
        match tokio::time::timeout(self.config.shutdown_timeout, &mut handle).await {
            Ok(_) => crate::log_component!(info, "tasks", "Worker stopped"),
            Err(_) => {
                warn!(
                    timeout_secs = self.config.shutdown_timeout.as_secs(),
                    "Worker did not stop in time; aborting"
                );
                handle.abort();
                // Leave no shutdown behind for the next worker.
                self.queue
                    .retain(|task| task.payload != TaskPayload::Shutdown);
            }
        }
    }

    pub fn worker_alive(&self) -> bool {
        self.state()
            .worker
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    // ------------------------------------------------------------------
    // Submission
    // ------------------------------------------------------------------

    fn submit(
        &self,
        priority: Priority,
        conversation_id: &str,
        payload: TaskPayload,
        description: String,
        agent: Option<String>,
    ) -> String {
        let task_id = new_id();
        let now = Utc::now();
        let kind = payload.kind();

        self.state().tasks.insert(
            task_id.clone(),
            TaskRecord {
                id: task_id.clone(),
                kind,
                conversation_id: Some(conversation_id.to_string()),
                priority,
                status: TaskStatus::Queued,
                created_at: now,
                updated_at: now,
                started_at: None,
                description,
                detail: None,
                agent,
            },
        );

        self.queue.push(
            priority,
            QueuedTask {
                task_id: task_id.clone(),
                conversation_id: Some(conversation_id.to_string()),
                payload,
            },
        );
        debug!(task_id = %task_id, kind = %kind, priority = priority.0, "Task enqueued");

        self.start();
        task_id
    }

    /// Queue a reply for `conversation_id` at normal priority.
    pub fn enqueue_completion(&self, conversation_id: &str, params: CompletionParams) -> String {
        let description = describe_completion(&params);
        let agent = params.agent.clone();
        self.submit(
            Priority::NORMAL,
            conversation_id,
            TaskPayload::Completion(params),
            description,
            agent,
        )
    }

    /// Queue a summary refresh and clear the conversation's pending marker.
    pub fn enqueue_summary(&self, conversation_id: &str, priority: Priority) -> String {
        self.state().pending_summaries.remove(conversation_id);
        self.submit(
            priority,
            conversation_id,
            TaskPayload::Summarize,
            "Refresh summary".to_string(),
            None,
        )
    }

    pub fn mark_summary_needed(&self, conversation_id: &str) {
        self.state()
            .pending_summaries
            .insert(conversation_id.to_string());
    }

    /// Conversations whose summary is stale, sorted.
    pub fn pending_summary_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state().pending_summaries.iter().cloned().collect();
        ids.sort();
        ids
    }

    /// Enqueue a low priority summary for every pending conversation.
    pub fn flush_pending_summaries(&self) -> Vec<String> {
        self.pending_summary_ids()
            .iter()
            .map(|id| self.enqueue_summary(id, Priority::LOW))
            .collect()
    }

    /// Mark every conversation without a stored summary and flush all
    /// pending summaries. Conversations that already have a summary task
    /// queued or running are left alone. Returns the new task ids.
    pub async fn schedule_missing_summaries(&self) -> Result<Vec<String>> {
        let index = self.deps.index.latest().await?;
        let ids = self.deps.conversations.list().await?;

        let in_flight: HashSet<String> = {
            let state = self.state();
            state
                .tasks
                .values()
                .filter(|r| r.kind == TaskKind::Summarize && !r.status.is_terminal())
                .filter_map(|r| r.conversation_id.clone())
                .collect()
        };

        for id in ids {
            let has_summary = index
                .get(&id)
                .and_then(|r| r.summary.as_deref())
                .is_some_and(|s| !s.is_empty());
            if !has_summary {
                self.mark_summary_needed(&id);
            }
        }

        let scheduled: Vec<String> = self
            .pending_summary_ids()
            .iter()
            .filter(|id| !in_flight.contains(*id))
            .map(|id| self.enqueue_summary(id, Priority::LOW))
            .collect();
        debug!(count = scheduled.len(), "Scheduled missing summaries");
        Ok(scheduled)
    }

    // ------------------------------------------------------------------
    // Observation
    // ------------------------------------------------------------------

    /// Apply every available event and prune. Returns the records the events
    /// changed, as they were right after each change.
    pub fn drain_events(&self) -> Vec<TaskRecord> {
        let mut state = self.state();
        let mut changed = Vec::new();
        while let Ok(event) = state.events.try_recv() {
            if let Some(record) = apply_event(&mut state, event) {
                changed.push(record);
            }
        }
        prune_tasks(&mut state.tasks, self.config.completed_retained, self.config.max_tasks);
        changed
    }

    /// Apply retention with an explicit overall limit.
    pub fn prune(&self, max_items: usize) {
        let mut state = self.state();
        prune_tasks(&mut state.tasks, self.config.completed_retained, max_items);
    }

    /// All tasks, active ones first by priority, completed ones last.
    pub fn snapshot(&self) -> Vec<TaskRecord> {
        let mut state = self.state();
        prune_tasks(&mut state.tasks, self.config.completed_retained, self.config.max_tasks);
        let mut tasks: Vec<TaskRecord> = state.tasks.values().cloned().collect();
        tasks.sort_by(|a, b| {
            (a.status == TaskStatus::Completed, a.priority, a.updated_at)
                .cmp(&(b.status == TaskStatus::Completed, b.priority, b.updated_at))
        });
        tasks
    }

    pub fn get(&self, task_id: &str) -> Option<TaskRecord> {
        self.state().tasks.get(task_id).cloned()
    }

    /// Message of the last `bootstrap` failure, if any.
    pub fn bootstrap_error(&self) -> Option<String> {
        self.state().bootstrap_error.clone()
    }

    /// Poll until `task_id` reaches a terminal status.
    ///
    /// Failed tasks are pruned by the drain that reports them, so the drained
    /// records are checked before the table.
    pub async fn wait_for(
        &self,
        task_id: &str,
        poll: Duration,
        timeout: Duration,
    ) -> Result<TaskRecord> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let alive = self.worker_alive();
            let changed = self.drain_events();
            if let Some(record) = changed
                .into_iter()
                .rev()
                .find(|r| r.id == task_id && r.status.is_terminal())
            {
                return Ok(record);
            }

            match self.get(task_id) {
                Some(record) if record.status.is_terminal() => return Ok(record),
                Some(_) => {}
                None => return Err(DeckError::NotFound(format!("task {}", task_id))),
            }

            if !alive {
                return Err(DeckError::QueueClosed);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(DeckError::Timeout(format!(
                    "task {} still running after {:?}",
                    task_id, timeout
                )));
            }
            tokio::time::sleep(poll).await;
        }
    }
}

impl Drop for TaskService {
    fn drop(&mut self) {
        if let Some(handle) = self.state().worker.take() {
            handle.abort();
        }
    }
}

fn describe_completion(params: &CompletionParams) -> String {
    let agent = params.agent.as_deref().unwrap_or("default agent");
    match params.model.as_deref().filter(|m| !m.is_empty()) {
        Some(model) => format!("Generate reply ({} · {})", agent, model),
        None => format!("Generate reply ({})", agent),
    }
}

fn apply_event(state: &mut ServiceState, event: TaskEvent) -> Option<TaskRecord> {
    let Some(record) = state.tasks.get_mut(&event.task_id) else {
        if event.task_id == BOOTSTRAP_TASK_ID {
            warn!(message = %event.message, "Worker bootstrap reported a failure");
            state.bootstrap_error = Some(event.message);
        } else {
            debug!(task_id = %event.task_id, "Event for unknown task");
        }
        return None;
    };

    if !record.status.can_transition_to(event.status) {
        debug!(
            task_id = %event.task_id,
            from = %record.status,
            to = %event.status,
            "Ignoring out-of-order event"
        );
        return None;
    }

    record.status = event.status;
    record.updated_at = event.timestamp;
    record.detail = Some(event.message.clone());
    if event.status == TaskStatus::Running && record.started_at.is_none() {
        record.started_at = Some(event.timestamp);
    }
    if event.status == TaskStatus::Failed {
        info!(task_id = %record.id, kind = %record.kind, message = %event.message, "Task failed");
    }

    let record = record.clone();
    if event.requires_summary() {
        let conversation = record.conversation_id.clone().or_else(|| {
            event
                .data
                .get("conversation_id")
                .and_then(|v| v.as_str())
                .map(str::to_string)
        });
        if let Some(conversation) = conversation {
            state.pending_summaries.insert(conversation);
        }
    }
    Some(record)
}

/// Newest first, ties broken by id so pruning is deterministic.
fn newest_first(a: &TaskRecord, b: &TaskRecord) -> std::cmp::Ordering {
    b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id))
}

fn prune_tasks(tasks: &mut HashMap<String, TaskRecord>, completed_retained: usize, max: usize) {
    tasks.retain(|_, r| r.status != TaskStatus::Failed);

    let mut completed: Vec<&TaskRecord> = tasks
        .values()
        .filter(|r| r.status == TaskStatus::Completed)
        .collect();
    completed.sort_by(|a, b| newest_first(a, b));
    let expired: Vec<String> = completed
        .iter()
        .skip(completed_retained)
        .map(|r| r.id.clone())
        .collect();
    for id in expired {
        tasks.remove(&id);
    }

    if tasks.len() > max {
        let mut all: Vec<&TaskRecord> = tasks.values().collect();
        all.sort_by(|a, b| newest_first(a, b));
        let overflow: Vec<String> = all.iter().skip(max).map(|r| r.id.clone()).collect();
        for id in overflow {
            tasks.remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use serde_json::json;

    fn record(id: &str, status: TaskStatus, age_secs: i64) -> TaskRecord {
        let at = Utc::now() - ChronoDuration::seconds(age_secs);
        TaskRecord {
            id: id.to_string(),
            kind: TaskKind::Completion,
            conversation_id: Some("c".into()),
            priority: Priority::NORMAL,
            status,
            created_at: at,
            updated_at: at,
            started_at: None,
            description: String::new(),
            detail: None,
            agent: None,
        }
    }

    fn table(records: Vec<TaskRecord>) -> HashMap<String, TaskRecord> {
        records.into_iter().map(|r| (r.id.clone(), r)).collect()
    }

    #[test]
    fn test_prune_keeps_two_newest_completed_and_drops_failed() {
        let mut tasks = table(vec![
            record("old", TaskStatus::Completed, 30),
            record("mid", TaskStatus::Completed, 20),
            record("new", TaskStatus::Completed, 10),
            record("bad", TaskStatus::Failed, 1),
            record("busy", TaskStatus::Running, 50),
        ]);
        prune_tasks(&mut tasks, 2, 20);
        let mut ids: Vec<&str> = tasks.keys().map(String::as_str).collect();
        ids.sort();
        assert_eq!(ids, vec!["busy", "mid", "new"]);
    }

    #[test]
    fn test_prune_overall_limit_keeps_most_recent() {
        let mut tasks = table(
            (0..5)
                .map(|i| record(&format!("q{}", i), TaskStatus::Queued, i))
                .collect(),
        );
        prune_tasks(&mut tasks, 2, 3);
        let mut ids: Vec<&str> = tasks.keys().map(String::as_str).collect();
        ids.sort();
        assert_eq!(ids, vec!["q0", "q1", "q2"]);
    }

    #[test]
    fn test_apply_event_forward_only_and_summary_marker() {
        let (_tx, events) = unbounded_channel();
        let mut state = ServiceState {
            tasks: table(vec![record("t", TaskStatus::Queued, 5)]),
            pending_summaries: HashSet::new(),
            worker: None,
            events,
            bootstrap_error: None,
        };

        let running = apply_event(&mut state, TaskEvent::running("t")).unwrap();
        assert_eq!(running.status, TaskStatus::Running);
        assert!(running.started_at.is_some());

        let done = apply_event(
            &mut state,
            TaskEvent::completed("t", "ok", json!({"requires_summary": true})),
        )
        .unwrap();
        assert_eq!(done.detail.as_deref(), Some("ok"));
        assert!(state.pending_summaries.contains("c"));

        // A late running event cannot resurrect the task.
        assert!(apply_event(&mut state, TaskEvent::running("t")).is_none());
        assert_eq!(state.tasks["t"].status, TaskStatus::Completed);

        assert!(apply_event(&mut state, TaskEvent::failed("ghost", "x")).is_none());
        assert!(apply_event(&mut state, TaskEvent::failed(BOOTSTRAP_TASK_ID, "boom")).is_none());
        assert_eq!(state.bootstrap_error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_describe_completion() {
        let params = CompletionParams {
            agent: Some("Researcher".into()),
            model: Some("qwen".into()),
            ..Default::default()
        };
        assert_eq!(describe_completion(&params), "Generate reply (Researcher · qwen)");
        assert_eq!(
            describe_completion(&CompletionParams::default()),
            "Generate reply (default agent)"
        );
    }
}
