//! Worker module - the single consumer of the task queue
//!
//! The worker runs as its own tokio task. Its only links to the rest of the
//! process are the [`TaskQueue`] it pops from and the event channel it
//! reports on. For every task it:
//!
//! 1. emits a `running` event,
//! 2. reloads settings (never cached across tasks),
//! 3. reuses or rebuilds the model client,
//! 4. dispatches on the task payload,
//! 5. reports `completed` or `failed`.
//!
//! A `shutdown` task ends the loop without an event.

pub mod completion;
pub mod history;
pub mod reasoning;
pub mod summary;

pub use completion::{run_completion, CompletionContext, CompletionOutcome};
pub use history::{build_message_history, MessageHistory};
pub use reasoning::{flatten_reasoning, unpack_assistant_message, UnpackedMessage};
pub use summary::{summarize_entries, ConversationSummary};

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::json;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::{Settings, SettingsSource};
use crate::conversation::{ConversationLog, IndexStore};
use crate::error::{DeckError, Result};
use crate::providers::{ModelClient, ModelClientFactory};
use crate::tasks::{QueuedTask, TaskEvent, TaskPayload, TaskQueue, BOOTSTRAP_TASK_ID};
use crate::tools::{register_builtin_tools, ToolHook, ToolRegistry};

/// Text of a panic payload from `panic!` with a literal or formatted message.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Everything the worker needs besides the queue and the event channel.
#[derive(Clone)]
pub struct WorkerDeps {
    pub settings: Arc<dyn SettingsSource>,
    pub conversations: Arc<dyn ConversationLog>,
    pub index: Arc<IndexStore>,
    pub clients: Arc<dyn ModelClientFactory>,
    pub tool_hook: Option<Arc<dyn ToolHook>>,
}

/// Model client built for a particular backend URL and key.
struct CachedClient {
    base_url: String,
    api_key: String,
    client: Arc<dyn ModelClient>,
}

pub struct Worker {
    deps: WorkerDeps,
    queue: Arc<TaskQueue>,
    events: UnboundedSender<TaskEvent>,
    tools: ToolRegistry,
    client: Option<CachedClient>,
}

impl Worker {
    /// Build the tool registry and run the optional hook.
    ///
    /// A failing hook is reported as a `bootstrap` failure; the worker keeps
    /// the built-ins and anything the hook registered before failing.
    pub fn new(deps: WorkerDeps, queue: Arc<TaskQueue>, events: UnboundedSender<TaskEvent>) -> Self {
        let mut tools = ToolRegistry::new();
        register_builtin_tools(&mut tools);

        let mut worker = Self {
            deps,
            queue,
            events,
            tools: ToolRegistry::new(),
            client: None,
        };

        if let Some(hook) = worker.deps.tool_hook.clone() {
            if let Err(e) = hook.register(&mut tools) {
                error!(error = %e, "Tool hook failed during worker bootstrap");
                worker.emit(TaskEvent::failed(BOOTSTRAP_TASK_ID, e.event_message()));
            }
        }

        worker.tools = tools;
        worker
    }

    /// Spawn a worker on the current runtime.
    pub fn spawn(
        deps: WorkerDeps,
        queue: Arc<TaskQueue>,
        events: UnboundedSender<TaskEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move { Worker::new(deps, queue, events).run().await })
    }

    /// Names of the tools available to the model.
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.names()
    }

    /// Consume the queue until a shutdown task arrives.
    pub async fn run(mut self) {
        info!(tools = self.tools.len(), "Worker started");
        loop {
            let entry = self.queue.pop().await;
            if entry.task.payload == TaskPayload::Shutdown {
                info!(task_id = %entry.task.task_id, "Worker received shutdown");
                break;
            }
            self.process(entry.task).await;
        }
        info!("Worker stopped");
    }

    /// Run one task and report its outcome. Errors and panics inside the task
    /// become a `failed` event; the loop keeps going.
    pub async fn process(&mut self, task: QueuedTask) {
        self.emit(TaskEvent::running(&task.task_id));

        let span = info_span!("task", task_id = %task.task_id, kind = %task.kind());
        let outcome = AssertUnwindSafe(self.dispatch(&task).instrument(span.clone()))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(event)) => self.emit(event),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                span.in_scope(|| {
                    error!(
                        conversation = ?task.conversation_id,
                        panic = %message,
                        "Task panicked"
                    )
                });
                self.emit(TaskEvent::failed(&task.task_id, format!("Panic: {message}")));
            }
            Ok(Err(e)) => {
                span.in_scope(|| {
                    error!(
                        conversation = ?task.conversation_id,
                        error = %e,
                        error_kind = e.kind_name(),
                        "Task failed"
                    )
                });
                self.emit(TaskEvent::failed(&task.task_id, e.event_message()));
            }
        }
    }

    async fn dispatch(&mut self, task: &QueuedTask) -> Result<TaskEvent> {
        let settings = self.deps.settings.reload()?;
        let client = self.client_for(&settings)?;

        match &task.payload {
            TaskPayload::Completion(params) => {
                let conversation_id = require_conversation(task)?;
                let ctx = CompletionContext {
                    client: client.as_ref(),
                    tools: &self.tools,
                    conversations: self.deps.conversations.as_ref(),
                    settings: &settings,
                };
                let outcome = run_completion(&ctx, conversation_id, params).await?;
                Ok(TaskEvent::completed(
                    &task.task_id,
                    "Completion finished.",
                    json!({
                        "conversation_id": conversation_id,
                        "message_id": outcome.last_completion_id,
                        "iterations": outcome.iterations,
                        "requires_summary": true,
                    }),
                ))
            }
            TaskPayload::Summarize => {
                let conversation_id = require_conversation(task)?;
                let summary = self.summarize(conversation_id).await?;
                Ok(TaskEvent::completed(
                    &task.task_id,
                    "Summary updated.",
                    json!({
                        "conversation_id": conversation_id,
                        "summary": summary.summary,
                        "title": summary.title,
                    }),
                ))
            }
            TaskPayload::Shutdown => Err(DeckError::UnsupportedTask(task.kind().to_string())),
        }
    }

    async fn summarize(&self, conversation_id: &str) -> Result<ConversationSummary> {
        let entries = self.deps.conversations.load(conversation_id).await?;
        if entries.is_empty() {
            return Err(DeckError::NotFound("Conversation not found".to_string()));
        }
        let summary = summarize_entries(&entries);
        let last_accessed = self.deps.index.last_accessed(conversation_id).await?;
        self.deps
            .index
            .record_summary(conversation_id, &summary.summary, &summary.title, last_accessed)
            .await?;
        debug!(conversation = %conversation_id, title = %summary.title, "Recorded summary");
        Ok(summary)
    }

    /// The cached client, rebuilt when the backend URL or key changed.
    fn client_for(&mut self, settings: &Settings) -> Result<Arc<dyn ModelClient>> {
        let backend = &settings.llama_cpp;
        if let Some(cached) = &self.client {
            if cached.base_url == backend.base_url && cached.api_key == backend.api_key {
                return Ok(Arc::clone(&cached.client));
            }
        }

        let client = self.deps.clients.create(backend)?;
        info!(backend = client.name(), url = %backend.base_url, "Model client ready");
        self.client = Some(CachedClient {
            base_url: backend.base_url.clone(),
            api_key: backend.api_key.clone(),
            client: Arc::clone(&client),
        });
        Ok(client)
    }

    fn emit(&self, event: TaskEvent) {
        if self.events.send(event).is_err() {
            warn!("Event channel closed; dropping task event");
        }
    }
}

fn require_conversation(task: &QueuedTask) -> Result<&str> {
    task.conversation_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| DeckError::NotFound(format!("task {} has no conversation", task.task_id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendSettings, StaticSettings};
    use crate::conversation::{ConversationEntry, MemoryConversationLog};
    use crate::providers::{AssistantMessage, ChatMessage, ChatOptions, FixedClientFactory, ToolDefinition};
    use crate::tasks::{Priority, TaskStatus};
    use crate::tools::{MockToolHook, PingTool};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    struct EchoClient;

    #[async_trait]
    impl ModelClient for EchoClient {
        async fn chat(
            &self,
            messages: Vec<ChatMessage>,
            _tools: Vec<ToolDefinition>,
            _model: &str,
            _options: ChatOptions,
        ) -> Result<AssistantMessage> {
            let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
            Ok(AssistantMessage::text(&format!("echo: {}", last)))
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    /// Counts how many clients it has built.
    struct CountingFactory {
        built: AtomicUsize,
    }

    impl ModelClientFactory for CountingFactory {
        fn create(&self, _backend: &BackendSettings) -> Result<Arc<dyn ModelClient>> {
            self.built.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(EchoClient))
        }
    }

    /// Settings source whose backend URL can be changed between tasks.
    struct MutableSettings(Mutex<Settings>);

    impl SettingsSource for MutableSettings {
        fn reload(&self) -> Result<Settings> {
            Ok(self.0.lock().unwrap().clone())
        }
    }

    fn deps(dir: &std::path::Path, hook: Option<Arc<dyn ToolHook>>) -> WorkerDeps {
        WorkerDeps {
            settings: Arc::new(StaticSettings(Settings::default())),
            conversations: Arc::new(MemoryConversationLog::new()),
            index: Arc::new(IndexStore::open(dir).unwrap()),
            clients: Arc::new(FixedClientFactory(Arc::new(EchoClient))),
            tool_hook: hook,
        }
    }

    fn task(id: &str, conversation_id: Option<&str>, payload: TaskPayload) -> QueuedTask {
        QueuedTask {
            task_id: id.to_string(),
            conversation_id: conversation_id.map(str::to_string),
            payload,
        }
    }

    fn drain(rx: &mut UnboundedReceiver<TaskEvent>) -> Vec<TaskEvent> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    #[test]
    fn test_panic_message_payloads() {
        let literal: Box<dyn Any + Send> = Box::new("boom");
        let formatted: Box<dyn Any + Send> = Box::new(format!("bad {}", 1));
        let other: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(literal.as_ref()), "boom");
        assert_eq!(panic_message(formatted.as_ref()), "bad 1");
        assert_eq!(panic_message(other.as_ref()), "unknown panic payload");
    }

    #[tokio::test]
    async fn test_hook_failure_reports_bootstrap_event() {
        let dir = tempfile::tempdir().unwrap();
        let mut hook = MockToolHook::new();
        hook.expect_register().times(1).returning(|registry| {
            registry.register(Box::new(PingTool));
            Err(DeckError::Tool("plugin import failed".into()))
        });

        let (tx, mut rx) = unbounded_channel();
        let worker = Worker::new(
            deps(dir.path(), Some(Arc::new(hook))),
            Arc::new(TaskQueue::new()),
            tx,
        );

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].task_id, BOOTSTRAP_TASK_ID);
        assert_eq!(events[0].status, TaskStatus::Failed);
        assert!(events[0].message.starts_with("ToolError: "));
        assert!(events[0].message.contains("plugin import failed"));
        assert_eq!(worker.tool_names(), vec!["extract_field", "ping"]);
    }

    #[tokio::test]
    async fn test_no_hook_is_valid() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = unbounded_channel();
        let worker = Worker::new(deps(dir.path(), None), Arc::new(TaskQueue::new()), tx);
        assert!(drain(&mut rx).is_empty());
        assert_eq!(worker.tool_names().len(), 2);
    }

    #[tokio::test]
    async fn test_completion_task_events() {
        let dir = tempfile::tempdir().unwrap();
        let deps = deps(dir.path(), None);
        deps.conversations
            .append("c1", ConversationEntry::user_message("hello"))
            .await
            .unwrap();

        let (tx, mut rx) = unbounded_channel();
        let mut worker = Worker::new(deps.clone(), Arc::new(TaskQueue::new()), tx);
        worker
            .process(task("t1", Some("c1"), TaskPayload::Completion(Default::default())))
            .await;

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].status, TaskStatus::Running);
        assert_eq!(events[1].status, TaskStatus::Completed);
        assert!(events[1].requires_summary());

        let entries = deps.conversations.load("c1").await.unwrap();
        assert_eq!(entries.last().unwrap().text(), Some("echo: hello"));
        assert_eq!(events[1].data["message_id"], entries.last().unwrap().id.as_str());
    }

    #[tokio::test]
    async fn test_summarize_task_records_index() {
        let dir = tempfile::tempdir().unwrap();
        let deps = deps(dir.path(), None);
        deps.conversations
            .append("c1", ConversationEntry::user_message("What is Rust?"))
            .await
            .unwrap();
        deps.index.record_access("c1").await.unwrap();
        let accessed = deps.index.last_accessed("c1").await.unwrap();

        let (tx, mut rx) = unbounded_channel();
        let mut worker = Worker::new(deps.clone(), Arc::new(TaskQueue::new()), tx);
        worker
            .process(task("s1", Some("c1"), TaskPayload::Summarize))
            .await;

        let events = drain(&mut rx);
        assert_eq!(events[1].status, TaskStatus::Completed);
        assert_eq!(events[1].data["summary"], "What is Rust?");

        let latest = deps.index.latest().await.unwrap();
        let record = &latest["c1"];
        assert_eq!(record.summary.as_deref(), Some("What is Rust?"));
        assert_eq!(record.last_accessed, accessed);
    }

    #[tokio::test]
    async fn test_summarize_missing_conversation_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = unbounded_channel();
        let mut worker = Worker::new(deps(dir.path(), None), Arc::new(TaskQueue::new()), tx);
        worker
            .process(task("s1", Some("ghost"), TaskPayload::Summarize))
            .await;

        let events = drain(&mut rx);
        assert_eq!(events[1].status, TaskStatus::Failed);
        assert_eq!(events[1].message, "NotFound: Not found: Conversation not found");
    }

    #[tokio::test]
    async fn test_client_rebuilt_only_when_backend_changes() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Arc::new(MutableSettings(Mutex::new(Settings::default())));
        let factory = Arc::new(CountingFactory {
            built: AtomicUsize::new(0),
        });
        let mut deps = deps(dir.path(), None);
        deps.settings = settings.clone() as Arc<dyn SettingsSource>;
        deps.clients = factory.clone() as Arc<dyn ModelClientFactory>;
        deps.conversations
            .append("c1", ConversationEntry::user_message("hi"))
            .await
            .unwrap();

        let (tx, _rx) = unbounded_channel();
        let mut worker = Worker::new(deps, Arc::new(TaskQueue::new()), tx);
        let completion = || task("t", Some("c1"), TaskPayload::Completion(Default::default()));

        worker.process(completion()).await;
        worker.process(completion()).await;
        assert_eq!(factory.built.load(Ordering::SeqCst), 1);

        settings.0.lock().unwrap().llama_cpp.base_url = "http://127.0.0.1:9999/v1".into();
        worker.process(completion()).await;
        assert_eq!(factory.built.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_run_exits_on_shutdown_without_event() {
        let dir = tempfile::tempdir().unwrap();
        let queue = Arc::new(TaskQueue::new());
        let (tx, mut rx) = unbounded_channel();
        let handle = Worker::spawn(deps(dir.path(), None), Arc::clone(&queue), tx);

        queue.push(Priority::HIGH, task("stop", None, TaskPayload::Shutdown));
        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(drain(&mut rx).is_empty());
    }
}
