//! The completion / tool-call loop.
//!
//! Each iteration rebuilds the history from the log, asks the model for a
//! reply, appends one `completion` entry and, if the model asked for tools,
//! runs them and appends one `tool_result` entry per call. The loop ends on
//! the first reply without tool calls. A reply that still wants tools on the
//! last permitted iteration fails the task before those tools run.

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::Settings;
use crate::conversation::{
    new_id, CompletionContent, ConversationEntry, ConversationLog, RecordedToolCall,
    ToolResultContent,
};
use crate::error::{DeckError, Result};
use crate::providers::{ChatOptions, ModelClient, RawToolCall};
use crate::tasks::CompletionParams;
use crate::tools::ToolRegistry;

use super::history::build_message_history;
use super::reasoning::unpack_assistant_message;

/// Result of a successful completion task.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOutcome {
    /// Id of the last `completion` entry appended
    pub last_completion_id: String,
    /// Number of model calls made
    pub iterations: usize,
}

/// Collaborators the loop needs for one task.
pub struct CompletionContext<'a> {
    pub client: &'a dyn ModelClient,
    pub tools: &'a ToolRegistry,
    pub conversations: &'a dyn ConversationLog,
    pub settings: &'a Settings,
}

/// Decode tool-call arguments. Unparseable strings are kept under `_raw`.
pub fn parse_arguments(raw: Option<&Value>) -> Value {
    match raw {
        None | Some(Value::Null) => json!({}),
        Some(Value::String(s)) if s.trim().is_empty() => json!({}),
        Some(Value::String(s)) => {
            serde_json::from_str(s).unwrap_or_else(|_| json!({ "_raw": s }))
        }
        Some(other) => other.clone(),
    }
}

fn record_tool_calls(calls: &[RawToolCall]) -> Vec<RecordedToolCall> {
    calls
        .iter()
        .map(|call| {
            let function = call.function.clone().unwrap_or_default();
            RecordedToolCall {
                id: call
                    .id
                    .clone()
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(new_id),
                name: function.name.unwrap_or_default(),
                arguments: parse_arguments(function.arguments.as_ref()),
            }
        })
        .collect()
}

/// Run the completion loop for `conversation_id`.
pub async fn run_completion(
    ctx: &CompletionContext<'_>,
    conversation_id: &str,
    params: &CompletionParams,
) -> Result<CompletionOutcome> {
    let mut entries = ctx.conversations.load(conversation_id).await?;
    if entries.is_empty() {
        return Err(DeckError::Conversation("Conversation is empty.".to_string()));
    }

    let max_iterations = ctx.settings.worker.max_tool_iterations.max(1);
    let agent = ctx.settings.resolve_agent(
        params.agent.as_deref(),
        params.model.as_deref(),
        params.temperature,
        params.context_size,
    );
    let definitions = ctx.tools.definitions();

    debug!(
        conversation = %conversation_id,
        agent = %agent.name,
        model = %agent.model,
        "Invoking model"
    );

    for iteration in 1..=max_iterations {
        let history = build_message_history(&entries, &ctx.settings.system_prompt);
        let options = ChatOptions::new()
            .with_temperature(agent.temperature)
            .with_max_tokens(agent.context_size);

        let reply = ctx
            .client
            .chat(history.messages, definitions.clone(), &agent.model, options)
            .await?;

        let unpacked = unpack_assistant_message(&reply);
        let tool_calls = record_tool_calls(reply.tool_calls());

        let completion = ConversationEntry::completion(&CompletionContent {
            agent: agent.name.clone(),
            model: agent.model.clone(),
            text: unpacked.text,
            reasoning: unpacked.reasoning,
            reasoning_content: unpacked.reasoning_content,
            tool_calls: tool_calls.clone(),
        });
        let completion = ctx.conversations.append(conversation_id, completion).await?;
        let last_completion_id = completion.id.clone();
        entries.push(completion);

        if tool_calls.is_empty() {
            info!(conversation = %conversation_id, iterations = iteration, "Completion finished");
            return Ok(CompletionOutcome {
                last_completion_id,
                iterations: iteration,
            });
        }

        if iteration == max_iterations {
            break;
        }

        for call in tool_calls {
            let result = ctx.tools.execute(&call.name, call.arguments.clone()).await?;
            let entry = ConversationEntry::tool_result(&ToolResultContent {
                tool: call.name,
                tool_call_id: call.id,
                arguments: call.arguments,
                result,
            });
            entries.push(ctx.conversations.append(conversation_id, entry).await?);
        }
    }

    Err(DeckError::ToolLoopExceeded {
        max: max_iterations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{ConversationMetadata, EntryKind, MemoryConversationLog};
    use crate::providers::{AssistantMessage, ChatMessage, ToolDefinition};
    use crate::tools::register_builtin_tools;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays scripted replies and records what it was sent.
    struct ScriptedClient {
        replies: Mutex<VecDeque<AssistantMessage>>,
        requests: Mutex<Vec<(Vec<ChatMessage>, String, ChatOptions)>>,
    }

    impl ScriptedClient {
        fn new(replies: Vec<AssistantMessage>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ModelClient for ScriptedClient {
        async fn chat(
            &self,
            messages: Vec<ChatMessage>,
            _tools: Vec<ToolDefinition>,
            model: &str,
            options: ChatOptions,
        ) -> Result<AssistantMessage> {
            self.requests
                .lock()
                .unwrap()
                .push((messages, model.to_string(), options));
            Ok(self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| AssistantMessage::text("done")))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn ping_call(id: Option<&str>, arguments: Value) -> AssistantMessage {
        serde_json::from_value(json!({
            "content": "",
            "tool_calls": [{"id": id, "function": {"name": "ping", "arguments": arguments}}]
        }))
        .unwrap()
    }

    async fn seeded_log() -> (MemoryConversationLog, String) {
        let log = MemoryConversationLog::new();
        let id = log
            .create(ConversationMetadata {
                agent: "Debugger".into(),
                system_prompt: "Be terse.".into(),
                model: "m".into(),
                temperature: 0.2,
                context_size: 4096,
            })
            .await
            .unwrap();
        log.append(&id, ConversationEntry::user_message("status?"))
            .await
            .unwrap();
        (log, id)
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        register_builtin_tools(&mut registry);
        registry
    }

    #[test]
    fn test_parse_arguments() {
        assert_eq!(parse_arguments(None), json!({}));
        assert_eq!(parse_arguments(Some(&json!(""))), json!({}));
        assert_eq!(parse_arguments(Some(&json!("{\"a\":1}"))), json!({"a": 1}));
        assert_eq!(
            parse_arguments(Some(&json!("{broken"))),
            json!({"_raw": "{broken"})
        );
        assert_eq!(parse_arguments(Some(&json!({"b": 2}))), json!({"b": 2}));
    }

    #[tokio::test]
    async fn test_single_reply_without_tools() {
        let (log, id) = seeded_log().await;
        let client = ScriptedClient::new(vec![AssistantMessage::text("<think>hm</think>All good")]);
        let tools = registry();
        let settings = Settings::default();
        let ctx = CompletionContext {
            client: &client,
            tools: &tools,
            conversations: &log,
            settings: &settings,
        };

        let params = CompletionParams {
            agent: Some("Debugger".into()),
            temperature: Some(0.5),
            ..Default::default()
        };
        let outcome = run_completion(&ctx, &id, &params).await.unwrap();
        assert_eq!(outcome.iterations, 1);

        let entries = log.load(&id).await.unwrap();
        let last = entries.last().unwrap();
        assert_eq!(last.kind, EntryKind::Completion);
        assert_eq!(last.id, outcome.last_completion_id);
        assert_eq!(last.content["text"], "All good");
        assert_eq!(last.content["reasoning"], json!(["hm"]));
        assert_eq!(last.content["agent"], "Debugger");

        let requests = client.requests.lock().unwrap();
        let (messages, model, options) = &requests[0];
        assert_eq!(messages[0], ChatMessage::system("Be terse."));
        assert_eq!(model, "ggml-model-q4");
        assert_eq!(options.temperature, Some(0.5));
        assert_eq!(options.max_tokens, Some(4096));
    }

    #[tokio::test]
    async fn test_tool_round_trip_feeds_results_back() {
        let (log, id) = seeded_log().await;
        let client = ScriptedClient::new(vec![
            ping_call(None, json!("{}")),
            AssistantMessage::text("pong received"),
        ]);
        let tools = registry();
        let settings = Settings::default();
        let ctx = CompletionContext {
            client: &client,
            tools: &tools,
            conversations: &log,
            settings: &settings,
        };

        let outcome = run_completion(&ctx, &id, &CompletionParams::default())
            .await
            .unwrap();
        assert_eq!(outcome.iterations, 2);

        let entries = log.load(&id).await.unwrap();
        let kinds: Vec<EntryKind> = entries.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EntryKind::Metadata,
                EntryKind::Message,
                EntryKind::Completion,
                EntryKind::ToolResult,
                EntryKind::Completion
            ]
        );
        let call_id = entries[2].content["tool_calls"][0]["id"].as_str().unwrap();
        assert_eq!(entries[3].content["tool_call_id"], call_id);
        assert_eq!(entries[3].content["result"], json!({"status": "ok"}));

        let requests = client.requests.lock().unwrap();
        let second = &requests[1].0;
        let tool_message = second.last().unwrap();
        assert_eq!(tool_message.role, "tool");
        assert_eq!(tool_message.content, "{\"status\":\"ok\"}");
    }

    #[tokio::test]
    async fn test_tool_loop_bound() {
        let (log, id) = seeded_log().await;
        let client = ScriptedClient::new(
            (0..10).map(|i| ping_call(Some(&format!("c{}", i)), json!({}))).collect(),
        );
        let tools = registry();
        let settings = Settings::default();
        let ctx = CompletionContext {
            client: &client,
            tools: &tools,
            conversations: &log,
            settings: &settings,
        };

        let err = run_completion(&ctx, &id, &CompletionParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DeckError::ToolLoopExceeded { max: 4 }));

        let entries = log.load(&id).await.unwrap();
        let count = |kind| entries.iter().filter(|e| e.kind == kind).count();
        assert_eq!(count(EntryKind::Completion), 4);
        assert_eq!(count(EntryKind::ToolResult), 3);
        assert_eq!(client.requests.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_fourth_reply_without_tools_succeeds() {
        let (log, id) = seeded_log().await;
        let client = ScriptedClient::new(vec![
            ping_call(Some("a"), json!({})),
            ping_call(Some("b"), json!({})),
            ping_call(Some("c"), json!({})),
            AssistantMessage::text("finally"),
        ]);
        let tools = registry();
        let settings = Settings::default();
        let ctx = CompletionContext {
            client: &client,
            tools: &tools,
            conversations: &log,
            settings: &settings,
        };

        let outcome = run_completion(&ctx, &id, &CompletionParams::default())
            .await
            .unwrap();
        assert_eq!(outcome.iterations, 4);
    }

    #[tokio::test]
    async fn test_unknown_tool_fails() {
        let (log, id) = seeded_log().await;
        let reply: AssistantMessage = serde_json::from_value(json!({
            "tool_calls": [{"id": "x", "function": {"name": "rm_rf", "arguments": "{}"}}]
        }))
        .unwrap();
        let client = ScriptedClient::new(vec![reply]);
        let tools = registry();
        let settings = Settings::default();
        let ctx = CompletionContext {
            client: &client,
            tools: &tools,
            conversations: &log,
            settings: &settings,
        };

        let err = run_completion(&ctx, &id, &CompletionParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DeckError::Tool(_)));
    }

    #[tokio::test]
    async fn test_empty_conversation_fails() {
        let log = MemoryConversationLog::new();
        let client = ScriptedClient::new(vec![]);
        let tools = registry();
        let settings = Settings::default();
        let ctx = CompletionContext {
            client: &client,
            tools: &tools,
            conversations: &log,
            settings: &settings,
        };
        let err = run_completion(&ctx, "missing", &CompletionParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DeckError::Conversation(_)));
    }
}
