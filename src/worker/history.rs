//! Rebuilding the chat message list from a conversation log.

use serde_json::Value;

use crate::conversation::{new_id, ConversationEntry, EntryKind, Role};
use crate::providers::{ChatMessage, WireToolCall};

/// Message history plus the system prompt that was resolved for it.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageHistory {
    pub messages: Vec<ChatMessage>,
    pub system_prompt: String,
}

/// Render any JSON value as message text.
fn as_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Encode tool arguments as the JSON string the wire format expects.
fn encode_arguments(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "{}".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn wire_role(role: Role, fallback: &str) -> String {
    match role {
        Role::Unknown => fallback.to_string(),
        other => other.as_str().to_string(),
    }
}

fn completion_message(entry: &ConversationEntry) -> ChatMessage {
    let content = &entry.content;
    let text = content.get("text").map(as_text).unwrap_or_default();

    let tool_calls = content
        .get("tool_calls")
        .and_then(Value::as_array)
        .map(|calls| {
            calls
                .iter()
                .map(|call| {
                    let id = call
                        .get("id")
                        .and_then(Value::as_str)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .unwrap_or_else(new_id);
                    let name = call.get("name").map(as_text).unwrap_or_default();
                    WireToolCall::function(&id, &name, encode_arguments(call.get("arguments")))
                })
                .collect()
        })
        .unwrap_or_default();

    let mut message = ChatMessage::assistant(&text, tool_calls);
    message.role = wire_role(entry.role, "assistant");
    message
}

fn tool_result_message(entry: &ConversationEntry) -> ChatMessage {
    let content = &entry.content;
    let call_id = content
        .get("tool_call_id")
        .map(as_text)
        .unwrap_or_default();
    let name = content
        .get("tool")
        .or_else(|| content.get("name"))
        .map(as_text)
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "unknown".to_string());
    let result = match content.get("result") {
        None | Some(Value::Null) => "{}".to_string(),
        Some(value) => value.to_string(),
    };
    ChatMessage::tool(&call_id, &name, &result)
}

/// Build the message list for the next completion request.
///
/// The last `metadata` entry with a non-empty `system_prompt` wins over
/// `default_system_prompt`; the winner, if non-empty, is prepended. `label`,
/// `tag` and unknown entries are skipped. Every content field in the result
/// is a plain string and every tool-call argument is a JSON string.
pub fn build_message_history(
    entries: &[ConversationEntry],
    default_system_prompt: &str,
) -> MessageHistory {
    let mut system_prompt = default_system_prompt.to_string();
    let mut messages = Vec::new();

    for entry in entries {
        match entry.kind {
            EntryKind::Metadata => {
                if let Some(prompt) = entry
                    .content
                    .get("system_prompt")
                    .and_then(Value::as_str)
                    .filter(|p| !p.is_empty())
                {
                    system_prompt = prompt.to_string();
                }
            }
            EntryKind::Message => messages.push(ChatMessage::with_role(
                &wire_role(entry.role, "user"),
                &as_text(&entry.content),
            )),
            EntryKind::Completion => messages.push(completion_message(entry)),
            EntryKind::ToolResult => messages.push(tool_result_message(entry)),
            EntryKind::Label | EntryKind::Tag | EntryKind::Unknown => {}
        }
    }

    if !system_prompt.is_empty() {
        messages.insert(0, ChatMessage::system(&system_prompt));
    }

    MessageHistory {
        messages,
        system_prompt,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{
        CompletionContent, ConversationMetadata, RecordedToolCall, ToolResultContent,
    };
    use serde_json::json;

    fn metadata(prompt: &str) -> ConversationEntry {
        ConversationEntry::metadata(&ConversationMetadata {
            agent: "General Assistant".into(),
            system_prompt: prompt.into(),
            model: "m".into(),
            temperature: 0.2,
            context_size: 4096,
        })
    }

    #[test]
    fn test_last_metadata_wins() {
        let entries = vec![
            metadata("A"),
            ConversationEntry::user_message("hi"),
            metadata("B"),
            ConversationEntry::user_message("there"),
        ];
        let history = build_message_history(&entries, "default");
        assert_eq!(history.system_prompt, "B");
        assert_eq!(history.messages[0], ChatMessage::system("B"));
        assert_eq!(history.messages.len(), 3);
        assert_eq!(history.messages[2].content, "there");
    }

    #[test]
    fn test_default_prompt_without_metadata() {
        let entries = vec![ConversationEntry::user_message("hi")];
        let history = build_message_history(&entries, "default");
        assert_eq!(history.messages[0].content, "default");

        let history = build_message_history(&entries, "");
        assert_eq!(history.messages.len(), 1);
        assert_eq!(history.messages[0].role, "user");
    }

    #[test]
    fn test_labels_are_skipped() {
        let label = ConversationEntry::new(
            Role::System,
            EntryKind::Label,
            json!({"target": "x", "reward": 1}),
        );
        let history = build_message_history(&[label], "");
        assert!(history.messages.is_empty());
    }

    #[test]
    fn test_completion_and_tool_result_round() {
        let completion = ConversationEntry::completion(&CompletionContent {
            agent: "a".into(),
            model: "m".into(),
            text: "checking".into(),
            tool_calls: vec![RecordedToolCall {
                id: "call_1".into(),
                name: "ping".into(),
                arguments: json!({"x": 1}),
            }],
            ..Default::default()
        });
        let result = ConversationEntry::tool_result(&ToolResultContent {
            tool: "ping".into(),
            tool_call_id: "call_1".into(),
            arguments: json!({"x": 1}),
            result: json!({"status": "ok"}),
        });

        let history = build_message_history(&[completion, result], "");
        let assistant = &history.messages[0];
        assert_eq!(assistant.role, "assistant");
        let calls = assistant.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].function.arguments, "{\"x\":1}");

        let tool = &history.messages[1];
        assert_eq!(tool.role, "tool");
        assert_eq!(tool.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(tool.name.as_deref(), Some("ping"));
        assert_eq!(tool.content, "{\"status\":\"ok\"}");
    }

    #[test]
    fn test_malformed_entries_are_coerced() {
        let completion = ConversationEntry::new(
            Role::Assistant,
            EntryKind::Completion,
            json!({"text": null, "tool_calls": [{"name": "ping"}]}),
        );
        let tool = ConversationEntry::new(Role::Tool, EntryKind::ToolResult, json!({}));
        let message = ConversationEntry::new(Role::User, EntryKind::Message, json!({"k": [1]}));

        let history = build_message_history(&[completion, tool, message], "");
        let calls = history.messages[0].tool_calls.as_ref().unwrap();
        assert_eq!(history.messages[0].content, "");
        assert_eq!(calls[0].function.arguments, "{}");
        assert_eq!(calls[0].id.len(), 32);
        assert_eq!(history.messages[1].name.as_deref(), Some("unknown"));
        assert_eq!(history.messages[1].content, "{}");
        assert_eq!(history.messages[2].content, "{\"k\":[1]}");
    }
}
