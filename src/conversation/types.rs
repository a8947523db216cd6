//! Conversation entry types
//!
//! A conversation is an append-only sequence of [`ConversationEntry`] values.
//! The `content` payload is kept as raw JSON so entries written by older or
//! newer versions still load; the typed structs below describe what this
//! crate writes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Generate a compact identifier (32 hex chars, no dashes).
pub fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// The role of the participant that produced an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
    #[serde(other)]
    Unknown,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
            Role::Unknown => "unknown",
        }
    }
}

/// The `type` field of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Message,
    Metadata,
    Completion,
    ToolResult,
    Label,
    Tag,
    #[serde(other)]
    Unknown,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Message => "message",
            EntryKind::Metadata => "metadata",
            EntryKind::Completion => "completion",
            EntryKind::ToolResult => "tool_result",
            EntryKind::Label => "label",
            EntryKind::Tag => "tag",
            EntryKind::Unknown => "unknown",
        }
    }
}

/// One record in a conversation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub role: Role,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    #[serde(default)]
    pub content: Value,
    /// Position assigned by the log on append
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
}

impl ConversationEntry {
    pub fn new(role: Role, kind: EntryKind, content: Value) -> Self {
        Self {
            id: new_id(),
            timestamp: Utc::now(),
            role,
            kind,
            content,
            seq: None,
        }
    }

    /// A plain user message.
    pub fn user_message(text: &str) -> Self {
        Self::new(Role::User, EntryKind::Message, Value::String(text.to_string()))
    }

    pub fn metadata(metadata: &ConversationMetadata) -> Self {
        Self::new(
            Role::System,
            EntryKind::Metadata,
            serde_json::to_value(metadata).unwrap_or(Value::Null),
        )
    }

    pub fn completion(content: &CompletionContent) -> Self {
        Self::new(
            Role::Assistant,
            EntryKind::Completion,
            serde_json::to_value(content).unwrap_or(Value::Null),
        )
    }

    pub fn tool_result(content: &ToolResultContent) -> Self {
        Self::new(
            Role::Tool,
            EntryKind::ToolResult,
            serde_json::to_value(content).unwrap_or(Value::Null),
        )
    }

    pub fn label(content: &LabelContent) -> Self {
        Self::new(
            Role::System,
            EntryKind::Label,
            serde_json::to_value(content).unwrap_or(Value::Null),
        )
    }

    /// Content of a metadata entry, if it has the expected shape.
    pub fn as_metadata(&self) -> Option<ConversationMetadata> {
        if self.kind != EntryKind::Metadata {
            return None;
        }
        serde_json::from_value(self.content.clone()).ok()
    }

    /// Ordering key: explicit sequence first, then timestamp, then id.
    pub fn sort_key(&self) -> (u64, DateTime<Utc>, &str) {
        (self.seq.unwrap_or(u64::MAX), self.timestamp, self.id.as_str())
    }

    /// Visible text of a message or completion entry.
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            Value::String(s) => Some(s.as_str()),
            Value::Object(map) => map.get("text").and_then(Value::as_str),
            _ => None,
        }
    }
}

/// Sort entries into log order in place.
pub fn sort_entries(entries: &mut [ConversationEntry]) {
    entries.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
}

/// Content of a `metadata` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMetadata {
    pub agent: String,
    pub system_prompt: String,
    pub model: String,
    pub temperature: f32,
    pub context_size: u32,
}

/// A tool call as recorded in a completion entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedToolCall {
    pub id: String,
    pub name: String,
    /// Parsed arguments; unparseable JSON is kept under `_raw`
    pub arguments: Value,
}

/// Content of a `completion` entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionContent {
    pub agent: String,
    pub model: String,
    pub text: String,
    #[serde(default)]
    pub reasoning: Vec<String>,
    #[serde(default)]
    pub reasoning_content: Vec<String>,
    #[serde(default)]
    pub tool_calls: Vec<RecordedToolCall>,
}

/// Content of a `tool_result` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultContent {
    /// Name of the tool that ran
    pub tool: String,
    pub tool_call_id: String,
    pub arguments: Value,
    pub result: Value,
}

/// Lowest and highest reward a label may carry.
pub const REWARD_RANGE: std::ops::RangeInclusive<i8> = -2..=2;

/// Content of a `label` entry: a reward attached to an earlier entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelContent {
    /// Id of the labelled entry
    pub target: String,
    /// Kind of the labelled entry (`completion`, `tool_result`, ...)
    pub target_type: String,
    pub reward: i8,
}
