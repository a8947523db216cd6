//! Model client types for ChatDeck
//!
//! Outbound messages are always plain text (`content` is a `String`, tool
//! call arguments are JSON-encoded strings). Inbound assistant messages are
//! kept loosely typed because backends disagree on the shape of `content`
//! and the reasoning fields.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Definition of a tool that the model may call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The name of the tool (must be unique)
    pub name: String,
    /// Human-readable description of what the tool does
    pub description: String,
    /// JSON Schema describing the tool's parameters
    pub parameters: Value,
}

impl ToolDefinition {
    /// Create a new tool definition.
    ///
    /// # Example
    /// ```
    /// use chatdeck::providers::ToolDefinition;
    /// use serde_json::json;
    ///
    /// let tool = ToolDefinition::new(
    ///     "extract_field",
    ///     "Extract a field value from text",
    ///     json!({"type": "object", "properties": {}}),
    /// );
    /// assert_eq!(tool.name, "extract_field");
    /// ```
    pub fn new(name: &str, description: &str, parameters: Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        }
    }
}

// ============================================================================
// Outbound messages
// ============================================================================

/// Function part of an outbound tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireFunctionCall {
    pub name: String,
    /// Always a JSON-encoded string
    pub arguments: String,
}

/// Tool call attached to an outbound assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: WireFunctionCall,
}

impl WireToolCall {
    pub fn function(id: &str, name: &str, arguments: String) -> Self {
        Self {
            id: id.to_string(),
            call_type: "function".to_string(),
            function: WireFunctionCall {
                name: name.to_string(),
                arguments,
            },
        }
    }
}

/// A message sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    fn plain(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn system(content: &str) -> Self {
        Self::plain("system", content)
    }

    pub fn user(content: &str) -> Self {
        Self::plain("user", content)
    }

    pub fn assistant(content: &str, tool_calls: Vec<WireToolCall>) -> Self {
        Self {
            tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            ..Self::plain("assistant", content)
        }
    }

    pub fn tool(tool_call_id: &str, name: &str, content: &str) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.to_string()),
            name: Some(name.to_string()),
            ..Self::plain("tool", content)
        }
    }

    /// Message with an arbitrary role string (e.g. roles read back from a log).
    pub fn with_role(role: &str, content: &str) -> Self {
        Self::plain(role, content)
    }
}

/// Options for chat completion requests.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    /// Maximum number of tokens to generate
    pub max_tokens: Option<u32>,
    /// Sampling temperature
    pub temperature: Option<f32>,
}

impl ChatOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Example
    /// ```
    /// use chatdeck::providers::ChatOptions;
    ///
    /// let options = ChatOptions::new().with_max_tokens(4096).with_temperature(0.2);
    /// assert_eq!(options.max_tokens, Some(4096));
    /// assert_eq!(options.temperature, Some(0.2));
    /// ```
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

// ============================================================================
// Inbound messages
// ============================================================================

/// Function part of a tool call as the backend returned it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawFunctionCall {
    pub name: Option<String>,
    /// Usually a JSON-encoded string, sometimes an object
    pub arguments: Option<Value>,
}

/// A tool call as the backend returned it; every field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawToolCall {
    pub id: Option<String>,
    pub function: Option<RawFunctionCall>,
}

/// The assistant message of the first choice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantMessage {
    /// String, list of typed blocks, or absent
    pub content: Option<Value>,
    pub reasoning: Option<Value>,
    pub reasoning_content: Option<Value>,
    pub tool_calls: Option<Vec<RawToolCall>>,
}

impl AssistantMessage {
    /// Plain text reply with no tool calls.
    pub fn text(content: &str) -> Self {
        Self {
            content: Some(Value::String(content.to_string())),
            ..Self::default()
        }
    }

    pub fn tool_calls(&self) -> &[RawToolCall] {
        self.tool_calls.as_deref().unwrap_or(&[])
    }
}

/// Client for a chat completion endpoint.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Send the full message history and return the first choice's message.
    async fn chat(
        &self,
        messages: Vec<ChatMessage>,
        tools: Vec<ToolDefinition>,
        model: &str,
        options: ChatOptions,
    ) -> Result<AssistantMessage>;

    /// Short backend label for logs.
    fn name(&self) -> &str;
}
