//! Built-in tools registered in every worker.

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::error::{DeckError, Result};

use super::{Tool, ToolRegistry};

/// Health check tool; always answers `{"status": "ok"}`.
pub struct PingTool;

#[async_trait]
impl Tool for PingTool {
    fn name(&self) -> &str {
        "ping"
    }

    fn description(&self) -> &str {
        "Check that tool calling works. Returns {\"status\": \"ok\"}."
    }

    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _args: Value) -> Result<Value> {
        Ok(json!({"status": "ok"}))
    }
}

/// Pulls `Field: value` lines out of free text.
///
/// Matches the first line that starts with the field name (case-insensitive)
/// and returns the trimmed text after the first `:`. No match yields `null`.
pub struct ExtractFieldTool;

impl ExtractFieldTool {
    fn extract(source: &str, field: &str) -> Option<String> {
        let needle = field.to_lowercase();
        source
            .lines()
            .map(str::trim)
            .find(|line| line.to_lowercase().starts_with(&needle))
            .map(|line| {
                line.split_once(':')
                    .map(|(_, value)| value.trim().to_string())
                    .unwrap_or_default()
            })
    }
}

#[async_trait]
impl Tool for ExtractFieldTool {
    fn name(&self) -> &str {
        "extract_field"
    }

    fn description(&self) -> &str {
        "Extract the value of a `Field: value` line from a block of text."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "source": {
                    "type": "string",
                    "description": "Text to search"
                },
                "field": {
                    "type": "string",
                    "description": "Field name at the start of the line"
                }
            },
            "required": ["source", "field"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        let source = args
            .get("source")
            .and_then(Value::as_str)
            .ok_or_else(|| DeckError::Tool("extract_field: 'source' must be a string".into()))?;
        let field = args
            .get("field")
            .and_then(Value::as_str)
            .filter(|f| !f.is_empty())
            .ok_or_else(|| DeckError::Tool("extract_field: 'field' is required".into()))?;

        let value = Self::extract(source, field).map_or(Value::Null, Value::String);
        let mut out = Map::new();
        out.insert(field.to_string(), value);
        Ok(Value::Object(out))
    }
}

/// Register the tools every worker starts with.
pub fn register_builtin_tools(registry: &mut ToolRegistry) {
    registry.register(Box::new(PingTool));
    registry.register(Box::new(ExtractFieldTool));
}
