//! Tool trait for ChatDeck
//!
//! A tool is a named async function from JSON arguments to a JSON result.
//! The model sees the name, description and parameter schema; the worker
//! calls [`Tool::execute`] when the model requests the tool.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// A callable tool.
///
/// # Example
///
/// ```
/// use async_trait::async_trait;
/// use chatdeck::error::Result;
/// use chatdeck::tools::Tool;
/// use serde_json::{json, Value};
///
/// struct Upper;
///
/// #[async_trait]
/// impl Tool for Upper {
///     fn name(&self) -> &str { "upper" }
///     fn description(&self) -> &str { "Uppercase a string" }
///     fn parameters(&self) -> Value {
///         json!({"type": "object", "properties": {"text": {"type": "string"}}})
///     }
///     async fn execute(&self, args: Value) -> Result<Value> {
///         let text = args.get("text").and_then(Value::as_str).unwrap_or("");
///         Ok(json!({"text": text.to_uppercase()}))
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name the model uses to request this tool.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema for the arguments object.
    fn parameters(&self) -> Value;

    /// Run the tool. Errors fail the whole task.
    async fn execute(&self, args: Value) -> Result<Value>;
}
