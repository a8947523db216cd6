//! Tool registry for ChatDeck
//!
//! Maps tool names to implementations. Executing an unregistered name is an
//! error; there is no silent fallback.

use std::collections::HashMap;
use std::time::Instant;

use serde_json::Value;
use tracing::{error, info};

use crate::error::{DeckError, Result};
use crate::providers::ToolDefinition;

use super::Tool;

/// A registry that holds and executes tools.
///
/// # Example
///
/// ```rust
/// use chatdeck::tools::{PingTool, ToolRegistry};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let mut registry = ToolRegistry::new();
/// registry.register(Box::new(PingTool));
///
/// let result = registry.execute("ping", json!({})).await.unwrap();
/// assert_eq!(result, json!({"status": "ok"}));
/// assert!(registry.execute("missing", json!({})).await.is_err());
/// # });
/// ```
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool, replacing any tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        info!(tool = %name, "Registering tool");
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Schemas for every registered tool, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.names()
            .into_iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| ToolDefinition::new(t.name(), t.description(), t.parameters()))
            .collect()
    }

    /// Execute a tool by name.
    ///
    /// Fails with [`DeckError::Tool`] when the name is not registered.
    pub async fn execute(&self, name: &str, args: Value) -> Result<Value> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| DeckError::Tool(format!("Unknown tool: {}", name)))?;

        let start = Instant::now();
        let result = tool.execute(args).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(_) => info!(tool = %name, elapsed_ms, "Tool executed"),
            Err(e) => error!(tool = %name, elapsed_ms, error = %e, "Tool failed"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{ExtractFieldTool, PingTool};
    use serde_json::json;

    #[test]
    fn test_register_and_names() {
        let mut registry = ToolRegistry::new();
        assert!(registry.is_empty());
        registry.register(Box::new(PingTool));
        registry.register(Box::new(ExtractFieldTool));
        assert_eq!(registry.names(), vec!["extract_field", "ping"]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(PingTool));
        registry.register(Box::new(PingTool));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_definitions() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(ExtractFieldTool));
        let defs = registry.definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "extract_field");
        assert_eq!(defs[0].parameters["required"], json!(["source", "field"]));
    }

    #[tokio::test]
    async fn test_execute_unknown_tool() {
        let registry = ToolRegistry::new();
        let err = registry.execute("nope", json!({})).await.unwrap_err();
        assert!(matches!(err, DeckError::Tool(_)));
        assert_eq!(err.to_string(), "Tool error: Unknown tool: nope");
    }
}
