//! Optional tool-registration hook.
//!
//! A deployment can plug in extra tools by handing the worker a
//! [`ToolHook`]. Having no hook is a valid configuration. A hook that fails
//! is reported once as a `bootstrap` failure; tools it registered before
//! failing stay registered.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::Result;

use super::{Tool, ToolRegistry};

/// Registers additional tools at worker startup.
#[cfg_attr(test, mockall::automock)]
pub trait ToolHook: Send + Sync {
    fn register(&self, registry: &mut ToolRegistry) -> Result<()>;
}

/// Placeholder hook that registers a single `noop` tool.
pub struct NoopToolHook;

impl ToolHook for NoopToolHook {
    fn register(&self, registry: &mut ToolRegistry) -> Result<()> {
        registry.register(Box::new(NoopTool));
        Ok(())
    }
}

struct NoopTool;

#[async_trait]
impl Tool for NoopTool {
    fn name(&self) -> &str {
        "noop"
    }

    fn description(&self) -> &str {
        "Placeholder for deployment-specific tools."
    }

    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _args: Value) -> Result<Value> {
        Ok(json!({"message": "No custom tools registered yet."}))
    }
}
