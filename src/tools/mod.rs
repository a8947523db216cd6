//! Tools module - callable functions exposed to the model
//!
//! - [`Tool`]: the trait every tool implements
//! - [`ToolRegistry`]: name to tool mapping used by the worker
//! - built-ins: [`PingTool`], [`ExtractFieldTool`]
//! - [`ToolHook`]: optional startup hook for deployment-specific tools

pub mod builtin;
pub mod hook;
pub mod registry;
pub mod types;

pub use builtin::{register_builtin_tools, ExtractFieldTool, PingTool};
pub use hook::{NoopToolHook, ToolHook};
pub use registry::ToolRegistry;
pub use types::Tool;

#[cfg(test)]
pub use hook::MockToolHook;
