//! Settings type definitions for ChatDeck
//!
//! Every struct is `#[serde(default)]` so partial settings files load cleanly;
//! missing keys fall back to the values in the `Default` impls below.

use serde::{Deserialize, Serialize};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8080/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "ggml-model-q4";
pub const DEFAULT_TEMPERATURE: f32 = 0.2;
pub const DEFAULT_CONTEXT_SIZE: u32 = 4096;

/// Top-level settings, persisted as `settings.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Global system prompt used when a conversation has none
    pub system_prompt: String,
    /// llama.cpp-compatible completion endpoint
    pub llama_cpp: BackendSettings,
    /// Selectable agent personas; the first one is the fallback
    pub agents: Vec<AgentProfile>,
    pub logging: LoggingConfig,
    pub worker: WorkerConfig,
    pub idle: IdleConfig,
    /// Where conversations and the index live (defaults to the settings dir)
    pub data_dir: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            llama_cpp: BackendSettings::default(),
            agents: default_agents(),
            logging: LoggingConfig::default(),
            worker: WorkerConfig::default(),
            idle: IdleConfig::default(),
            data_dir: None,
        }
    }
}

// ============================================================================
// Backend
// ============================================================================

/// Connection details for the model backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    /// Full chat completions URL (the client posts to it as-is)
    pub base_url: String,
    /// Sent as a bearer token when non-empty
    pub api_key: String,
    /// Model used when neither the request nor the agent names one
    pub model: String,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BACKEND_URL.to_string(),
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

// ============================================================================
// Agents
// ============================================================================

/// A named persona: system prompt plus sampling defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentProfile {
    pub name: String,
    /// Mention handle (`@alias`); derived from the name when empty
    #[serde(skip_serializing_if = "String::is_empty")]
    pub alias: String,
    pub description: String,
    pub system_prompt: String,
    /// Empty means "use the backend default model"
    pub model: String,
    pub temperature: Option<f32>,
    pub context_size: Option<u32>,
}

impl Default for AgentProfile {
    fn default() -> Self {
        Self {
            name: String::new(),
            alias: String::new(),
            description: String::new(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: Some(DEFAULT_TEMPERATURE),
            context_size: Some(DEFAULT_CONTEXT_SIZE),
        }
    }
}

impl AgentProfile {
    fn preset(name: &str, description: &str, system_prompt: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            system_prompt: system_prompt.to_string(),
            ..Self::default()
        }
    }
}

fn default_agents() -> Vec<AgentProfile> {
    vec![
        AgentProfile::preset(
            "General Assistant",
            "Balanced helper for everyday questions.",
            DEFAULT_SYSTEM_PROMPT,
        ),
        AgentProfile::preset(
            "Researcher",
            "Digs into topics and cites what it knows.",
            "You are a meticulous researcher. Gather facts, compare sources and state your confidence.",
        ),
        AgentProfile::preset(
            "Debugger",
            "Walks through code problems step by step.",
            "You are an expert debugger. Reproduce the problem, isolate the cause and propose a minimal fix.",
        ),
        AgentProfile::preset(
            "Creative Writer",
            "Drafts stories, copy and brainstorms.",
            "You are a creative writer. Offer vivid, original prose and several alternative ideas.",
        ),
    ]
}

/// Sampling parameters after override/agent/global resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAgent {
    pub name: String,
    pub model: String,
    pub temperature: f32,
    pub context_size: u32,
}

// ============================================================================
// Logging
// ============================================================================

/// Output format for the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    #[default]
    Component,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Append logs to this file instead of stderr (json format only)
    pub file: Option<String>,
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Component,
            file: None,
            level: "info".to_string(),
        }
    }
}

// ============================================================================
// Worker & Idle
// ============================================================================

/// Background worker and task table limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Grace period for a worker to exit after a shutdown task
    pub shutdown_timeout_secs: u64,
    /// Per-request timeout for the model backend
    pub request_timeout_secs: u64,
    /// Completions allowed per task before the tool loop is aborted
    pub max_tool_iterations: usize,
    /// Upper bound on task records kept by the service
    pub max_tasks: usize,
    /// Completed task records retained after each drain
    pub completed_retained: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout_secs: 5,
            request_timeout_secs: 120,
            max_tool_iterations: 4,
            max_tasks: 20,
            completed_retained: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdleConfig {
    pub timeout_secs: u64,
    pub poll_interval_secs: u64,
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            poll_interval_secs: 5,
        }
    }
}
