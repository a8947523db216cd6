//! Settings management for ChatDeck
//!
//! Settings live in `~/.chatdeck/settings.json`. On load the file is
//! deep-merged over the built-in defaults (and created from them when
//! missing), then `CHATDECK_*` environment variables are applied.
//!
//! The worker never caches settings across tasks; it calls
//! [`SettingsSource::reload`] once per task.

mod types;

pub use types::*;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info};

use crate::error::{DeckError, Result};

impl Settings {
    /// Returns the ChatDeck directory (`~/.chatdeck`).
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".chatdeck")
    }

    /// Returns the default settings file path.
    pub fn path() -> PathBuf {
        Self::dir().join("settings.json")
    }

    /// Load settings from the default path.
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::path())
    }

    /// Load settings from `path`, writing defaults there if it does not exist.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let defaults = serde_json::to_value(Settings::default())?;

        let merged = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let stored: Value = serde_json::from_str(&content)?;
            if !stored.is_object() {
                return Err(DeckError::Config(format!(
                    "{} must contain a JSON object",
                    path.display()
                )));
            }
            debug!(path = %path.display(), "Loaded settings file");
            deep_merge(defaults, stored)
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, serde_json::to_string_pretty(&defaults)?)?;
            info!(path = %path.display(), "Wrote default settings");
            defaults
        };

        let mut settings: Settings = serde_json::from_value(merged)?;
        settings.apply_env_overrides();
        Ok(settings)
    }

    /// Persist settings to `path` as pretty JSON.
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Apply environment variable overrides.
    ///
    /// Variables follow the pattern `CHATDECK_SECTION_KEY`.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("CHATDECK_SYSTEM_PROMPT") {
            self.system_prompt = val;
        }
        if let Ok(val) = std::env::var("CHATDECK_LLAMA_CPP_BASE_URL") {
            self.llama_cpp.base_url = val;
        }
        if let Ok(val) = std::env::var("CHATDECK_LLAMA_CPP_API_KEY") {
            self.llama_cpp.api_key = val;
        }
        if let Ok(val) = std::env::var("CHATDECK_LLAMA_CPP_MODEL") {
            self.llama_cpp.model = val;
        }
        if let Ok(val) = std::env::var("CHATDECK_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("CHATDECK_DATA_DIR") {
            self.data_dir = Some(val);
        }
        if let Ok(val) = std::env::var("CHATDECK_IDLE_TIMEOUT_SECS") {
            if let Ok(v) = val.parse() {
                self.idle.timeout_secs = v;
            }
        }
        if let Ok(val) = std::env::var("CHATDECK_IDLE_POLL_SECS") {
            if let Ok(v) = val.parse() {
                self.idle.poll_interval_secs = v;
            }
        }
    }

    /// Directory holding `conversations/` and `index.jsonl`.
    pub fn data_path(&self) -> PathBuf {
        self.data_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(Self::dir)
    }

    /// The agent whose name matches, otherwise the first configured agent.
    pub fn find_agent(&self, name: Option<&str>) -> Option<&AgentProfile> {
        name.and_then(|n| self.agents.iter().find(|a| a.name == n))
            .or_else(|| self.agents.first())
    }

    /// Resolve model, temperature and context size for a request.
    ///
    /// Explicit overrides win, then the agent's values, then the first
    /// agent's values, then the global defaults.
    pub fn resolve_agent(
        &self,
        name: Option<&str>,
        model: Option<&str>,
        temperature: Option<f32>,
        context_size: Option<u32>,
    ) -> ResolvedAgent {
        let agent = self.find_agent(name);
        let first = self.agents.first();

        let model = model
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .or_else(|| {
                agent
                    .map(|a| a.model.clone())
                    .filter(|m| !m.is_empty())
            })
            .unwrap_or_else(|| self.llama_cpp.model.clone());

        let temperature = temperature
            .or_else(|| agent.and_then(|a| a.temperature))
            .or_else(|| first.and_then(|a| a.temperature))
            .unwrap_or(DEFAULT_TEMPERATURE);

        let context_size = context_size
            .or_else(|| agent.and_then(|a| a.context_size))
            .or_else(|| first.and_then(|a| a.context_size))
            .unwrap_or(DEFAULT_CONTEXT_SIZE);

        ResolvedAgent {
            name: agent
                .map(|a| a.name.clone())
                .or_else(|| name.map(str::to_string))
                .unwrap_or_default(),
            model,
            temperature,
            context_size,
        }
    }

    /// Mention aliases, one per agent in the same order.
    ///
    /// An agent without an explicit alias gets a slug of its name. Clashes
    /// are resolved by suffixing `-2`, `-3`, ...
    pub fn agent_aliases(&self) -> Vec<String> {
        let mut taken = HashSet::new();
        self.agents
            .iter()
            .enumerate()
            .map(|(i, agent)| {
                let mut base = if agent.alias.is_empty() {
                    slugify(&agent.name)
                } else {
                    agent.alias.to_lowercase()
                };
                if base.is_empty() {
                    base = format!("agent-{}", i + 1);
                }
                let mut alias = base.clone();
                let mut counter = 1;
                while taken.contains(&alias) {
                    counter += 1;
                    alias = format!("{}-{}", base, counter);
                }
                taken.insert(alias.clone());
                alias
            })
            .collect()
    }

    /// The agent registered under `alias`, compared case-insensitively.
    pub fn agent_by_alias(&self, alias: &str) -> Option<&AgentProfile> {
        let alias = alias.to_lowercase();
        self.agent_aliases()
            .iter()
            .position(|a| *a == alias)
            .map(|i| &self.agents[i])
    }

    /// System prompt for a new conversation with the given agent.
    pub fn system_prompt_for(&self, agent: Option<&str>) -> String {
        self.find_agent(agent)
            .map(|a| a.system_prompt.clone())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| self.system_prompt.clone())
    }
}

/// Lowercase `name` and collapse every run of other characters into `-`.
fn slugify(name: &str) -> String {
    let mut slug = String::new();
    for c in name.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

/// Recursively merge `overlay` into `base`.
///
/// Objects merge key by key; any other overlay value replaces the base value.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                let merged = match base.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                base.insert(key, merged);
            }
            Value::Object(base)
        }
        (_, overlay) => overlay,
    }
}

// ============================================================================
// Settings Source
// ============================================================================

/// Anything that can produce the current settings on demand.
pub trait SettingsSource: Send + Sync {
    /// Return the latest settings. Implementations must not cache.
    fn reload(&self) -> Result<Settings>;
}

/// Settings backed by a JSON file, re-read on every call.
pub struct FileSettings {
    path: PathBuf,
}

impl FileSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsSource for FileSettings {
    fn reload(&self) -> Result<Settings> {
        Settings::load_from_path(&self.path)
    }
}

/// Fixed in-memory settings.
pub struct StaticSettings(pub Settings);

impl SettingsSource for StaticSettings {
    fn reload(&self) -> Result<Settings> {
        Ok(self.0.clone())
    }
}
