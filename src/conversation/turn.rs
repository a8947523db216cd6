//! Preparing a user turn.
//!
//! A message may switch the conversation's agent, either through an explicit
//! choice or an `@alias` mention in its text. When the resolved agent, system
//! prompt, model, temperature or context size differs from the latest
//! metadata entry, a new metadata entry is written before the message so the
//! history picks up the new system prompt.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::{AgentProfile, Settings, DEFAULT_CONTEXT_SIZE, DEFAULT_TEMPERATURE};
use crate::error::{DeckError, Result};
use crate::tasks::CompletionParams;

use super::{ConversationEntry, ConversationLog, ConversationMetadata};

static MENTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(^|\s)@([a-z0-9][a-z0-9\-]*)").unwrap());

static WHITESPACE_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").unwrap());

/// What to write for one user message.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnPlan {
    /// Message text with any agent mention removed
    pub text: String,
    pub metadata: ConversationMetadata,
    /// `metadata` differs from the conversation's latest metadata entry
    pub metadata_changed: bool,
}

impl TurnPlan {
    /// Completion parameters pinned to the planned agent settings.
    pub fn completion_params(&self) -> CompletionParams {
        CompletionParams {
            agent: Some(self.metadata.agent.clone()),
            model: Some(self.metadata.model.clone()),
            temperature: Some(self.metadata.temperature),
            context_size: Some(self.metadata.context_size),
        }
    }
}

/// Find the first `@alias` mention. If it names a configured agent, return
/// that agent and the text with the mention removed; otherwise the trimmed
/// text unchanged.
pub fn take_mention<'s>(settings: &'s Settings, raw: &str) -> (Option<&'s AgentProfile>, String) {
    let Some(caps) = MENTION_RE.captures(raw) else {
        return (None, raw.trim().to_string());
    };
    let Some(agent) = caps.get(2).and_then(|m| settings.agent_by_alias(m.as_str())) else {
        return (None, raw.trim().to_string());
    };

    let whole = caps.get(0).map_or(0..0, |m| m.range());
    let lead = caps.get(1).map_or("", |m| m.as_str());
    let joined = format!("{}{}{}", &raw[..whole.start], lead, &raw[whole.end..]);
    let text = WHITESPACE_RUN_RE.replace_all(&joined, " ").trim().to_string();
    (Some(agent), text)
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// Work out the metadata and text for a new user message.
///
/// `entries` is the conversation so far (empty for a new one). Without a
/// switch, the latest metadata's prompt and model are kept. An explicit
/// `params.agent` (name or alias) or a mention switches agents and takes the
/// new agent's prompt and model; a mention wins over `params.agent`.
/// Explicit model, temperature and context size overrides apply last.
pub fn plan_turn(
    settings: &Settings,
    entries: &[ConversationEntry],
    raw: &str,
    params: &CompletionParams,
) -> Result<TurnPlan> {
    let last = entries
        .iter()
        .rev()
        .find_map(ConversationEntry::as_metadata);

    let mut selected = last
        .as_ref()
        .and_then(|m| settings.agents.iter().find(|a| a.name == m.agent))
        .or_else(|| settings.agents.first());
    let mut switched = false;

    if let Some(name) = params.agent.as_deref().filter(|n| !n.is_empty()) {
        let agent = settings
            .agents
            .iter()
            .find(|a| a.name == name)
            .or_else(|| settings.agent_by_alias(name))
            .ok_or_else(|| DeckError::Config(format!("Unknown agent: {}", name)))?;
        selected = Some(agent);
        switched = true;
    }

    let (mentioned, text) = take_mention(settings, raw);
    if let Some(agent) = mentioned {
        selected = Some(agent);
        switched = true;
    }
    if text.is_empty() {
        return Err(DeckError::Conversation("Prompt must not be empty.".to_string()));
    }

    let agent_prompt = selected.and_then(|a| non_empty(&a.system_prompt));
    let agent_model = selected.and_then(|a| non_empty(&a.model));
    let (system_prompt, model) = match (&last, switched) {
        (Some(last), false) => (
            non_empty(&last.system_prompt).or(agent_prompt),
            non_empty(&last.model).or(agent_model),
        ),
        _ => (agent_prompt, agent_model),
    };
    let system_prompt = system_prompt.unwrap_or_else(|| settings.system_prompt.clone());
    let model = params
        .model
        .as_deref()
        .and_then(non_empty)
        .or(model)
        .unwrap_or_else(|| settings.llama_cpp.model.clone());

    let first = settings.agents.first();
    let temperature = params
        .temperature
        .or_else(|| selected.and_then(|a| a.temperature))
        .or_else(|| first.and_then(|a| a.temperature))
        .unwrap_or(DEFAULT_TEMPERATURE);
    let context_size = params
        .context_size
        .or_else(|| selected.and_then(|a| a.context_size))
        .or_else(|| first.and_then(|a| a.context_size))
        .unwrap_or(DEFAULT_CONTEXT_SIZE);

    let agent = selected
        .map(|a| a.name.clone())
        .or_else(|| last.as_ref().map(|m| m.agent.clone()))
        .unwrap_or_default();

    let metadata = ConversationMetadata {
        agent,
        system_prompt,
        model,
        temperature,
        context_size,
    };
    let metadata_changed = last.as_ref() != Some(&metadata);

    Ok(TurnPlan {
        text,
        metadata,
        metadata_changed,
    })
}

/// Write a planned turn to an existing conversation: the metadata entry if it
/// changed, then the user message. Returns the message entry.
pub async fn append_turn(
    log: &dyn ConversationLog,
    conversation_id: &str,
    plan: &TurnPlan,
) -> Result<ConversationEntry> {
    if plan.metadata_changed {
        log.append(conversation_id, ConversationEntry::metadata(&plan.metadata))
            .await?;
    }
    log.append(conversation_id, ConversationEntry::user_message(&plan.text))
        .await
}
