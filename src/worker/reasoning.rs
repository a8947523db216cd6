//! Splitting assistant replies into visible text and reasoning.
//!
//! Backends surface chain-of-thought in several places, sometimes at once:
//! typed content blocks (`reasoning` / `analysis`), inline
//! `<think>`/`<reasoning>`/`<thought>` markup, a `reasoning` field and a
//! `reasoning_content` field. Everything here is pure.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;

use crate::providers::AssistantMessage;

static CHAIN_MARKUP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<think>(.*?)</think>|<reasoning>(.*?)</reasoning>|<thought>(.*?)</thought>")
        .unwrap()
});

/// An assistant message split into its parts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnpackedMessage {
    /// Visible answer, segments joined by newlines
    pub text: String,
    /// Free-form reasoning from blocks, markup and the `reasoning` field
    pub reasoning: Vec<String>,
    /// Flattened `reasoning_content`
    pub reasoning_content: Vec<String>,
}

/// Remove reasoning markup from `text`, pushing each non-empty body onto `reasoning`.
fn strip_chain_markup(text: &str, reasoning: &mut Vec<String>) -> String {
    CHAIN_MARKUP_RE
        .replace_all(text, |caps: &Captures| {
            let body = caps
                .iter()
                .skip(1)
                .flatten()
                .next()
                .map(|m| m.as_str().trim())
                .unwrap_or("");
            if !body.is_empty() {
                reasoning.push(body.to_string());
            }
            ""
        })
        .into_owned()
}

fn push_visible(segment: &str, text: &mut Vec<String>, reasoning: &mut Vec<String>) {
    let cleaned = strip_chain_markup(segment, reasoning);
    let cleaned = cleaned.trim();
    if !cleaned.is_empty() {
        text.push(cleaned.to_string());
    }
}

/// Free-form reasoning: strings as-is, objects via `text` then `content`, lists in order.
fn append_reasoning(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Null => {}
        Value::String(s) => {
            let s = s.trim();
            if !s.is_empty() {
                out.push(s.to_string());
            }
        }
        Value::Object(map) => {
            let inner = map
                .get("text")
                .filter(|v| is_truthy(v))
                .or_else(|| map.get("content"));
            if let Some(inner) = inner {
                append_reasoning(inner, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                append_reasoning(item, out);
            }
        }
        other => out.push(other.to_string()),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Number(_) => true,
    }
}

/// Depth-first flattening of arbitrarily nested reasoning content.
///
/// Objects contribute the first of `text`, `content`, `message` that is
/// present, or their JSON encoding when none is. Blank strings are dropped.
pub fn flatten_reasoning(value: &Value) -> Vec<String> {
    fn collect(item: &Value, out: &mut Vec<String>) {
        match item {
            Value::Null => {}
            Value::String(s) => {
                let s = s.trim();
                if !s.is_empty() {
                    out.push(s.to_string());
                }
            }
            Value::Object(map) => {
                match ["text", "content", "message"]
                    .iter()
                    .find_map(|key| map.get(*key))
                {
                    Some(inner) => collect(inner, out),
                    None => out.push(item.to_string()),
                }
            }
            Value::Array(items) => items.iter().for_each(|sub| collect(sub, out)),
            other => out.push(other.to_string()),
        }
    }

    let mut out = Vec::new();
    collect(value, &mut out);
    out.retain(|s| !s.trim().is_empty());
    out
}

/// Split an assistant message into visible text, reasoning and reasoning content.
///
/// Tool-call content blocks never reach the visible text; tool calls are
/// read from the message's `tool_calls` field instead.
pub fn unpack_assistant_message(message: &AssistantMessage) -> UnpackedMessage {
    let mut text: Vec<String> = Vec::new();
    let mut reasoning: Vec<String> = Vec::new();

    match &message.content {
        None | Some(Value::Null) => {}
        Some(Value::String(s)) => push_visible(s, &mut text, &mut reasoning),
        Some(Value::Array(blocks)) => {
            for block in blocks {
                let Value::Object(map) = block else {
                    let raw = match block {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    push_visible(&raw, &mut text, &mut reasoning);
                    continue;
                };
                match map.get("type").and_then(Value::as_str) {
                    Some("reasoning") | Some("analysis") => {
                        let inner = map
                            .get("text")
                            .filter(|v| is_truthy(v))
                            .or_else(|| map.get("content"));
                        if let Some(inner) = inner {
                            append_reasoning(inner, &mut reasoning);
                        }
                    }
                    Some("text") => {
                        let body = map.get("text").and_then(Value::as_str).unwrap_or("");
                        push_visible(body, &mut text, &mut reasoning);
                    }
                    Some("tool_call") => {}
                    _ => push_visible(&block.to_string(), &mut text, &mut reasoning),
                }
            }
        }
        Some(other) => push_visible(&other.to_string(), &mut text, &mut reasoning),
    }

    if let Some(field) = &message.reasoning {
        append_reasoning(field, &mut reasoning);
    }

    let reasoning_content = message
        .reasoning_content
        .as_ref()
        .map(flatten_reasoning)
        .unwrap_or_default();

    UnpackedMessage {
        text: text.join("\n").trim().to_string(),
        reasoning: reasoning
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        reasoning_content,
    }
}
