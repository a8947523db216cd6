//! Deterministic conversation summaries.

use serde::Serialize;
use serde_json::Value;

use crate::conversation::{build_title, ConversationEntry, Role};
use crate::utils::string::prefix_chars;

const USER_BUDGET: usize = 80;
const ASSISTANT_BUDGET: usize = 120;
const SEPARATOR: &str = " → ";
const PLACEHOLDER: &str = "New conversation";
const TITLE_FALLBACK: &str = "Conversation";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationSummary {
    pub summary: String,
    pub title: String,
}

fn user_text(entry: &ConversationEntry) -> String {
    match &entry.content {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn assistant_text(entry: &ConversationEntry) -> String {
    match &entry.content {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        _ => String::new(),
    }
}

/// Summarize from the first user entry and the last assistant entry.
///
/// With both present the summary is `user[..80] → assistant[..120]`;
/// otherwise whichever text exists, or a placeholder.
pub fn summarize_entries(entries: &[ConversationEntry]) -> ConversationSummary {
    let user = entries
        .iter()
        .find(|e| e.role == Role::User)
        .map(user_text)
        .unwrap_or_default();
    let assistant = entries
        .iter()
        .rev()
        .find(|e| e.role == Role::Assistant)
        .map(assistant_text)
        .unwrap_or_default();

    let summary = match (user.is_empty(), assistant.is_empty()) {
        (false, false) => format!(
            "{}{}{}",
            prefix_chars(&user, USER_BUDGET),
            SEPARATOR,
            prefix_chars(&assistant, ASSISTANT_BUDGET)
        ),
        (true, false) => assistant.clone(),
        (false, true) => user.clone(),
        (true, true) => PLACEHOLDER.to_string(),
    };

    let fallback = [user.as_str(), assistant.as_str()]
        .into_iter()
        .find(|s| !s.is_empty())
        .unwrap_or(TITLE_FALLBACK);
    let title = build_title(Some(&summary), fallback);

    ConversationSummary { summary, title }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::CompletionContent;

    fn reply(text: &str) -> ConversationEntry {
        ConversationEntry::completion(&CompletionContent {
            text: text.into(),
            ..Default::default()
        })
    }

    #[test]
    fn test_user_and_assistant() {
        let entries = vec![
            ConversationEntry::user_message("How do I sort a vec?"),
            reply("first"),
            ConversationEntry::user_message("And reverse it?"),
            reply("Use sort then reverse."),
        ];
        let summary = summarize_entries(&entries);
        assert_eq!(
            summary.summary,
            "How do I sort a vec? → Use sort then reverse."
        );
        assert_eq!(summary.title, summary.summary);
    }

    #[test]
    fn test_truncation_budgets() {
        let entries = vec![
            ConversationEntry::user_message(&"u".repeat(200)),
            reply(&"a".repeat(200)),
        ];
        let summary = summarize_entries(&entries);
        assert_eq!(
            summary.summary,
            format!("{} → {}", "u".repeat(80), "a".repeat(120))
        );
    }

    #[test]
    fn test_only_user() {
        let summary = summarize_entries(&[ConversationEntry::user_message("just asking")]);
        assert_eq!(summary.summary, "just asking");
    }

    #[test]
    fn test_placeholder() {
        let summary = summarize_entries(&[]);
        assert_eq!(summary.summary, "New conversation");
        assert_eq!(summary.title, "New conversation");
    }
}
