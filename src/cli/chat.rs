//! Chat command handler.

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use chatdeck::conversation::{append_turn, plan_turn, ConversationEntry, ConversationLog, EntryKind};
use chatdeck::tasks::CompletionParams;

use super::common::Deck;

pub(crate) struct ChatArgs {
    pub message: String,
    pub conversation: Option<String>,
    pub params: CompletionParams,
}

/// Send one message and print the assistant's reply.
///
/// `@alias` in the message or `--agent` switches the conversation's agent.
pub(crate) async fn cmd_chat(deck: Deck, args: ChatArgs) -> Result<()> {
    let ChatArgs {
        message,
        conversation,
        params,
    } = args;

    let existing = match &conversation {
        Some(id) => {
            let entries = deck.conversations.load(id).await?;
            if entries.is_empty() {
                anyhow::bail!("Conversation {} not found", id);
            }
            entries
        }
        None => Vec::new(),
    };
    let plan = plan_turn(&deck.settings, &existing, &message, &params)?;

    let conversation_id = match conversation {
        Some(id) => {
            append_turn(deck.conversations.as_ref(), &id, &plan)
                .await
                .context("Failed to record message")?;
            id
        }
        None => {
            let id = deck
                .conversations
                .create(plan.metadata.clone())
                .await
                .context("Failed to create conversation")?;
            deck.conversations
                .append(&id, ConversationEntry::user_message(&plan.text))
                .await
                .context("Failed to record message")?;
            id
        }
    };
    eprintln!("conversation: {}", conversation_id);
    if plan.metadata_changed {
        info!(
            conversation = %conversation_id,
            agent = %plan.metadata.agent,
            model = %plan.metadata.model,
            "Agent settings recorded"
        );
    }
    deck.index.record_access(&conversation_id).await?;
    deck.service.mark_summary_needed(&conversation_id);

    let task_id = deck
        .service
        .enqueue_completion(&conversation_id, plan.completion_params());
    let outcome = deck.finish(&task_id, deck.completion_timeout()).await;

    if outcome.is_ok() {
        let entries = deck.conversations.load(&conversation_id).await?;
        let reply = entries
            .iter()
            .rev()
            .find(|e| e.kind == EntryKind::Completion)
            .and_then(|e| e.text())
            .unwrap_or_default();
        println!("{}", reply);

        // Refresh the summary while the worker is still up.
        for summary_task in deck.service.flush_pending_summaries() {
            if let Err(e) = deck.finish(&summary_task, Duration::from_secs(10)).await {
                warn!(error = %e, "Summary refresh failed");
            }
        }
    }

    deck.service.stop().await;
    outcome.map(|_| ())
}
