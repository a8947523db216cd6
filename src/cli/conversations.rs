//! Conversation listing and summary commands.

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::warn;

use chatdeck::conversation::ConversationLog;
use chatdeck::tasks::Priority;

use super::common::Deck;

/// Print every conversation with its title and last access time.
pub(crate) async fn cmd_list(deck: Deck) -> Result<()> {
    let ids = deck.conversations.list().await?;
    if ids.is_empty() {
        println!("No conversations yet.");
        return Ok(());
    }

    let index = deck.index.latest().await?;
    for id in ids {
        let record = index.get(&id);
        let title = record
            .and_then(|r| r.title.as_deref())
            .unwrap_or("(untitled)");
        let accessed = record
            .and_then(|r| r.last_accessed)
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{}  {}  {}", id, accessed, title);
    }
    Ok(())
}

/// Recompute and print the summary of one conversation.
pub(crate) async fn cmd_summarize(deck: Deck, conversation_id: String) -> Result<()> {
    let task_id = deck
        .service
        .enqueue_summary(&conversation_id, Priority::NORMAL);
    let outcome = deck.finish(&task_id, Duration::from_secs(30)).await;
    deck.service.stop().await;
    outcome?;

    let index = deck.index.latest().await?;
    if let Some(record) = index.get(&conversation_id) {
        println!("Title:   {}", record.title.as_deref().unwrap_or_default());
        println!("Summary: {}", record.summary.as_deref().unwrap_or_default());
    }
    Ok(())
}

pub(crate) struct LabelArgs {
    pub conversation: String,
    pub target: String,
    pub target_type: Option<String>,
    pub reward: i8,
}

/// Attach a reward to an entry and refresh the conversation summary.
pub(crate) async fn cmd_label(deck: Deck, args: LabelArgs) -> Result<()> {
    let entries = deck.conversations.load(&args.conversation).await?;
    if entries.is_empty() {
        anyhow::bail!("Conversation {} not found", args.conversation);
    }
    let target = entries
        .iter()
        .find(|e| e.id == args.target)
        .with_context(|| {
            format!(
                "Entry {} not found in conversation {}",
                args.target, args.conversation
            )
        })?;
    let target_type = args
        .target_type
        .unwrap_or_else(|| target.kind.as_str().to_string());

    deck.conversations
        .append_label(&args.conversation, &args.target, &target_type, args.reward)
        .await
        .context("Failed to record label")?;
    deck.index.record_access(&args.conversation).await?;

    deck.service.mark_summary_needed(&args.conversation);
    for task_id in deck.service.flush_pending_summaries() {
        if let Err(e) = deck.finish(&task_id, Duration::from_secs(10)).await {
            warn!(error = %e, "Summary refresh failed");
        }
    }
    deck.service.stop().await;

    println!("Recorded reward {} for {} {}", args.reward, target_type, args.target);
    Ok(())
}
