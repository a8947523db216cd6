//! Conversation module - append-only conversation logs
//!
//! Conversations are stored one per file as JSON lines under
//! `<data_dir>/conversations/conversation_<id>.jsonl`. Entries are never
//! rewritten; each append is stamped with the next per-conversation `seq`.
//!
//! # Example
//!
//! ```
//! use chatdeck::conversation::{ConversationEntry, ConversationLog, MemoryConversationLog};
//!
//! # tokio_test::block_on(async {
//! let log = MemoryConversationLog::new();
//! log.append("c1", ConversationEntry::user_message("hello")).await.unwrap();
//! let entries = log.load("c1").await.unwrap();
//! assert_eq!(entries.len(), 1);
//! assert_eq!(entries[0].seq, Some(0));
//! # });
//! ```

pub mod index;
pub mod turn;
pub mod types;

pub use index::{build_title, IndexRecord, IndexStore};
pub use turn::{append_turn, plan_turn, take_mention, TurnPlan};
pub use types::{
    new_id, sort_entries, CompletionContent, ConversationEntry, ConversationMetadata, EntryKind,
    LabelContent, RecordedToolCall, Role, ToolResultContent, REWARD_RANGE,
};

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{DeckError, Result};

/// Storage contract for conversation logs.
#[async_trait]
pub trait ConversationLog: Send + Sync {
    /// Start a new conversation with a metadata entry and return its id.
    async fn create(&self, metadata: ConversationMetadata) -> Result<String>;

    /// All entries of a conversation in log order. Unknown ids yield an empty list.
    async fn load(&self, conversation_id: &str) -> Result<Vec<ConversationEntry>>;

    /// Append an entry, returning it with its assigned `seq`.
    async fn append(
        &self,
        conversation_id: &str,
        entry: ConversationEntry,
    ) -> Result<ConversationEntry>;

    /// Known conversation ids.
    async fn list(&self) -> Result<Vec<String>>;

    /// Attach a reward in [`REWARD_RANGE`] to an earlier entry.
    async fn append_label(
        &self,
        conversation_id: &str,
        target: &str,
        target_type: &str,
        reward: i8,
    ) -> Result<ConversationEntry> {
        if target.is_empty() {
            return Err(DeckError::Conversation("Label target must not be empty.".to_string()));
        }
        if !REWARD_RANGE.contains(&reward) {
            return Err(DeckError::Conversation(format!(
                "Reward must be between {} and {}, got {}.",
                REWARD_RANGE.start(),
                REWARD_RANGE.end(),
                reward
            )));
        }
        let label = LabelContent {
            target: target.to_string(),
            target_type: target_type.to_string(),
            reward,
        };
        self.append(conversation_id, ConversationEntry::label(&label)).await
    }
}

// ============================================================================
// JSONL file store
// ============================================================================

/// Conversation log backed by one JSONL file per conversation.
pub struct JsonlConversationLog {
    root: PathBuf,
    /// Next `seq` per conversation, seeded from disk on first append
    next_seq: Mutex<HashMap<String, u64>>,
}

impl JsonlConversationLog {
    /// Create a store under `<data_dir>/conversations`.
    pub fn new(data_dir: &Path) -> Result<Self> {
        let root = data_dir.join("conversations");
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            next_seq: Mutex::new(HashMap::new()),
        })
    }

    fn conversation_path(&self, conversation_id: &str) -> PathBuf {
        self.root
            .join(format!("conversation_{}.jsonl", conversation_id))
    }

    async fn read_entries(&self, conversation_id: &str) -> Result<Vec<ConversationEntry>> {
        let path = self.conversation_path(conversation_id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<ConversationEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(
                    conversation = %conversation_id,
                    line = line_no + 1,
                    error = %e,
                    "Skipping malformed conversation entry"
                ),
            }
        }
        Ok(entries)
    }
}

#[async_trait]
impl ConversationLog for JsonlConversationLog {
    async fn create(&self, metadata: ConversationMetadata) -> Result<String> {
        let conversation_id = new_id();
        self.append(&conversation_id, ConversationEntry::metadata(&metadata))
            .await?;
        debug!(conversation = %conversation_id, agent = %metadata.agent, "Created conversation");
        Ok(conversation_id)
    }

    async fn load(&self, conversation_id: &str) -> Result<Vec<ConversationEntry>> {
        let mut entries = self.read_entries(conversation_id).await?;
        sort_entries(&mut entries);
        Ok(entries)
    }

    async fn append(
        &self,
        conversation_id: &str,
        mut entry: ConversationEntry,
    ) -> Result<ConversationEntry> {
        // Held across the write so concurrent appends cannot interleave.
        let mut next_seq = self.next_seq.lock().await;
        let seq = match next_seq.get(conversation_id) {
            Some(seq) => *seq,
            None => self
                .read_entries(conversation_id)
                .await?
                .iter()
                .filter_map(|e| e.seq)
                .max()
                .map(|s| s + 1)
                .unwrap_or(0),
        };
        entry.seq = Some(seq);

        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.conversation_path(conversation_id))
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        next_seq.insert(conversation_id.to_string(), seq + 1);
        Ok(entry)
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut dir = tokio::fs::read_dir(&self.root).await?;
        let mut ids = Vec::new();
        while let Some(item) = dir.next_entry().await? {
            let name = item.file_name();
            let name = name.to_string_lossy();
            if let Some(id) = name
                .strip_prefix("conversation_")
                .and_then(|rest| rest.strip_suffix(".jsonl"))
            {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// Conversation log kept entirely in memory.
#[derive(Default)]
pub struct MemoryConversationLog {
    conversations: Mutex<HashMap<String, Vec<ConversationEntry>>>,
}

impl MemoryConversationLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationLog for MemoryConversationLog {
    async fn create(&self, metadata: ConversationMetadata) -> Result<String> {
        let conversation_id = new_id();
        self.append(&conversation_id, ConversationEntry::metadata(&metadata))
            .await?;
        Ok(conversation_id)
    }

    async fn load(&self, conversation_id: &str) -> Result<Vec<ConversationEntry>> {
        let conversations = self.conversations.lock().await;
        let mut entries = conversations
            .get(conversation_id)
            .cloned()
            .unwrap_or_default();
        sort_entries(&mut entries);
        Ok(entries)
    }

    async fn append(
        &self,
        conversation_id: &str,
        mut entry: ConversationEntry,
    ) -> Result<ConversationEntry> {
        if conversation_id.is_empty() {
            return Err(DeckError::Conversation(
                "conversation id must not be empty".to_string(),
            ));
        }
        let mut conversations = self.conversations.lock().await;
        let entries = conversations.entry(conversation_id.to_string()).or_default();
        entry.seq = Some(entries.len() as u64);
        entries.push(entry.clone());
        Ok(entry)
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.conversations.lock().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> ConversationMetadata {
        ConversationMetadata {
            agent: "General Assistant".into(),
            system_prompt: "You are a helpful assistant.".into(),
            model: "ggml-model-q4".into(),
            temperature: 0.2,
            context_size: 4096,
        }
    }

    #[tokio::test]
    async fn test_jsonl_create_and_append() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlConversationLog::new(dir.path()).unwrap();

        let id = log.create(metadata()).await.unwrap();
        let appended = log
            .append(&id, ConversationEntry::user_message("hello"))
            .await
            .unwrap();
        assert_eq!(appended.seq, Some(1));

        let entries = log.load(&id).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, EntryKind::Metadata);
        assert_eq!(entries[0].content["system_prompt"], "You are a helpful assistant.");
        assert_eq!(entries[1].text(), Some("hello"));

        assert!(dir
            .path()
            .join("conversations")
            .join(format!("conversation_{}.jsonl", id))
            .exists());
    }

    #[tokio::test]
    async fn test_jsonl_seq_continues_after_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let log = JsonlConversationLog::new(dir.path()).unwrap();
            let id = log.create(metadata()).await.unwrap();
            log.append(&id, ConversationEntry::user_message("one"))
                .await
                .unwrap();
            id
        };

        let reopened = JsonlConversationLog::new(dir.path()).unwrap();
        let entry = reopened
            .append(&id, ConversationEntry::user_message("two"))
            .await
            .unwrap();
        assert_eq!(entry.seq, Some(2));
    }

    #[tokio::test]
    async fn test_jsonl_skips_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlConversationLog::new(dir.path()).unwrap();
        let id = log.create(metadata()).await.unwrap();

        let path = dir
            .path()
            .join("conversations")
            .join(format!("conversation_{}.jsonl", id));
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str("{not json\n\n");
        std::fs::write(&path, content).unwrap();

        assert_eq!(log.load(&id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_jsonl_missing_conversation_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlConversationLog::new(dir.path()).unwrap();
        assert!(log.load("nope").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_jsonl_list() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlConversationLog::new(dir.path()).unwrap();
        let a = log.create(metadata()).await.unwrap();
        let b = log.create(metadata()).await.unwrap();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(log.list().await.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_memory_log_assigns_seq() {
        let log = MemoryConversationLog::new();
        log.append("c", ConversationEntry::user_message("a"))
            .await
            .unwrap();
        let second = log
            .append("c", ConversationEntry::user_message("b"))
            .await
            .unwrap();
        assert_eq!(second.seq, Some(1));
        assert!(log.append("", ConversationEntry::user_message("x")).await.is_err());
    }

    #[tokio::test]
    async fn test_append_label_persists_reward() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlConversationLog::new(dir.path()).unwrap();
        let id = log.create(metadata()).await.unwrap();
        let reply = log
            .append(&id, ConversationEntry::user_message("hi"))
            .await
            .unwrap();

        let label = log.append_label(&id, &reply.id, "message", 2).await.unwrap();
        assert_eq!(label.seq, Some(2));

        let entries = log.load(&id).await.unwrap();
        let stored = entries.last().unwrap();
        assert_eq!(stored.kind, EntryKind::Label);
        assert_eq!(stored.content["target"], reply.id.as_str());
        assert_eq!(stored.content["reward"], 2);
    }

    #[tokio::test]
    async fn test_append_label_rejects_bad_input() {
        let log = MemoryConversationLog::new();
        let err = log.append_label("c", "t", "completion", 3).await.unwrap_err();
        assert!(err.to_string().contains("between -2 and 2"));
        assert!(log.append_label("c", "", "completion", 1).await.is_err());
        assert!(log.load("c").await.unwrap().is_empty());
    }
}
