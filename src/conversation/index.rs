//! Conversation index (`index.jsonl`)
//!
//! An append-only log of per-conversation facts: access times, summaries and
//! titles. Reading merges all lines for a conversation so the newest value of
//! each field wins. Once the file grows past `max_lines` it is compacted to
//! one line per conversation and atomically replaced.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::Result;
use crate::utils::string::{first_line, truncate_with_ellipsis};

const DEFAULT_MAX_LINES: usize = 16384;
const TITLE_FALLBACK_CHARS: usize = 80;

/// A line in the index, and also the merged view of a conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub conversation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl IndexRecord {
    /// Overlay the fields present in `newer`.
    fn merge(&mut self, newer: IndexRecord) {
        if newer.kind.is_some() {
            self.kind = newer.kind;
        }
        if newer.summary.is_some() {
            self.summary = newer.summary;
        }
        if newer.title.is_some() {
            self.title = newer.title;
        }
        if newer.last_accessed.is_some() {
            self.last_accessed = newer.last_accessed;
        }
        if newer.timestamp.is_some() {
            self.timestamp = newer.timestamp;
        }
    }
}

pub struct IndexStore {
    path: PathBuf,
    max_lines: usize,
    /// Lines currently in the file; the lock also serialises writers
    line_count: Mutex<usize>,
}

impl IndexStore {
    /// Open (or prepare) `<data_dir>/index.jsonl`.
    pub fn open(data_dir: &Path) -> Result<Self> {
        Self::with_max_lines(data_dir, DEFAULT_MAX_LINES)
    }

    pub fn with_max_lines(data_dir: &Path, max_lines: usize) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let path = data_dir.join("index.jsonl");
        let line_count = match std::fs::read_to_string(&path) {
            Ok(content) => content.lines().count(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            max_lines,
            line_count: Mutex::new(line_count),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Merged record per conversation.
    pub async fn latest(&self) -> Result<HashMap<String, IndexRecord>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(e.into()),
        };

        let mut latest: HashMap<String, IndexRecord> = HashMap::new();
        for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let record: IndexRecord = match serde_json::from_str(line) {
                Ok(record) => record,
                Err(e) => {
                    warn!(error = %e, "Skipping malformed index line");
                    continue;
                }
            };
            if record.conversation_id.is_empty() {
                continue;
            }
            latest
                .entry(record.conversation_id.clone())
                .or_insert_with(|| IndexRecord {
                    conversation_id: record.conversation_id.clone(),
                    ..IndexRecord::default()
                })
                .merge(record);
        }
        Ok(latest)
    }

    /// Last recorded access time for a conversation.
    pub async fn last_accessed(&self, conversation_id: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .latest()
            .await?
            .get(conversation_id)
            .and_then(|r| r.last_accessed))
    }

    /// Record that a conversation was opened now.
    pub async fn record_access(&self, conversation_id: &str) -> Result<()> {
        self.append(IndexRecord {
            conversation_id: conversation_id.to_string(),
            kind: Some("access".to_string()),
            last_accessed: Some(Utc::now()),
            ..IndexRecord::default()
        })
        .await
    }

    /// Record a summary and title. A missing `last_accessed` is stamped with now.
    pub async fn record_summary(
        &self,
        conversation_id: &str,
        summary: &str,
        title: &str,
        last_accessed: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.append(IndexRecord {
            conversation_id: conversation_id.to_string(),
            kind: Some("summary".to_string()),
            summary: Some(summary.to_string()),
            title: Some(title.to_string()),
            last_accessed: Some(last_accessed.unwrap_or_else(Utc::now)),
            timestamp: None,
        })
        .await
    }

    async fn append(&self, mut record: IndexRecord) -> Result<()> {
        if record.timestamp.is_none() {
            record.timestamp = Some(Utc::now());
        }
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let mut count = self.line_count.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        *count += 1;

        if *count > self.max_lines {
            *count = self.compact().await?;
        }
        Ok(())
    }

    /// Rewrite the file with one merged line per conversation.
    async fn compact(&self) -> Result<usize> {
        let latest = self.latest().await?;
        let mut buf = String::new();
        for record in latest.values() {
            buf.push_str(&serde_json::to_string(record)?);
            buf.push('\n');
        }
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, buf).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        info!(conversations = latest.len(), "Compacted conversation index");
        Ok(latest.len())
    }
}

/// Title for a conversation: the summary when present, otherwise the first
/// line of `fallback` cut to 80 characters.
pub fn build_title(summary: Option<&str>, fallback: &str) -> String {
    match summary {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => truncate_with_ellipsis(first_line(fallback), TITLE_FALLBACK_CHARS),
    }
}
