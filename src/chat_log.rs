// src/chat_log.rs
//! Append-only audit log of chat turns, stored as a pretty-printed JSON array.
//!
//! The whole file is rewritten on every append. Reads and appends share one
//! async mutex, and each rewrite goes to a sibling temp file that is renamed
//! over the log, so the log on disk is always a complete document.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::analytics::summary::iso8601;
use crate::chat::Usage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatLogStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatLogEntry {
    pub timestamp: String,
    pub message_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
    pub status: ChatLogStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ChatLogEntry {
    pub fn success(
        at: DateTime<Utc>,
        message_count: usize,
        model: &str,
        usage: Option<&Usage>,
    ) -> Self {
        Self {
            timestamp: iso8601(at),
            message_count,
            model: Some(model.to_string()),
            prompt_tokens: usage.and_then(|u| u.prompt_tokens),
            completion_tokens: usage.and_then(|u| u.completion_tokens),
            total_tokens: usage.and_then(|u| u.total_tokens),
            status: ChatLogStatus::Success,
            error_message: None,
        }
    }

    pub fn failure(at: DateTime<Utc>, message_count: usize, error: impl ToString) -> Self {
        Self {
            timestamp: iso8601(at),
            message_count,
            model: None,
            prompt_tokens: None,
            completion_tokens: None,
            total_tokens: None,
            status: ChatLogStatus::Failure,
            error_message: Some(error.to_string()),
        }
    }
}

#[derive(Debug)]
pub struct ChatLogStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ChatLogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry, creating the parent directory and file as needed.
    pub async fn append(&self, entry: ChatLogEntry) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut entries = self.read_all().await?;
        entries.push(entry);

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("creating log directory {}", dir.display()))?;
        }
        let json = serde_json::to_string_pretty(&entries).context("serializing chat log")?;
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("writing chat log {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("replacing chat log {}", self.path.display()))?;
        Ok(())
    }

    /// The last `limit` entries in file order, or all of them when `limit` is `None`.
    pub async fn recent(&self, limit: Option<usize>) -> anyhow::Result<Vec<ChatLogEntry>> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.read_all().await?;
        if let Some(n) = limit {
            let skip = entries.len().saturating_sub(n);
            entries.drain(..skip);
        }
        Ok(entries)
    }

    // `chat-logs.json` -> `chat-logs.json.tmp`, same directory so rename stays atomic.
    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    // Missing file reads as empty; a non-array document also reads as empty.
    async fn read_all(&self) -> anyhow::Result<Vec<ChatLogEntry>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(s) => s,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("reading chat log {}", self.path.display()))
            }
        };
        let value: serde_json::Value = serde_json::from_str(&raw)
            .with_context(|| format!("parsing chat log {}", self.path.display()))?;
        if !value.is_array() {
            return Ok(Vec::new());
        }
        serde_json::from_value(value)
            .with_context(|| format!("decoding chat log entries in {}", self.path.display()))
    }
}
