// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::messages::{Author, Message};

/// Wrapper for messages in history.  Kept as a struct (rather than the bare
/// message) because the on-disk format nests each message under a
/// `"message"` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub message: Message,
}

#[derive(Serialize, Deserialize)]
struct HistoryFile {
    messages: Vec<HistoryItem>,
}

/// Append-only conversation log with a two-phase commit.
///
/// Messages land in the uncommitted queue while a cycle is in flight;
/// `commit` makes them durable, `reset_uncommitted` discards a cycle that
/// was interrupted.  Only committed items are saved to disk.
#[derive(Debug, Default, PartialEq)]
pub struct History {
    committed: Vec<HistoryItem>,
    uncommitted: Vec<HistoryItem>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_message(&mut self, message: Message) {
        self.uncommitted.push(HistoryItem { message });
    }

    /// Move uncommitted items to committed.
    pub fn commit(&mut self) {
        self.committed.append(&mut self.uncommitted);
    }

    /// Discard uncommitted items; returns whether anything was dropped.
    pub fn reset_uncommitted(&mut self) -> bool {
        let had_changes = !self.uncommitted.is_empty();
        self.uncommitted.clear();
        had_changes
    }

    pub fn clear(&mut self) {
        self.committed.clear();
        self.uncommitted.clear();
    }

    /// All messages, committed first, then the in-flight cycle.
    pub fn messages(&self) -> Vec<Message> {
        self.all_items().map(|item| item.message.clone()).collect()
    }

    /// Messages as seen by `author`: everything except the author's own
    /// directly-entered input (their typing is not conversation received).
    pub fn get_history_for(&self, author: Author) -> Vec<Message> {
        self.all_items()
            .filter(|item| {
                item.message.author != author || !item.message.is_directly_entered()
            })
            .map(|item| item.message.clone())
            .collect()
    }

    pub fn committed_len(&self) -> usize {
        self.committed.len()
    }

    pub fn uncommitted_len(&self) -> usize {
        self.uncommitted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.committed.is_empty() && self.uncommitted.is_empty()
    }

    /// Default filename for save-on-demand and save-on-crash.
    pub fn default_save_path() -> PathBuf {
        PathBuf::from(format!(
            "mentat_history_{}.json",
            chrono::Local::now().format("%Y%m%d_%H%M%S")
        ))
    }

    /// Save the committed conversation as JSON.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let file = HistoryFile {
            messages: self.committed.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        debug!(path = %path.display(), items = self.committed.len(), "history saved");
        Ok(())
    }

    /// Replace the conversation with the contents of a saved file.
    /// Unknown message types fail the whole load.
    pub fn load(&mut self, path: &Path) -> anyhow::Result<()> {
        let text =
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let file: HistoryFile =
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        self.clear();
        self.committed = file.messages;
        debug!(path = %path.display(), items = self.committed.len(), "history loaded");
        Ok(())
    }

    fn all_items(&self) -> impl Iterator<Item = &HistoryItem> {
        self.committed.iter().chain(self.uncommitted.iter())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
