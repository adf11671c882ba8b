// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use mentat_model::ThinkingLevel;

use crate::markdown::MarkdownEditMode;
use crate::messages::Message;

/// Everything that flows between participants and the orchestrator during a
/// cycle.  Only `Message` events contribute to history; `EngineCommand`
/// events are executed by the orchestrator and never forwarded.
#[derive(Debug, Clone)]
pub enum Event {
    Message(Message),
    /// A snapshot replay injected ahead of live events when rendering a
    /// participant for a fresh turn.
    HistoryRecovery(Vec<Message>),
    /// Transient, rendered but never stored.
    Notification(String),
    EngineCommand(EngineCommand),
}

/// Control instructions addressed to the orchestrator itself.
#[derive(Debug, Clone)]
pub enum EngineCommand {
    ClearHistory,
    /// `None` saves to a timestamped default filename.
    SaveHistory(Option<PathBuf>),
    LoadHistory(PathBuf),
    Exit,
    AgentMode(bool),
    AssistantDone,
    LlmCommandsExecution(bool),
    Once(bool),
    ThinkingLevel(ThinkingLevel),
    DeepResearchBudget(u32),
    FileEdit(FileEditRequest),
}

#[derive(Debug, Clone)]
pub struct FileEditRequest {
    pub path: PathBuf,
    pub content: String,
    pub mode: FileEditMode,
}

#[derive(Debug, Clone)]
pub enum FileEditMode {
    Create,
    Append,
    Prepend,
    UpdateMarkdownSection {
        section_path: Vec<String>,
        submode: MarkdownEditMode,
    },
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
