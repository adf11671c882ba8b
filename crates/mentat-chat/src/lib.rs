// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! `mentat-chat` — the conversation core.
//!
//! Three subsystems live here, tied together by the event model:
//!
//! - the **cycle scheduler** ([`ConversationOrchestrator`]): alternates
//!   user and assistant turns, runs the assistant repeatedly in agent
//!   mode, and keeps history transactional across interruptions;
//! - the **participants**: a terminal [`UserParticipant`] and an LLM-backed
//!   [`AssistantParticipant`] with its block-command control panel;
//! - the **effect handlers**: engine-command execution, file operations
//!   with confirmation and backups, and markdown section surgery.
//!
//! MCP tool discovery plugs in through `mentat-mcp`; the assistant's
//! control panel exposes every discovered tool as a command.

pub mod assistant;
mod events;
mod file_ops;
mod history;
pub mod interrupt;
pub mod markdown;
mod messages;
mod notifications;
mod orchestrator;
mod participant;
mod signal;
pub mod user;

#[cfg(test)]
mod tests;

pub use assistant::{
    AssistantParticipant, ChatCommandContext, LlmControlPanel, EMERGENCY_HALT_SENTINEL,
};
pub use events::{EngineCommand, Event, FileEditMode, FileEditRequest};
pub use file_ops::{FileOperationsHandler, OverwritePrompt};
pub use history::{History, HistoryItem};
pub use markdown::{MarkdownEditMode, PREFACE_SENTINEL};
pub use messages::{Author, Message, MessageKind, TextStream, TextStreamSender, UserContent};
pub use notifications::NotificationsPrinter;
pub use orchestrator::{ConversationOrchestrator, ErrorPrompt};
pub use participant::{EventStream, Participant};
pub use signal::Signal;
pub use user::{UserControlPanel, UserParticipant};
