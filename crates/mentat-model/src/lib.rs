// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! `mentat-model` — the contract between the conversation core and LLM
//! backends.
//!
//! The core never talks HTTP itself; it sees a [`ModelProvider`] trait
//! object that streams [`ResponseEvent`]s.  Concrete provider drivers are
//! external collaborators and plug in behind this trait.  The crate ships
//! two deterministic mock providers for tests and a [`BlockingCompletion`]
//! bridge that lets the synchronous conversation foreground consume the
//! async response stream.

mod bridge;
mod mock;
mod provider;

pub use bridge::{BlockingCompletion, CompletionChunk};
pub use mock::{MockProvider, ScriptedMockProvider};
pub use provider::{
    CompletionRequest, ModelProvider, PromptMessage, ResponseEvent, ResponseStream, Role,
    ThinkingLevel,
};

use std::sync::Arc;

/// Resolve a `provider/tag` model string to a provider instance.
///
/// Only the mock family is built into this crate; real drivers are
/// registered by the embedding application.  The error names the provider
/// so a typo in `--model` is diagnosable.
pub fn resolve(model: &str) -> anyhow::Result<Arc<dyn ModelProvider>> {
    let (provider, _tag) = model.split_once('/').unwrap_or((model, ""));
    match provider {
        "mock" => Ok(Arc::new(MockProvider)),
        other => anyhow::bail!("no driver available for provider '{other}'"),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
