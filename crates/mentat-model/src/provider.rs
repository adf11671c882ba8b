// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::pin::Pin;
use std::str::FromStr;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

/// Reasoning effort requested from models that expose a thinking control.
/// Providers without one ignore it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingLevel {
    Off,
    #[default]
    Low,
    Medium,
    High,
}

impl FromStr for ThinkingLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "off" => Ok(ThinkingLevel::Off),
            "low" => Ok(ThinkingLevel::Low),
            "medium" => Ok(ThinkingLevel::Medium),
            "high" => Ok(ThinkingLevel::High),
            other => anyhow::bail!("unknown thinking level '{other}' (off|low|medium|high)"),
        }
    }
}

impl std::fmt::Display for ThinkingLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThinkingLevel::Off => write!(f, "off"),
            ThinkingLevel::Low => write!(f, "low"),
            ThinkingLevel::Medium => write!(f, "medium"),
            ThinkingLevel::High => write!(f, "high"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One prompt turn as handed to a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<PromptMessage>,
    pub thinking_level: ThinkingLevel,
}

/// Events streamed back from a provider during one completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseEvent {
    /// A reasoning chunk (extended-thinking APIs); rendered separately from
    /// the response text.
    ThinkingDelta(String),
    /// A response text chunk.
    TextDelta(String),
    /// The provider finished this completion.
    Done,
    /// A recoverable in-stream error; the stream may continue.
    Error(String),
}

pub type ResponseStream = Pin<Box<dyn Stream<Item = anyhow::Result<ResponseEvent>> + Send>>;

/// A model backend capable of streaming completions.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Provider identifier, e.g. "openai" or "mock".
    fn name(&self) -> &str;
    /// Model tag forwarded to the backend.
    fn model_name(&self) -> &str;
    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<ResponseStream>;
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
