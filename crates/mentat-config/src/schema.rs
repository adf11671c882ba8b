// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

fn default_model() -> String {
    "openai/gpt-4o".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Default model string, `provider/tag`.  Overridable with `--model`.
    #[serde(default = "default_model")]
    pub model: String,
    /// Per-provider API keys.  Prefer the provider's canonical environment
    /// variable (OPENAI_API_KEY, ANTHROPIC_API_KEY, …) over storing keys in
    /// version-controlled files.
    #[serde(default)]
    pub api_keys: HashMap<String, String>,
    /// External tool servers spoken to over MCP.
    #[serde(default)]
    pub mcp: McpServersConfig,
    /// Per-command status overrides for the assistant's control panel.
    ///
    /// ```json
    /// { "llm_commands": { "create_file": "OFF", "tree": "AGENT_ONLY" } }
    /// ```
    #[serde(default)]
    pub llm_commands: HashMap<String, CommandStatus>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_keys: HashMap::new(),
            mcp: McpServersConfig::default(),
            llm_commands: HashMap::new(),
        }
    }
}

/// MCP server command strings, keyed by server name.
///
/// Two disjoint sets: servers whose tools are exposed to the chat assistant
/// and servers reserved for the deep-research assistant.  A BTreeMap keeps
/// startup and report ordering deterministic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpServersConfig {
    #[serde(default)]
    pub chat: BTreeMap<String, String>,
    #[serde(default)]
    pub deep_research: BTreeMap<String, String>,
}

/// Availability override for a single assistant command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandStatus {
    /// Always available.
    On,
    /// Never available.
    Off,
    /// Available only while agent mode is enabled.
    AgentOnly,
}

impl std::fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandStatus::On => write!(f, "ON"),
            CommandStatus::Off => write!(f, "OFF"),
            CommandStatus::AgentOnly => write!(f, "AGENT_ONLY"),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
