// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use mentat_mcp::McpManager;
use mentat_model::ThinkingLevel;

use crate::events::Event;
use crate::history::History;
use crate::messages::Author;

/// A lazily produced event sequence.  Errors terminate the stream; the
/// orchestrator inspects them for [`crate::Signal`]s.
pub type EventStream = Box<dyn Iterator<Item = anyhow::Result<Event>> + Send>;

/// One side of the conversation.
///
/// The orchestrator calls the methods in a fixed order per cycle: `prepare`,
/// then `consume_events_and_render` on the side that receives, then
/// `get_input_and_run_commands` on the side that acts.  Methods take `&self`
/// — implementations keep their state behind internal locks so the
/// orchestrator can hold several participants at once while events stream
/// between them.
pub trait Participant: Send + Sync {
    /// The author key this participant writes under.
    fn author(&self) -> Author;

    /// Optional warm-up before a turn.
    fn prepare(&self) {}

    /// Look at a history snapshot plus live events and render them for this
    /// side (terminal output for the user, prompt assembly for the
    /// assistant).  The iterator is consumed incrementally so rendering can
    /// begin while the other side is still producing.
    fn consume_events_and_render(
        &self,
        events: &mut dyn Iterator<Item = anyhow::Result<Event>>,
    ) -> anyhow::Result<()>;

    /// Act: produce this side's events for the cycle, running any commands
    /// embedded in the input as a side effect.
    fn get_input_and_run_commands(&self) -> anyhow::Result<EventStream>;

    /// Drop per-conversation state (history was cleared).
    fn clear(&self);

    /// Rebuild per-conversation state from a loaded history.
    fn initialize_from_history(&self, history: &History);

    fn is_agent_mode_enabled(&self) -> bool {
        false
    }

    fn set_agent_mode(&self, _enabled: bool) {}

    fn set_llm_commands_enabled(&self, _enabled: bool) {}

    fn set_thinking_level(&self, _level: ThinkingLevel) {}

    /// Returns whether the participant accepted the budget (only the deep
    /// research assistant does).
    fn set_deep_research_budget(&self, _budget: u32) -> bool {
        false
    }

    /// Refresh the participant's MCP-backed commands from the manager's
    /// current snapshot.  No-op for participants without a command panel.
    fn update_mcp_commands(&self, _manager: &McpManager) {}
}
