// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! The LLM side of the conversation.
//!
//! The assistant participant is stateless across turns: every render
//! rebuilds its prompt from the history snapshot plus live events.  Its
//! reply streams out as a lazy message first; once that stream has been
//! drained (normally by the user-side renderer), the accumulated text is
//! parsed for command blocks and the commands run against the chat command
//! context.

mod commands;

pub use commands::{
    AppendFileCommand, ChatCommandContext, CreateFileCommand, DoneCommand,
    MarkdownAppendSectionCommand, MarkdownUpdateSectionCommand, OpenFileCommand,
    PrependFileCommand, TreeCommand,
};

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use mentat_commands::{
    render_commands_help, Command, CommandParser, CommandRegistry, ParseResult,
};
use mentat_config::CommandStatus;
use mentat_mcp::{McpManager, McpMode, McpToolCommand};
use mentat_model::{
    BlockingCompletion, CompletionChunk, CompletionRequest, ModelProvider, PromptMessage, Role,
    ThinkingLevel,
};

use crate::events::{EngineCommand, Event};
use crate::history::History;
use crate::messages::{Author, Message, MessageKind, TextStream};
use crate::participant::{EventStream, Participant};

/// Literal an assistant can emit to force the current agent run to stop.
/// Cross-coupled with the deep-research engine's kill switch; treat the
/// string as a contract.
pub const EMERGENCY_HALT_SENTINEL: &str = "SHUT_DOWN_DEEP_RESEARCHER";

const PROMPT_INTRO: &str = "\
You can use the commands documented below when the user's request calls for them.
Use them only when the user asks for what they do; incorrect command use erodes trust.
The commands are parsed programmatically: follow the syntax exactly, symbol by symbol.
A command block starts with `<<< command_name`, carries `///section` markers, and ends with `>>>`:

#<<< example_command
#///section_name
#Section content goes here.
#>>>

The `#` prefix above marks documentation examples; omit it to actually run a command.
Commands execute only after your full message is sent; their results arrive with the next message.
";

/// The assistant's command surface: registry, parser, agent-mode flag, and
/// per-command status overrides from config.
pub struct LlmControlPanel {
    registry: Mutex<CommandRegistry<ChatCommandContext>>,
    parser: CommandParser,
    agent_mode: AtomicBool,
    commands_parsing_enabled: AtomicBool,
    status_overrides: HashMap<String, CommandStatus>,
    /// Names added from MCP discovery, replaced wholesale on each refresh.
    mcp_command_names: Mutex<Vec<String>>,
}

impl LlmControlPanel {
    pub fn new(status_overrides: HashMap<String, CommandStatus>) -> Self {
        let mut registry = CommandRegistry::new();
        registry.register(DoneCommand::new());
        registry.register(CreateFileCommand::new());
        registry.register(AppendFileCommand::new());
        registry.register(PrependFileCommand::new());
        registry.register(MarkdownUpdateSectionCommand::new());
        registry.register(MarkdownAppendSectionCommand::new());
        registry.register(OpenFileCommand::new());
        registry.register(TreeCommand::new());
        Self {
            registry: Mutex::new(registry),
            parser: CommandParser::new(),
            agent_mode: AtomicBool::new(false),
            commands_parsing_enabled: AtomicBool::new(true),
            status_overrides,
            mcp_command_names: Mutex::new(Vec::new()),
        }
    }

    pub fn is_agent_mode_enabled(&self) -> bool {
        self.agent_mode.load(Ordering::SeqCst)
    }

    pub fn set_agent_mode(&self, enabled: bool) {
        self.agent_mode.store(enabled, Ordering::SeqCst);
    }

    pub fn set_commands_parsing_enabled(&self, enabled: bool) {
        self.commands_parsing_enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn commands_parsing_enabled(&self) -> bool {
        self.commands_parsing_enabled.load(Ordering::SeqCst)
    }

    pub fn command_names(&self) -> Vec<String> {
        self.registry.lock().unwrap().names()
    }

    /// Replace the MCP-backed command set with the manager's current
    /// snapshot.  Commands from servers that have since failed disappear;
    /// built-ins are never touched.
    pub fn update_mcp_commands(&self, commands: Vec<McpToolCommand<ChatCommandContext>>) {
        let mut registry = self.registry.lock().unwrap();
        let mut names = self.mcp_command_names.lock().unwrap();
        for name in names.drain(..) {
            registry.remove(&name);
        }
        for command in commands {
            names.push(Command::<ChatCommandContext>::name(&command).to_string());
            registry.register(command);
        }
        debug!(count = names.len(), "refreshed MCP-backed commands");
    }

    /// Availability of a command under the config overrides and the current
    /// agent-mode state.
    fn command_enabled(&self, name: &str) -> bool {
        match self.status_overrides.get(name) {
            Some(CommandStatus::Off) => false,
            Some(CommandStatus::AgentOnly) => self.is_agent_mode_enabled(),
            Some(CommandStatus::On) | None => true,
        }
    }

    /// The control-panel documentation embedded in the assistant's prompt.
    pub fn render_system_prompt(&self) -> String {
        let registry = self.registry.lock().unwrap();
        let enabled: Vec<_> = registry
            .all()
            .into_iter()
            .filter(|c| self.command_enabled(c.name()))
            .collect();
        format!("{PROMPT_INTRO}\n{}", render_commands_help(&enabled))
    }

    /// Parse `text` for command blocks and execute the valid ones, in block
    /// order.  Returns the produced events, with the aggregated error
    /// report (if any) appended as an assistant-visible message so the
    /// model can correct itself next turn.
    pub fn parse_and_execute(&self, text: &str) -> Vec<Event> {
        if !self.commands_parsing_enabled() {
            return Vec::new();
        }
        let registry = self.registry.lock().unwrap();
        let mut results = self.parser.parse(text, &registry);
        results.sort_by_key(|r| r.block_start_line);

        let mut ctx = ChatCommandContext::new();
        for result in results.iter().filter(|r| r.is_executable()) {
            let name = result.command_name.as_deref().unwrap_or_default();
            if !self.command_enabled(name) {
                ctx.push_event(Event::Message(Message::assistant_notification(format!(
                    "Command '{name}' is currently disabled and was not executed."
                ))));
                continue;
            }
            let Some(command) = registry.get(name) else {
                continue;
            };
            if let Err(e) = command.execute(&mut ctx, result.args.clone()) {
                warn!(command = name, "command execution failed: {e:#}");
                ctx.push_event(Event::Message(Message::assistant_notification(format!(
                    "Command '{name}' failed: {e:#}"
                ))));
            }
        }
        self.append_error_report(&results, &mut ctx);
        ctx.into_events()
    }

    fn append_error_report(&self, results: &[ParseResult], ctx: &mut ChatCommandContext) {
        if let Some(report) = self.parser.error_report(results) {
            ctx.push_event(Event::Message(Message::assistant_notification(report)));
        }
    }
}

struct AssistantCore {
    provider: Arc<dyn ModelProvider>,
    thinking_level: ThinkingLevel,
    /// The prompt under construction: history snapshot plus this cycle's
    /// live events.
    prompt_view: Vec<Message>,
}

/// The LLM participant.
pub struct AssistantParticipant {
    core: Arc<Mutex<AssistantCore>>,
    panel: Arc<LlmControlPanel>,
    mcp_mode: McpMode,
}

impl AssistantParticipant {
    pub fn new(provider: Arc<dyn ModelProvider>, panel: LlmControlPanel) -> Self {
        Self {
            core: Arc::new(Mutex::new(AssistantCore {
                provider,
                thinking_level: ThinkingLevel::default(),
                prompt_view: Vec::new(),
            })),
            panel: Arc::new(panel),
            mcp_mode: McpMode::Chat,
        }
    }

    /// Route this assistant's MCP commands from the given client set
    /// instead of the default chat set.
    pub fn with_mcp_mode(mut self, mode: McpMode) -> Self {
        self.mcp_mode = mode;
        self
    }

    pub fn panel(&self) -> &Arc<LlmControlPanel> {
        &self.panel
    }

    fn build_request(&self) -> CompletionRequest {
        let core = self.core.lock().unwrap();
        let mut messages = vec![PromptMessage::system(self.panel.render_system_prompt())];
        for message in &core.prompt_view {
            let Some(content) = message.content_for_assistant() else {
                continue;
            };
            if content.is_empty() {
                continue;
            }
            let role = match message.author {
                Author::Assistant => Role::Assistant,
                Author::User => Role::User,
                Author::System => Role::System,
            };
            messages.push(PromptMessage { role, content });
        }
        CompletionRequest {
            messages,
            thinking_level: core.thinking_level,
        }
    }
}

impl Participant for AssistantParticipant {
    fn author(&self) -> Author {
        Author::Assistant
    }

    fn consume_events_and_render(
        &self,
        events: &mut dyn Iterator<Item = anyhow::Result<Event>>,
    ) -> anyhow::Result<()> {
        for event in events {
            match event? {
                Event::HistoryRecovery(messages) => {
                    let mut core = self.core.lock().unwrap();
                    core.prompt_view = messages;
                }
                Event::Message(message) => {
                    self.core.lock().unwrap().prompt_view.push(message);
                }
                // Notifications are user-facing; engine commands never
                // reach a participant.
                Event::Notification(_) => {}
                Event::EngineCommand(cmd) => {
                    warn!("engine command reached the assistant renderer: {cmd:?}")
                }
            }
        }
        Ok(())
    }

    fn get_input_and_run_commands(&self) -> anyhow::Result<EventStream> {
        let request = self.build_request();
        let provider = Arc::clone(&self.core.lock().unwrap().provider);
        let completion = BlockingCompletion::spawn(provider, request);

        let (thinking_tx, thinking) = TextStream::live();
        let (response_tx, response) = TextStream::live();
        let error_slot: Arc<Mutex<Option<anyhow::Error>>> = Arc::new(Mutex::new(None));

        let pump_error = Arc::clone(&error_slot);
        std::thread::spawn(move || {
            for chunk in completion {
                let delivered = match chunk {
                    Ok(CompletionChunk::Thinking(t)) => thinking_tx.send(t),
                    Ok(CompletionChunk::Text(t)) => response_tx.send(t),
                    Err(e) => {
                        *pump_error.lock().unwrap() = Some(e);
                        break;
                    }
                };
                if !delivered {
                    break;
                }
            }
            // Dropping the senders finishes both streams.
        });

        let message = Message::new(
            Author::Assistant,
            MessageKind::ThinkingAndResponse {
                thinking: thinking.clone(),
                response: response.clone(),
            },
        );

        Ok(Box::new(AssistantTurn {
            stage: TurnStage::EmitMessage,
            panel: Arc::clone(&self.panel),
            message: Some(message),
            thinking,
            response,
            error_slot,
            queued: VecDeque::new(),
        }))
    }

    fn clear(&self) {
        self.core.lock().unwrap().prompt_view.clear();
    }

    fn initialize_from_history(&self, history: &History) {
        self.core.lock().unwrap().prompt_view = history.get_history_for(Author::Assistant);
    }

    fn is_agent_mode_enabled(&self) -> bool {
        self.panel.is_agent_mode_enabled()
    }

    fn set_agent_mode(&self, enabled: bool) {
        self.panel.set_agent_mode(enabled);
    }

    fn set_llm_commands_enabled(&self, enabled: bool) {
        self.panel.set_commands_parsing_enabled(enabled);
    }

    fn set_thinking_level(&self, level: ThinkingLevel) {
        self.core.lock().unwrap().thinking_level = level;
    }

    fn update_mcp_commands(&self, manager: &McpManager) {
        self.panel
            .update_mcp_commands(manager.create_commands_for_mode(self.mcp_mode));
    }
}

enum TurnStage {
    EmitMessage,
    Finalize,
    Drain,
}

/// One assistant turn as a two-phase event stream.
///
/// Phase one yields the streamed reply message while the model is still
/// producing, so downstream rendering happens live.  Phase two runs after
/// the consumer moves past that message: the (by then finished) text is
/// parsed for commands, and their events follow.
struct AssistantTurn {
    stage: TurnStage,
    panel: Arc<LlmControlPanel>,
    message: Option<Message>,
    thinking: TextStream,
    response: TextStream,
    error_slot: Arc<Mutex<Option<anyhow::Error>>>,
    queued: VecDeque<Event>,
}

impl Iterator for AssistantTurn {
    type Item = anyhow::Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.stage {
                TurnStage::EmitMessage => {
                    self.stage = TurnStage::Finalize;
                    let message = self.message.take()?;
                    return Some(Ok(Event::Message(message)));
                }
                TurnStage::Finalize => {
                    // No-ops when the downstream renderer already consumed
                    // the streams.
                    self.response.drain();
                    self.thinking.drain();
                    self.stage = TurnStage::Drain;
                    if let Some(e) = self.error_slot.lock().unwrap().take() {
                        return Some(Err(e));
                    }
                    let text = self.response.text();
                    if text.contains(EMERGENCY_HALT_SENTINEL) {
                        warn!("assistant emitted the emergency halt sentinel");
                        self.queued
                            .push_back(Event::EngineCommand(EngineCommand::AssistantDone));
                    }
                    self.queued.extend(self.panel.parse_and_execute(&text));
                }
                TurnStage::Drain => return self.queued.pop_front().map(Ok),
            }
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
