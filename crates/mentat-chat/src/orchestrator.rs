// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! The conversation cycle scheduler.
//!
//! One cycle is user → assistant → user, terminated by a history commit.
//! User events are fully materialised before the assistant sees them
//! (engine commands in them must take effect first); assistant events
//! stream to the user-side renderer as they are produced.  Agent mode keeps
//! the assistant taking turns inside the same cycle, with an invisible
//! continuation reminder between turns, until it signals completion.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error};

use mentat_mcp::McpManager;

use crate::assistant::EMERGENCY_HALT_SENTINEL;
use crate::events::{EngineCommand, Event};
use crate::file_ops::FileOperationsHandler;
use crate::history::History;
use crate::messages::{Author, Message};
use crate::notifications::NotificationsPrinter;
use crate::participant::{EventStream, Participant};
use crate::signal::Signal;

const MCP_INITIAL_LOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Asks whether to continue despite MCP startup errors.  Defaults to an
/// interactive y/n prompt; tests inject an answer.
pub type ErrorPrompt = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// An error the cycle loop must not swallow: it terminates the run instead
/// of starting the next cycle.
#[derive(Debug, Error)]
#[error("{0}")]
struct FatalCycleError(String);

#[derive(Default)]
struct CycleFlags {
    received_assistant_done: AtomicBool,
    should_exit_after_one_cycle: AtomicBool,
    mcp_commands_loaded_once: AtomicBool,
}

/// Drives the conversation loop.  Cheap to clone — all state is shared —
/// so engine commands and the streaming adapters can carry a handle back
/// to it.
#[derive(Clone)]
pub struct ConversationOrchestrator {
    user: Arc<dyn Participant>,
    assistant: Arc<dyn Participant>,
    history: Arc<Mutex<History>>,
    mcp: Arc<McpManager>,
    printer: NotificationsPrinter,
    file_ops: Arc<FileOperationsHandler>,
    flags: Arc<CycleFlags>,
    mcp_error_prompt: Arc<ErrorPrompt>,
}

impl ConversationOrchestrator {
    pub fn new(
        user: Arc<dyn Participant>,
        assistant: Arc<dyn Participant>,
        mcp: Arc<McpManager>,
        printer: NotificationsPrinter,
        file_ops: FileOperationsHandler,
    ) -> Self {
        Self {
            user,
            assistant,
            history: Arc::new(Mutex::new(History::new())),
            mcp,
            printer,
            file_ops: Arc::new(file_ops),
            flags: Arc::new(CycleFlags::default()),
            mcp_error_prompt: Arc::new(Box::new(|question: &str| {
                prompt_continue_despite_errors(question)
            })),
        }
    }

    /// Replace the interactive MCP error prompt (tests, embedders).
    pub fn with_mcp_error_prompt(mut self, prompt: ErrorPrompt) -> Self {
        self.mcp_error_prompt = Arc::new(prompt);
        self
    }

    pub fn history(&self) -> Arc<Mutex<History>> {
        Arc::clone(&self.history)
    }

    /// Run the conversation until end of input.  Any error that escapes the
    /// cycle loop triggers a best-effort history save before propagating.
    pub fn run(&self) -> anyhow::Result<()> {
        match self.run_loop() {
            Ok(()) => Ok(()),
            Err(e) => {
                if Signal::from_error(&e) == Some(Signal::EndOfInput) {
                    return Ok(());
                }
                self.save_history_on_crash();
                Err(e)
            }
        }
    }

    fn run_loop(&self) -> anyhow::Result<()> {
        if let Some(report) = self.mcp.status_report() {
            self.printer.warn(&report);
        }
        loop {
            match self.run_cycle() {
                Ok(()) => {
                    if self.flags.should_exit_after_one_cycle.load(Ordering::SeqCst) {
                        return Ok(());
                    }
                }
                Err(e) => match Signal::from_error(&e) {
                    Some(Signal::Interrupted) => self.handle_interruption(),
                    Some(Signal::EndOfInput) => return Err(e),
                    None if e.downcast_ref::<FatalCycleError>().is_some() => return Err(e),
                    None => {
                        self.printer
                            .error(&format!("Conversation cycle failed: {e:#}"));
                        error!("conversation cycle failed: {e:#}");
                        self.handle_interruption();
                    }
                },
            }
        }
    }

    pub(crate) fn run_cycle(&self) -> anyhow::Result<()> {
        self.flags.received_assistant_done.store(false, Ordering::SeqCst);
        self.flags.should_exit_after_one_cycle.store(false, Ordering::SeqCst);

        let user_events = self.collect_user_events()?;
        self.render_assistant(user_events)?;
        self.stream_assistant_to_user()?;
        self.history.lock().unwrap().commit();
        Ok(())
    }

    /// Materialise the user's events, executing engine commands inline —
    /// they may rewrite history (clear, load) and must land before the
    /// assistant sees the cycle.
    fn collect_user_events(&self) -> anyhow::Result<Vec<Event>> {
        let stream = self.user.get_input_and_run_commands()?;
        let mut events = Vec::new();
        for event in stream {
            match event? {
                Event::EngineCommand(command) => self.execute_engine_command(&command)?,
                event => events.push(event),
            }
        }
        Ok(events)
    }

    fn render_assistant(&self, user_events: Vec<Event>) -> anyhow::Result<()> {
        self.assistant.prepare();
        self.wait_for_mcps_and_update_commands()?;

        // Snapshot before recording, so the live events are not replayed
        // twice.
        let snapshot = self.history_view_for(self.assistant.author());
        self.record_messages(&user_events);

        let mut events = std::iter::once(Ok(Event::HistoryRecovery(snapshot)))
            .chain(user_events.into_iter().map(Ok));
        self.assistant.consume_events_and_render(&mut events)
    }

    /// The assistant's turn(s), streamed through engine-command stripping
    /// and history tracking into the user-side renderer.
    fn stream_assistant_to_user(&self) -> anyhow::Result<()> {
        let snapshot = self.history_view_for(self.user.author());
        let flow = AssistantFlow::new(self.clone());
        let mut events = std::iter::once(Ok(Event::HistoryRecovery(snapshot))).chain(flow);
        self.user.consume_events_and_render(&mut events)
    }

    /// Execute one engine command against this orchestrator.
    fn execute_engine_command(&self, command: &EngineCommand) -> anyhow::Result<()> {
        debug!("executing engine command: {command:?}");
        match command {
            EngineCommand::ClearHistory => {
                self.printer.notify("Clearing history");
                self.history.lock().unwrap().clear();
                self.user.clear();
                self.assistant.clear();
            }
            EngineCommand::SaveHistory(path) => {
                let path = path.clone().unwrap_or_else(History::default_save_path);
                self.printer
                    .notify(&format!("Saving history to {}", path.display()));
                self.history.lock().unwrap().save(&path)?;
            }
            EngineCommand::LoadHistory(path) => {
                self.printer
                    .notify(&format!("Loading history from {}", path.display()));
                let mut history = self.history.lock().unwrap();
                history.load(path)?;
                self.user.initialize_from_history(&history);
                self.assistant.initialize_from_history(&history);
            }
            EngineCommand::Exit => return Err(Signal::EndOfInput.into()),
            EngineCommand::AgentMode(enabled) => {
                self.assistant.set_agent_mode(*enabled);
                self.printer.notify(if *enabled {
                    "Agent mode enabled"
                } else {
                    "Agent mode disabled"
                });
            }
            EngineCommand::AssistantDone => {
                self.printer.notify("Assistant marked the task as done");
                self.flags.received_assistant_done.store(true, Ordering::SeqCst);
            }
            EngineCommand::LlmCommandsExecution(enabled) => {
                self.assistant.set_llm_commands_enabled(*enabled);
                self.printer.notify(&format!(
                    "LLM command execution {}",
                    if *enabled { "enabled" } else { "disabled" }
                ));
            }
            EngineCommand::Once(enabled) => {
                self.flags
                    .should_exit_after_one_cycle
                    .store(*enabled, Ordering::SeqCst);
                self.printer.notify(&format!(
                    "Once mode {}",
                    if *enabled { "enabled" } else { "disabled" }
                ));
            }
            EngineCommand::ThinkingLevel(level) => {
                self.assistant.set_thinking_level(*level);
                self.printer
                    .notify(&format!("Thinking level set to {level}"));
            }
            EngineCommand::DeepResearchBudget(budget) => {
                if self.assistant.set_deep_research_budget(*budget) {
                    self.printer
                        .notify(&format!("Deep research budget set to {budget} cycles"));
                } else {
                    self.printer
                        .warn("Budget setting is only available for the deep research assistant");
                }
            }
            EngineCommand::FileEdit(request) => self.file_ops.handle(request)?,
        }
        Ok(())
    }

    /// One-time gate before the assistant's first turn: block until MCP
    /// discovery settles, refresh the assistant's tool commands, and get
    /// the user's verdict on any startup errors.
    fn wait_for_mcps_and_update_commands(&self) -> anyhow::Result<()> {
        if self.flags.mcp_commands_loaded_once.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if !self.mcp.initial_load_complete() {
            self.printer.warn("Waiting for MCP servers to finish loading...");
            self.mcp.wait_for_initial_load(MCP_INITIAL_LOAD_TIMEOUT);
        }
        self.assistant.update_mcp_commands(&self.mcp);

        if self.mcp.has_errors() && !self.mcp.errors_acknowledged() {
            self.printer.error(&self.mcp.error_report());
            let proceed = (self.mcp_error_prompt)(
                "Errors occurred with MCP servers. Do you want to continue? (y/n): ",
            );
            if !proceed {
                self.printer.error("Exiting due to MCP server errors.");
                return Err(FatalCycleError(
                    "MCP server startup errors were not accepted".to_string(),
                )
                .into());
            }
            self.mcp.acknowledge_errors();
        }
        Ok(())
    }

    fn record_messages(&self, events: &[Event]) {
        let mut history = self.history.lock().unwrap();
        for event in events {
            if let Event::Message(message) = event {
                history.add_message(message.clone());
            }
        }
    }

    fn history_view_for(&self, author: Author) -> Vec<Message> {
        self.history.lock().unwrap().get_history_for(author)
    }

    fn handle_interruption(&self) {
        if self.history.lock().unwrap().reset_uncommitted() {
            self.printer
                .warn("Reset uncommitted changes from interrupted operation");
        }
    }

    fn save_history_on_crash(&self) {
        let path = History::default_save_path();
        self.printer
            .warn(&format!("Saving history to {}", path.display()));
        if let Err(e) = self.history.lock().unwrap().save(&path) {
            self.printer.error(&format!("History save failed: {e:#}"));
        }
    }

    fn agent_continuation_message(&self) -> Message {
        Message::invisible(
            Author::User,
            format!(
                "AUTOMATIC RESPONSE: I see you're still working on this task. Please continue \
                 with your next steps.\n\n\
                 A few reminders to help you:\n\
                 - When you've completed the entire task, use the done command with your final report\n\
                 - You can run multiple commands in a single response for better efficiency\n\
                 - Remember to verify your results before marking the task as done\n\n\
                 If you need to halt execution because of a system issue, you can use the \
                 emergency code \"{EMERGENCY_HALT_SENTINEL}\".\n\n\
                 I'll wait for your next steps or completion message."
            ),
        )
    }

    /// Between agent turns: record the invisible reminder and re-render the
    /// assistant with a fresh snapshot plus the reminder.
    fn send_agent_continuation(&self) -> anyhow::Result<()> {
        let reminder = self.agent_continuation_message();
        let snapshot = self.history_view_for(self.assistant.author());
        self.history.lock().unwrap().add_message(reminder.clone());
        let mut events = vec![
            Ok(Event::HistoryRecovery(snapshot)),
            Ok(Event::Message(reminder)),
        ]
        .into_iter();
        self.assistant.consume_events_and_render(&mut events)
    }
}

fn prompt_continue_despite_errors(question: &str) -> bool {
    print!("{question}");
    let _ = std::io::stdout().flush();
    let mut answer = String::new();
    if std::io::stdin().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Streams the assistant's turn(s) outward while executing engine commands
/// inline and recording messages in history.
///
/// In agent mode, when one turn's stream runs dry and the done flag is
/// still unset, a continuation reminder goes to the assistant and the next
/// turn's stream is spliced in — the downstream consumer observes a single
/// uninterrupted event sequence.
struct AssistantFlow {
    orch: ConversationOrchestrator,
    inner: Option<EventStream>,
    started: bool,
    finished: bool,
}

impl AssistantFlow {
    fn new(orch: ConversationOrchestrator) -> Self {
        Self {
            orch,
            inner: None,
            started: false,
            finished: false,
        }
    }

    fn next_turn_stream(&mut self) -> Option<anyhow::Result<()>> {
        if !self.started {
            self.started = true;
        } else {
            let done = self
                .orch
                .flags
                .received_assistant_done
                .load(Ordering::SeqCst);
            if !self.orch.assistant.is_agent_mode_enabled() || done {
                return None;
            }
            if let Err(e) = self.orch.send_agent_continuation() {
                return Some(Err(e));
            }
        }
        match self.orch.assistant.get_input_and_run_commands() {
            Ok(stream) => {
                self.inner = Some(stream);
                Some(Ok(()))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

impl Iterator for AssistantFlow {
    type Item = anyhow::Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.finished {
                return None;
            }
            if self.inner.is_none() {
                match self.next_turn_stream() {
                    None => {
                        self.finished = true;
                        return None;
                    }
                    Some(Err(e)) => {
                        self.finished = true;
                        return Some(Err(e));
                    }
                    Some(Ok(())) => {}
                }
            }
            let Some(stream) = self.inner.as_mut() else {
                continue;
            };
            match stream.next() {
                None => {
                    self.inner = None;
                    continue;
                }
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(e));
                }
                Some(Ok(Event::EngineCommand(command))) => {
                    if let Err(e) = self.orch.execute_engine_command(&command) {
                        self.finished = true;
                        return Some(Err(e));
                    }
                }
                Some(Ok(Event::Message(message))) => {
                    self.orch.history.lock().unwrap().add_message(message.clone());
                    return Some(Ok(Event::Message(message)));
                }
                Some(Ok(event)) => return Some(Ok(event)),
            }
        }
    }
}
