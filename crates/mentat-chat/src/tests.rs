// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
/// Scenario tests for the conversation cycle scheduler.
///
/// Participants are scripted so every scenario is deterministic: the user
/// side replays canned event batches, the assistant side replays canned
/// turns.  The real terminal/LLM participants are covered by their own
/// module tests and the workspace-level integration tests.
#[cfg(test)]
mod orchestrator_tests {
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use mentat_mcp::McpManager;

    use crate::events::{EngineCommand, Event};
    use crate::file_ops::FileOperationsHandler;
    use crate::history::History;
    use crate::messages::{Author, Message, MessageKind};
    use crate::notifications::NotificationsPrinter;
    use crate::orchestrator::ConversationOrchestrator;
    use crate::participant::{EventStream, Participant};
    use crate::signal::Signal;

    // ── Scripted participants ─────────────────────────────────────────────────

    struct ScriptedUser {
        inputs: Mutex<VecDeque<Vec<anyhow::Result<Event>>>>,
        rendered: Mutex<Vec<Event>>,
        cleared: AtomicUsize,
        initialized: AtomicUsize,
    }

    impl ScriptedUser {
        fn new(inputs: Vec<Vec<anyhow::Result<Event>>>) -> Arc<Self> {
            Arc::new(Self {
                inputs: Mutex::new(inputs.into()),
                rendered: Mutex::new(Vec::new()),
                cleared: AtomicUsize::new(0),
                initialized: AtomicUsize::new(0),
            })
        }

        fn rendered_assistant_texts(&self) -> Vec<String> {
            self.rendered
                .lock()
                .unwrap()
                .iter()
                .filter_map(|e| match e {
                    Event::Message(m) if m.author == Author::Assistant => m.content_for_assistant(),
                    _ => None,
                })
                .collect()
        }

        fn pending_inputs(&self) -> usize {
            self.inputs.lock().unwrap().len()
        }
    }

    impl Participant for ScriptedUser {
        fn author(&self) -> Author {
            Author::User
        }

        fn consume_events_and_render(
            &self,
            events: &mut dyn Iterator<Item = anyhow::Result<Event>>,
        ) -> anyhow::Result<()> {
            for event in events {
                self.rendered.lock().unwrap().push(event?);
            }
            Ok(())
        }

        fn get_input_and_run_commands(&self) -> anyhow::Result<EventStream> {
            match self.inputs.lock().unwrap().pop_front() {
                Some(events) => Ok(Box::new(events.into_iter())),
                None => Err(Signal::EndOfInput.into()),
            }
        }

        fn clear(&self) {
            self.cleared.fetch_add(1, Ordering::SeqCst);
        }

        fn initialize_from_history(&self, _history: &History) {
            self.initialized.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct ScriptedAssistant {
        turns: Mutex<VecDeque<Vec<anyhow::Result<Event>>>>,
        agent_mode: AtomicBool,
        renders: Mutex<Vec<Vec<Event>>>,
        cleared: AtomicUsize,
    }

    impl ScriptedAssistant {
        fn new(turns: Vec<Vec<anyhow::Result<Event>>>) -> Arc<Self> {
            Arc::new(Self {
                turns: Mutex::new(turns.into()),
                agent_mode: AtomicBool::new(false),
                renders: Mutex::new(Vec::new()),
                cleared: AtomicUsize::new(0),
            })
        }

        fn with_agent_mode(self: Arc<Self>) -> Arc<Self> {
            self.agent_mode.store(true, Ordering::SeqCst);
            self
        }

        fn remaining_turns(&self) -> usize {
            self.turns.lock().unwrap().len()
        }

        fn rendered_batches(&self) -> Vec<Vec<Event>> {
            self.renders.lock().unwrap().clone()
        }
    }

    impl Participant for ScriptedAssistant {
        fn author(&self) -> Author {
            Author::Assistant
        }

        fn consume_events_and_render(
            &self,
            events: &mut dyn Iterator<Item = anyhow::Result<Event>>,
        ) -> anyhow::Result<()> {
            let batch: Result<Vec<Event>, _> = events.collect();
            self.renders.lock().unwrap().push(batch?);
            Ok(())
        }

        fn get_input_and_run_commands(&self) -> anyhow::Result<EventStream> {
            let turn = self.turns.lock().unwrap().pop_front().unwrap_or_else(|| {
                // Scripts exhausted: end any agent run instead of looping.
                vec![Ok(Event::EngineCommand(EngineCommand::AssistantDone))]
            });
            Ok(Box::new(turn.into_iter()))
        }

        fn clear(&self) {
            self.cleared.fetch_add(1, Ordering::SeqCst);
        }

        fn initialize_from_history(&self, _history: &History) {}

        fn is_agent_mode_enabled(&self) -> bool {
            self.agent_mode.load(Ordering::SeqCst)
        }

        fn set_agent_mode(&self, enabled: bool) {
            self.agent_mode.store(enabled, Ordering::SeqCst);
        }
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn loaded_mcp_manager() -> Arc<McpManager> {
        let manager = McpManager::new(&BTreeMap::new(), &BTreeMap::new()).unwrap();
        manager.start_loading();
        assert!(manager.wait_for_initial_load(Duration::from_secs(5)));
        Arc::new(manager)
    }

    fn orchestrator(
        user: Arc<ScriptedUser>,
        assistant: Arc<ScriptedAssistant>,
        backup_dir: &std::path::Path,
    ) -> ConversationOrchestrator {
        let printer = NotificationsPrinter::uncolored();
        let file_ops = FileOperationsHandler::new(printer.clone())
            .with_backup_dir(backup_dir.join("backups"))
            .with_overwrite_prompt(Box::new(|_| true));
        ConversationOrchestrator::new(user, assistant, loaded_mcp_manager(), printer, file_ops)
            .with_mcp_error_prompt(Box::new(|_| true))
    }

    fn user_text(text: &str) -> anyhow::Result<Event> {
        Ok(Event::Message(Message::directly_entered(Author::User, text)))
    }

    fn assistant_text(text: &str) -> anyhow::Result<Event> {
        Ok(Event::Message(Message::text(Author::Assistant, text)))
    }

    fn texts(messages: &[Message]) -> Vec<String> {
        messages.iter().filter_map(Message::content_for_assistant).collect()
    }

    // ── Scenario: chat one-shot ───────────────────────────────────────────────

    #[test]
    fn one_shot_cycle_commits_both_messages_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let user = ScriptedUser::new(vec![vec![user_text("hi")]]);
        let assistant = ScriptedAssistant::new(vec![vec![assistant_text("hello")]]);
        let orch = orchestrator(Arc::clone(&user), Arc::clone(&assistant), dir.path());

        orch.run_cycle().unwrap();

        let history = orch.history();
        let history = history.lock().unwrap();
        assert_eq!(history.committed_len(), 2);
        assert_eq!(history.uncommitted_len(), 0);
        assert_eq!(texts(&history.messages()), ["hi", "hello"]);
        // The user's own typed input is not in the view replayed to them.
        assert_eq!(texts(&history.get_history_for(Author::User)), ["hello"]);
        // The assistant sees both sides.
        assert_eq!(texts(&history.get_history_for(Author::Assistant)), ["hi", "hello"]);
        // The user-side renderer saw the reply live.
        assert_eq!(user.rendered_assistant_texts(), ["hello"]);
    }

    #[test]
    fn assistant_render_gets_snapshot_then_live_events() {
        let dir = tempfile::tempdir().unwrap();
        let user = ScriptedUser::new(vec![vec![user_text("question")]]);
        let assistant = ScriptedAssistant::new(vec![vec![assistant_text("answer")]]);
        let orch = orchestrator(user, Arc::clone(&assistant), dir.path());

        orch.run_cycle().unwrap();

        let batches = assistant.rendered_batches();
        assert_eq!(batches.len(), 1);
        assert!(matches!(batches[0][0], Event::HistoryRecovery(ref m) if m.is_empty()));
        assert!(
            matches!(&batches[0][1], Event::Message(m) if m.content_for_assistant().as_deref() == Some("question"))
        );
    }

    // ── Scenario: engine command interception ─────────────────────────────────

    #[test]
    fn clear_history_takes_effect_before_the_assistant_sees_events() {
        let dir = tempfile::tempdir().unwrap();
        let user = ScriptedUser::new(vec![vec![
            Ok(Event::EngineCommand(EngineCommand::ClearHistory)),
            user_text("fresh start"),
        ]]);
        let assistant = ScriptedAssistant::new(vec![vec![assistant_text("ok")]]);
        let orch = orchestrator(Arc::clone(&user), Arc::clone(&assistant), dir.path());

        // Preload a stale conversation.
        {
            let history = orch.history();
            let mut history = history.lock().unwrap();
            history.add_message(Message::text(Author::User, "stale"));
            history.commit();
        }

        orch.run_cycle().unwrap();

        let history = orch.history();
        let history = history.lock().unwrap();
        assert_eq!(texts(&history.messages()), ["fresh start", "ok"]);
        // Both participants were told to drop their state.
        assert_eq!(user.cleared.load(Ordering::SeqCst), 1);
        assert_eq!(assistant.cleared.load(Ordering::SeqCst), 1);
        // The engine command never reached the assistant's renderer.
        for batch in assistant.rendered_batches() {
            assert!(!batch.iter().any(|e| matches!(e, Event::EngineCommand(_))));
        }
    }

    #[test]
    fn exit_unwinds_the_cycle_without_commit() {
        let dir = tempfile::tempdir().unwrap();
        let user = ScriptedUser::new(vec![vec![
            user_text("bye"),
            Ok(Event::EngineCommand(EngineCommand::Exit)),
        ]]);
        let assistant = ScriptedAssistant::new(vec![]);
        let orch = orchestrator(user, assistant, dir.path());

        orch.run().unwrap();

        let history = orch.history();
        let history = history.lock().unwrap();
        assert!(history.is_empty());
    }

    #[test]
    fn once_mode_exits_after_the_current_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let user = ScriptedUser::new(vec![
            vec![
                Ok(Event::EngineCommand(EngineCommand::Once(true))),
                user_text("only cycle"),
            ],
            vec![user_text("never consumed")],
        ]);
        let assistant = ScriptedAssistant::new(vec![vec![assistant_text("reply")]]);
        let orch = orchestrator(Arc::clone(&user), assistant, dir.path());

        orch.run().unwrap();

        assert_eq!(user.pending_inputs(), 1, "the second input must not be read");
        let history = orch.history();
        let history = history.lock().unwrap();
        assert_eq!(history.committed_len(), 2);
    }

    #[test]
    fn save_history_engine_command_writes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let save_path = dir.path().join("saved.json");
        let user = ScriptedUser::new(vec![vec![
            user_text("note this down"),
            Ok(Event::EngineCommand(EngineCommand::SaveHistory(Some(
                save_path.clone(),
            )))),
        ]]);
        let assistant = ScriptedAssistant::new(vec![vec![assistant_text("noted")]]);
        let orch = orchestrator(user, assistant, dir.path());

        orch.run_cycle().unwrap();
        // The save ran during the user phase, before this cycle committed.
        assert!(save_path.exists());
        let mut loaded = History::new();
        loaded.load(&save_path).unwrap();
        assert_eq!(loaded.messages().len(), 0);
    }

    #[test]
    fn load_history_reinitializes_participants() {
        let dir = tempfile::tempdir().unwrap();
        let load_path = dir.path().join("prior.json");
        {
            let mut prior = History::new();
            prior.add_message(Message::text(Author::Assistant, "from before"));
            prior.commit();
            prior.save(&load_path).unwrap();
        }

        let user = ScriptedUser::new(vec![vec![
            Ok(Event::EngineCommand(EngineCommand::LoadHistory(
                load_path.clone(),
            ))),
            user_text("continuing"),
        ]]);
        let assistant = ScriptedAssistant::new(vec![vec![assistant_text("welcome back")]]);
        let orch = orchestrator(Arc::clone(&user), assistant, dir.path());

        orch.run_cycle().unwrap();

        assert_eq!(user.initialized.load(Ordering::SeqCst), 1);
        let history = orch.history();
        let history = history.lock().unwrap();
        assert_eq!(
            texts(&history.messages()),
            ["from before", "continuing", "welcome back"]
        );
    }

    #[test]
    fn agent_mode_engine_command_toggles_the_assistant() {
        let dir = tempfile::tempdir().unwrap();
        let user = ScriptedUser::new(vec![vec![
            Ok(Event::EngineCommand(EngineCommand::AgentMode(true))),
            user_text("go"),
        ]]);
        let assistant = ScriptedAssistant::new(vec![
            vec![assistant_text("working")],
            vec![
                Ok(Event::EngineCommand(EngineCommand::AssistantDone)),
                assistant_text("done"),
            ],
        ]);
        let orch = orchestrator(user, Arc::clone(&assistant), dir.path());

        orch.run_cycle().unwrap();
        assert!(assistant.is_agent_mode_enabled());
        assert_eq!(assistant.remaining_turns(), 0);
    }

    // ── Scenario: agent-mode continuation ─────────────────────────────────────

    #[test]
    fn agent_mode_emits_one_reminder_per_extra_iteration() {
        let dir = tempfile::tempdir().unwrap();
        let user = ScriptedUser::new(vec![vec![user_text("do the task")]]);
        let assistant = ScriptedAssistant::new(vec![
            vec![assistant_text("working")],
            vec![assistant_text("still working")],
            vec![
                Ok(Event::EngineCommand(EngineCommand::AssistantDone)),
                assistant_text("done"),
            ],
        ])
        .with_agent_mode();
        let orch = orchestrator(Arc::clone(&user), Arc::clone(&assistant), dir.path());

        orch.run_cycle().unwrap();

        // All three turns ran inside one cycle.
        assert_eq!(assistant.remaining_turns(), 0);
        assert_eq!(
            user.rendered_assistant_texts(),
            ["working", "still working", "done"]
        );

        // Exactly two continuation reminders (between turns 1→2 and 2→3),
        // invisible, user-authored, recorded in history.
        let history = orch.history();
        let history = history.lock().unwrap();
        let reminders: Vec<Message> = history
            .messages()
            .into_iter()
            .filter(|m| matches!(m.kind, MessageKind::Invisible { .. }))
            .collect();
        assert_eq!(reminders.len(), 2);
        for reminder in &reminders {
            assert_eq!(reminder.author, Author::User);
            assert!(reminder
                .content_for_assistant()
                .unwrap()
                .contains("done command"));
        }
        assert_eq!(history.uncommitted_len(), 0);
    }

    #[test]
    fn agent_mode_off_emits_no_reminders() {
        let dir = tempfile::tempdir().unwrap();
        let user = ScriptedUser::new(vec![vec![user_text("hi")]]);
        let assistant = ScriptedAssistant::new(vec![vec![assistant_text("reply")]]);
        let orch = orchestrator(user, Arc::clone(&assistant), dir.path());

        orch.run_cycle().unwrap();

        assert_eq!(assistant.remaining_turns(), 0);
        let history = orch.history();
        let history = history.lock().unwrap();
        assert!(!history
            .messages()
            .iter()
            .any(|m| matches!(m.kind, MessageKind::Invisible { .. })));
    }

    #[test]
    fn agent_reminder_renders_with_a_fresh_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let user = ScriptedUser::new(vec![vec![user_text("task")]]);
        let assistant = ScriptedAssistant::new(vec![
            vec![assistant_text("first")],
            vec![
                Ok(Event::EngineCommand(EngineCommand::AssistantDone)),
                assistant_text("second"),
            ],
        ])
        .with_agent_mode();
        let orch = orchestrator(user, Arc::clone(&assistant), dir.path());

        orch.run_cycle().unwrap();

        let batches = assistant.rendered_batches();
        // Batch 0: initial render.  Batch 1: continuation render.
        assert_eq!(batches.len(), 2);
        match &batches[1][0] {
            Event::HistoryRecovery(snapshot) => {
                // The snapshot already carries the first turn's output.
                assert!(texts(snapshot).iter().any(|t| t == "first"));
            }
            other => panic!("continuation render must start with a snapshot, got {other:?}"),
        }
        assert!(matches!(
            &batches[1][1],
            Event::Message(m) if matches!(m.kind, MessageKind::Invisible { .. })
        ));
    }

    // ── Scenario: interruption and failures ───────────────────────────────────

    #[test]
    fn interruption_mid_stream_resets_uncommitted_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        let user = ScriptedUser::new(vec![vec![user_text("hi")]]);
        let assistant = ScriptedAssistant::new(vec![vec![
            assistant_text("partial"),
            Err(Signal::Interrupted.into()),
        ]]);
        let orch = orchestrator(Arc::clone(&user), assistant, dir.path());

        // The loop swallows the interruption and ends cleanly at EOF.
        orch.run().unwrap();

        let history = orch.history();
        let history = history.lock().unwrap();
        assert_eq!(history.uncommitted_len(), 0);
        assert_eq!(history.committed_len(), 0);
    }

    #[test]
    fn assistant_failure_discards_cycle_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        let user = ScriptedUser::new(vec![
            vec![user_text("first try")],
            vec![user_text("second try")],
        ]);
        let assistant = ScriptedAssistant::new(vec![
            vec![Err(anyhow::anyhow!("backend exploded"))],
            vec![assistant_text("recovered")],
        ]);
        let orch = orchestrator(user, assistant, dir.path());

        orch.run().unwrap();

        let history = orch.history();
        let history = history.lock().unwrap();
        // Cycle one was discarded wholesale; cycle two committed.
        assert_eq!(texts(&history.messages()), ["second try", "recovered"]);
    }

    #[test]
    fn file_edit_engine_command_is_applied_by_the_handler() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("made-by-assistant.txt");
        let user = ScriptedUser::new(vec![vec![user_text("make the file")]]);
        let assistant = ScriptedAssistant::new(vec![vec![
            assistant_text("creating it"),
            Ok(Event::EngineCommand(EngineCommand::FileEdit(
                crate::events::FileEditRequest {
                    path: target.clone(),
                    content: "made".into(),
                    mode: crate::events::FileEditMode::Create,
                },
            ))),
        ]]);
        let orch = orchestrator(user, assistant, dir.path());

        orch.run_cycle().unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "made");
    }

    #[test]
    fn mcp_error_decline_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let user = ScriptedUser::new(vec![vec![user_text("hi")]]);
        let assistant = ScriptedAssistant::new(vec![vec![assistant_text("never reached")]]);

        let mut chat = BTreeMap::new();
        chat.insert("ghost".to_string(), "/nonexistent/mcp-xyz".to_string());
        let manager = Arc::new(McpManager::new(&chat, &BTreeMap::new()).unwrap());
        manager.start_loading();
        assert!(manager.wait_for_initial_load(Duration::from_secs(10)));

        let printer = NotificationsPrinter::uncolored();
        let file_ops = FileOperationsHandler::new(printer.clone())
            .with_backup_dir(dir.path().join("backups"));
        let orch = ConversationOrchestrator::new(user, assistant, manager, printer, file_ops)
            .with_mcp_error_prompt(Box::new(|_| false));

        let err = orch.run_cycle().unwrap_err();
        assert!(err.to_string().contains("MCP"));
    }
}
