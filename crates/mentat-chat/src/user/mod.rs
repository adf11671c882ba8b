// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! The human side of the conversation: a terminal line reader, a `/command`
//! control panel, and plain-text rendering of assistant output.

mod commands;

pub use commands::{builtin_user_commands, UserCommand, UserCommandContext};

use std::io::{BufRead, Write};
use std::sync::Mutex;

use anyhow::Context;
use tracing::{debug, warn};

use mentat_commands::{CommandArgs, CommandRegistry};

use crate::events::Event;
use crate::history::History;
use crate::interrupt;
use crate::messages::{Author, Message, UserContent};
use crate::notifications::NotificationsPrinter;
use crate::participant::{EventStream, Participant};
use crate::signal::Signal;

/// Registry and dispatcher for `/name args` line commands.
///
/// Line commands ride the same [`mentat_commands::Command`] model as the
/// assistant's block commands; the rest of the line lands in the command's
/// first section.
pub struct UserControlPanel {
    registry: CommandRegistry<UserCommandContext>,
    printer: NotificationsPrinter,
}

impl UserControlPanel {
    pub fn new(printer: NotificationsPrinter) -> Self {
        let mut registry = CommandRegistry::new();
        for command in builtin_user_commands() {
            registry.register(command);
        }
        Self { registry, printer }
    }

    pub fn command_names(&self) -> Vec<String> {
        self.registry.names()
    }

    /// Execute one `/name args` line, returning the events it produced.
    pub fn execute_line(&self, line: &str) -> Vec<Event> {
        let stripped = line.trim().trim_start_matches('/');
        let (name, rest) = match stripped.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (stripped, ""),
        };

        let Some(command) = self.registry.get(name) else {
            self.printer.warn(&format!(
                "Unknown command: /{name} (try /help for the command list)"
            ));
            return Vec::new();
        };

        let mut args = CommandArgs::new();
        if !rest.is_empty() {
            if let Some(first) = command.sections().first() {
                args.push(first.name.clone(), rest);
            }
        }
        let args = command.transform_args(args);
        let errors = command.validate(&args);
        if !errors.is_empty() {
            for error in errors {
                self.printer.warn(&format!("/{name}: {error}"));
            }
            return Vec::new();
        }

        let mut ctx = UserCommandContext::new(self.command_names());
        if let Err(e) = command.execute(&mut ctx, args) {
            self.printer.error(&format!("/{name} failed: {e:#}"));
            return Vec::new();
        }
        ctx.into_events()
    }
}

/// The terminal participant.  Input defaults to stdin; tests inject any
/// `BufRead`.
pub struct UserParticipant {
    input: Mutex<Box<dyn BufRead + Send>>,
    panel: UserControlPanel,
    printer: NotificationsPrinter,
    /// Skip the bold author prefix (for piped output or `--no-markdown`).
    plain_output: bool,
}

impl UserParticipant {
    pub fn new(printer: NotificationsPrinter) -> Self {
        Self::with_input(printer, Box::new(std::io::BufReader::new(std::io::stdin())))
    }

    pub fn with_input(printer: NotificationsPrinter, input: Box<dyn BufRead + Send>) -> Self {
        Self {
            input: Mutex::new(input),
            panel: UserControlPanel::new(printer.clone()),
            printer,
            plain_output: false,
        }
    }

    pub fn plain_output(mut self, plain: bool) -> Self {
        self.plain_output = plain;
        self
    }

    fn prompt(&self) {
        print!("You: ");
        let _ = std::io::stdout().flush();
    }

    fn assistant_prefix(&self) -> String {
        if self.plain_output {
            "Assistant: ".to_string()
        } else {
            use crossterm::style::Stylize;
            format!("{}", "Assistant: ".bold())
        }
    }

    fn read_line(&self) -> anyhow::Result<Option<String>> {
        let mut line = String::new();
        let read = self.input.lock().unwrap().read_line(&mut line);
        match read {
            Ok(0) => Err(Signal::EndOfInput.into()),
            Ok(_) => {
                if interrupt::take_interrupt() {
                    return Err(Signal::Interrupted.into());
                }
                let line = line.trim();
                if line.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(line.to_string()))
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {
                interrupt::take_interrupt();
                Err(Signal::Interrupted.into())
            }
            Err(e) => Err(e).context("reading user input"),
        }
    }

    fn render_message(&self, message: &Message) -> anyhow::Result<()> {
        match message.content_for_user() {
            UserContent::Hidden => Ok(()),
            UserContent::Text(text) => {
                if message.author == Author::Assistant {
                    println!("{}{text}", self.assistant_prefix());
                } else {
                    println!("{text}");
                }
                Ok(())
            }
            UserContent::Stream(stream) => {
                print!("{}", self.assistant_prefix());
                let _ = std::io::stdout().flush();
                while let Some(chunk) = stream.next_chunk() {
                    if interrupt::take_interrupt() {
                        println!();
                        return Err(Signal::Interrupted.into());
                    }
                    print!("{chunk}");
                    let _ = std::io::stdout().flush();
                }
                println!();
                Ok(())
            }
        }
    }
}

impl Participant for UserParticipant {
    fn author(&self) -> Author {
        Author::User
    }

    fn consume_events_and_render(
        &self,
        events: &mut dyn Iterator<Item = anyhow::Result<Event>>,
    ) -> anyhow::Result<()> {
        for event in events {
            match event? {
                // The user watched the conversation happen live; snapshots
                // are only replayed after an explicit history load.
                Event::HistoryRecovery(messages) => {
                    debug!(count = messages.len(), "skipping history recovery render");
                }
                Event::Message(message) => self.render_message(&message)?,
                Event::Notification(text) => self.printer.notify(&text),
                Event::EngineCommand(cmd) => {
                    warn!("engine command reached the user renderer: {cmd:?}")
                }
            }
        }
        Ok(())
    }

    fn get_input_and_run_commands(&self) -> anyhow::Result<EventStream> {
        loop {
            self.prompt();
            let Some(line) = self.read_line()? else {
                continue;
            };
            let events = if line.starts_with('/') {
                let events = self.panel.execute_line(&line);
                if events.is_empty() {
                    // Unknown command or usage error; ask again.
                    continue;
                }
                events
            } else {
                vec![Event::Message(Message::directly_entered(Author::User, line))]
            };
            return Ok(Box::new(events.into_iter().map(Ok)));
        }
    }

    fn clear(&self) {}

    fn initialize_from_history(&self, history: &History) {
        let messages = history.get_history_for(Author::User);
        if messages.is_empty() {
            return;
        }
        self.printer
            .notify(&format!("Restored {} messages:", messages.len()));
        for message in &messages {
            if self.render_message(message).is_err() {
                break;
            }
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
