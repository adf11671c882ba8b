// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use mentat_commands::{Command, CommandArgs, CommandSection};
use mentat_mcp::McpCommandHost;

use crate::events::{EngineCommand, Event, FileEditMode, FileEditRequest};
use crate::markdown::MarkdownEditMode;
use crate::messages::{Author, Message, MessageKind};

/// Capability bundle assistant commands execute against.  Commands do not
/// touch the world directly; they queue events the orchestrator acts on.
pub struct ChatCommandContext {
    events: Vec<Event>,
}

impl ChatCommandContext {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn push_event(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }
}

impl Default for ChatCommandContext {
    fn default() -> Self {
        Self::new()
    }
}

impl McpCommandHost for ChatCommandContext {
    fn notify(&mut self, text: &str) {
        self.events.push(Event::Notification(text.to_string()));
    }

    fn add_command_output(&mut self, command: &str, output: &str) {
        self.events
            .push(Event::Message(Message::command_output(command, output)));
    }
}

fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw.trim()).into_owned())
}

/// Trim and tilde-expand the `path` section in place.
fn normalize_path_arg(mut args: CommandArgs) -> CommandArgs {
    if let Some(path) = args.get("path") {
        let expanded = expand_path(path).display().to_string();
        args.set("path", expanded);
    }
    args
}

// ── done ──────────────────────────────────────────────────────────────────────

/// Ends the assistant's agent-mode run for this cycle.
pub struct DoneCommand {
    sections: Vec<CommandSection>,
}

impl DoneCommand {
    pub fn new() -> Self {
        Self {
            sections: vec![CommandSection::new(
                "report",
                false,
                "Final report shown to the user.",
            )],
        }
    }
}

impl Command<ChatCommandContext> for DoneCommand {
    fn name(&self) -> &str {
        "done"
    }
    fn help_text(&self) -> &str {
        "Marks the whole task as finished. Use it once, when everything is done; \
         include a final report of the outcome."
    }
    fn sections(&self) -> &[CommandSection] {
        &self.sections
    }
    fn execute(&self, ctx: &mut ChatCommandContext, args: CommandArgs) -> anyhow::Result<()> {
        if let Some(report) = args.get("report") {
            if !report.trim().is_empty() {
                ctx.push_event(Event::Message(Message::text(Author::Assistant, report)));
            }
        }
        ctx.push_event(Event::EngineCommand(EngineCommand::AssistantDone));
        Ok(())
    }
}

// ── file editing ──────────────────────────────────────────────────────────────

macro_rules! file_edit_command {
    ($name:ident, $command_name:literal, $mode:expr, $help:literal) => {
        pub struct $name {
            sections: Vec<CommandSection>,
        }

        impl $name {
            pub fn new() -> Self {
                Self {
                    sections: vec![
                        CommandSection::new("path", true, "Target file path."),
                        CommandSection::new("content", true, "Content to write."),
                    ],
                }
            }
        }

        impl Command<ChatCommandContext> for $name {
            fn name(&self) -> &str {
                $command_name
            }
            fn help_text(&self) -> &str {
                $help
            }
            fn sections(&self) -> &[CommandSection] {
                &self.sections
            }
            fn transform_args(&self, args: CommandArgs) -> CommandArgs {
                normalize_path_arg(args)
            }
            fn execute(
                &self,
                ctx: &mut ChatCommandContext,
                args: CommandArgs,
            ) -> anyhow::Result<()> {
                let path = args.get("path").unwrap_or_default();
                let content = args.get("content").unwrap_or_default();
                ctx.push_event(Event::EngineCommand(EngineCommand::FileEdit(
                    FileEditRequest {
                        path: PathBuf::from(path),
                        content: content.to_string(),
                        mode: $mode,
                    },
                )));
                Ok(())
            }
        }
    };
}

file_edit_command!(
    CreateFileCommand,
    "create_file",
    FileEditMode::Create,
    "Creates a file with the given content. Asks the user before overwriting an existing file."
);
file_edit_command!(
    AppendFileCommand,
    "append_file",
    FileEditMode::Append,
    "Appends the given content to a file, creating it when missing."
);
file_edit_command!(
    PrependFileCommand,
    "prepend_file",
    FileEditMode::Prepend,
    "Prepends the given content to a file, creating it when missing."
);

// ── markdown section editing ──────────────────────────────────────────────────

fn markdown_sections() -> Vec<CommandSection> {
    vec![
        CommandSection::new("path", true, "Markdown file path."),
        CommandSection::new(
            "section_path",
            true,
            "Header titles separated by ' > ', e.g. 'Chapter 1 > 1.1'. \
             Append '__preface' to target the text before the first child header.",
        ),
        CommandSection::new("content", true, "New section content."),
    ]
}

fn parse_section_path(raw: &str) -> Vec<String> {
    raw.split('>')
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect()
}

macro_rules! markdown_section_command {
    ($name:ident, $command_name:literal, $submode:expr, $help:literal) => {
        pub struct $name {
            sections: Vec<CommandSection>,
        }

        impl $name {
            pub fn new() -> Self {
                Self {
                    sections: markdown_sections(),
                }
            }
        }

        impl Command<ChatCommandContext> for $name {
            fn name(&self) -> &str {
                $command_name
            }
            fn help_text(&self) -> &str {
                $help
            }
            fn sections(&self) -> &[CommandSection] {
                &self.sections
            }
            fn transform_args(&self, args: CommandArgs) -> CommandArgs {
                normalize_path_arg(args)
            }
            fn validate(&self, args: &CommandArgs) -> Vec<String> {
                let mut errors: Vec<String> = self
                    .sections
                    .iter()
                    .filter(|s| s.required && !args.contains(&s.name))
                    .map(|s| format!("missing required section: {}", s.name))
                    .collect();
                if let Some(raw) = args.get("section_path") {
                    if parse_section_path(raw).is_empty() {
                        errors.push("section_path names no sections".to_string());
                    }
                }
                errors
            }
            fn execute(
                &self,
                ctx: &mut ChatCommandContext,
                args: CommandArgs,
            ) -> anyhow::Result<()> {
                let path = args.get("path").unwrap_or_default();
                let content = args.get("content").unwrap_or_default();
                let section_path = parse_section_path(args.get("section_path").unwrap_or_default());
                ctx.push_event(Event::EngineCommand(EngineCommand::FileEdit(
                    FileEditRequest {
                        path: PathBuf::from(path),
                        content: content.to_string(),
                        mode: FileEditMode::UpdateMarkdownSection {
                            section_path,
                            submode: $submode,
                        },
                    },
                )));
                Ok(())
            }
        }
    };
}

markdown_section_command!(
    MarkdownUpdateSectionCommand,
    "markdown_update_section",
    MarkdownEditMode::Update,
    "Replaces one section of a markdown document, addressed by its header path."
);
markdown_section_command!(
    MarkdownAppendSectionCommand,
    "markdown_append_section",
    MarkdownEditMode::Append,
    "Appends content at the end of one section of a markdown document."
);

// ── open_file ─────────────────────────────────────────────────────────────────

/// Pulls a text file into the conversation so the assistant can read it on
/// its next turn.
pub struct OpenFileCommand {
    sections: Vec<CommandSection>,
}

impl OpenFileCommand {
    pub fn new() -> Self {
        Self {
            sections: vec![CommandSection::new("path", true, "File path to read.")],
        }
    }
}

impl Command<ChatCommandContext> for OpenFileCommand {
    fn name(&self) -> &str {
        "open_file"
    }
    fn help_text(&self) -> &str {
        "Reads a text file from disk; its content is delivered with the next turn."
    }
    fn sections(&self) -> &[CommandSection] {
        &self.sections
    }
    fn transform_args(&self, args: CommandArgs) -> CommandArgs {
        normalize_path_arg(args)
    }
    fn execute(&self, ctx: &mut ChatCommandContext, args: CommandArgs) -> anyhow::Result<()> {
        let path = expand_path(args.get("path").unwrap_or_default());
        anyhow::ensure!(path.is_file(), "no such file: {}", path.display());
        ctx.push_event(Event::Message(Message::new(
            Author::User,
            MessageKind::TextualFile {
                path: Some(path.clone()),
                content: None,
                name: None,
            },
        )));
        ctx.push_event(Event::Notification(format!("Opened {}", path.display())));
        Ok(())
    }
}

// ── tree ──────────────────────────────────────────────────────────────────────

const TREE_DEFAULT_DEPTH: usize = 3;

/// Directory listing for orientation before file edits.
pub struct TreeCommand {
    sections: Vec<CommandSection>,
}

impl TreeCommand {
    pub fn new() -> Self {
        Self {
            sections: vec![
                CommandSection::new("path", false, "Directory to list; defaults to the working directory."),
                CommandSection::new("depth", false, "Maximum depth, default 3."),
            ],
        }
    }
}

impl Command<ChatCommandContext> for TreeCommand {
    fn name(&self) -> &str {
        "tree"
    }
    fn help_text(&self) -> &str {
        "Lists a directory tree; the listing is delivered with the next turn."
    }
    fn sections(&self) -> &[CommandSection] {
        &self.sections
    }
    fn transform_args(&self, args: CommandArgs) -> CommandArgs {
        normalize_path_arg(args)
    }
    fn validate(&self, args: &CommandArgs) -> Vec<String> {
        let mut errors = Vec::new();
        if let Some(depth) = args.get("depth") {
            if depth.trim().parse::<usize>().is_err() {
                errors.push(format!("depth must be a number, got: {depth}"));
            }
        }
        errors
    }
    fn execute(&self, ctx: &mut ChatCommandContext, args: CommandArgs) -> anyhow::Result<()> {
        let root = args
            .get("path")
            .map(expand_path)
            .unwrap_or_else(|| PathBuf::from("."));
        let depth = args
            .get("depth")
            .and_then(|d| d.trim().parse().ok())
            .unwrap_or(TREE_DEFAULT_DEPTH);
        anyhow::ensure!(root.is_dir(), "no such directory: {}", root.display());

        let mut listing = format!("{}\n", root.display());
        for entry in walkdir::WalkDir::new(&root)
            .min_depth(1)
            .max_depth(depth)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
        {
            let indent = "  ".repeat(entry.depth());
            let suffix = if entry.file_type().is_dir() { "/" } else { "" };
            listing.push_str(&format!(
                "{indent}{}{suffix}\n",
                entry.file_name().to_string_lossy()
            ));
        }
        ctx.push_event(Event::Message(Message::command_output("tree", listing)));
        Ok(())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
