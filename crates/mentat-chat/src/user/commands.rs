// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use mentat_commands::{Command, CommandArgs, CommandSection};
use mentat_model::ThinkingLevel;

use crate::events::{EngineCommand, Event};
use crate::messages::{Author, Message, MessageKind};

/// Events produced while running one user command, plus the command list
/// for `/help`.
pub struct UserCommandContext {
    events: Vec<Event>,
    command_names: Vec<String>,
}

impl UserCommandContext {
    pub fn new(command_names: Vec<String>) -> Self {
        Self {
            events: Vec::new(),
            command_names,
        }
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }
}

type RunFn = fn(&mut UserCommandContext, &CommandArgs) -> anyhow::Result<()>;

/// One `/name args` line command.  The whole user command set shares this
/// shape, so the definitions below stay table-like.
pub struct UserCommand {
    name: &'static str,
    help: &'static str,
    sections: Vec<CommandSection>,
    run: RunFn,
}

impl Command<UserCommandContext> for UserCommand {
    fn name(&self) -> &str {
        self.name
    }
    fn help_text(&self) -> &str {
        self.help
    }
    fn sections(&self) -> &[CommandSection] {
        &self.sections
    }
    fn execute(&self, ctx: &mut UserCommandContext, args: CommandArgs) -> anyhow::Result<()> {
        (self.run)(ctx, &args)
    }
}

fn arg(args: &CommandArgs, section: &str) -> Option<String> {
    args.get(section).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_toggle(args: &CommandArgs, section: &str) -> anyhow::Result<bool> {
    match arg(args, section).as_deref() {
        None => Ok(true),
        Some("on") | Some("true") | Some("yes") | Some("1") => Ok(true),
        Some("off") | Some("false") | Some("no") | Some("0") => Ok(false),
        Some(other) => anyhow::bail!("expected on/off, got: {other}"),
    }
}

fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw.trim()).into_owned())
}

fn push_engine(ctx: &mut UserCommandContext, command: EngineCommand) {
    ctx.events.push(Event::EngineCommand(command));
}

fn push_attachment(ctx: &mut UserCommandContext, kind: MessageKind) {
    ctx.events.push(Event::Message(Message::new(Author::User, kind)));
}

/// The built-in `/` command set, in help order.
pub fn builtin_user_commands() -> Vec<UserCommand> {
    vec![
        UserCommand {
            name: "clear",
            help: "Clear the conversation history.",
            sections: vec![],
            run: |ctx, _| {
                push_engine(ctx, EngineCommand::ClearHistory);
                Ok(())
            },
        },
        UserCommand {
            name: "exit",
            help: "End the conversation.",
            sections: vec![],
            run: |ctx, _| {
                push_engine(ctx, EngineCommand::Exit);
                Ok(())
            },
        },
        UserCommand {
            name: "save_history",
            help: "Save the conversation to a JSON file (timestamped default when no path is given).",
            sections: vec![CommandSection::new("path", false, "Target file path.")],
            run: |ctx, args| {
                let path = arg(args, "path").map(|p| expand_path(&p));
                push_engine(ctx, EngineCommand::SaveHistory(path));
                Ok(())
            },
        },
        UserCommand {
            name: "load_history",
            help: "Replace the conversation with one loaded from a JSON file.",
            sections: vec![CommandSection::new("path", true, "File to load.")],
            run: |ctx, args| {
                let path = arg(args, "path").map(|p| expand_path(&p));
                match path {
                    Some(path) => {
                        push_engine(ctx, EngineCommand::LoadHistory(path));
                        Ok(())
                    }
                    None => anyhow::bail!("a path is required"),
                }
            },
        },
        UserCommand {
            name: "agent_mode",
            help: "Toggle agent mode: the assistant keeps taking turns until it runs its done command.",
            sections: vec![CommandSection::new("enabled", false, "on (default) or off.")],
            run: |ctx, args| {
                push_engine(ctx, EngineCommand::AgentMode(parse_toggle(args, "enabled")?));
                Ok(())
            },
        },
        UserCommand {
            name: "once",
            help: "Exit after the current cycle completes.",
            sections: vec![CommandSection::new("enabled", false, "on (default) or off.")],
            run: |ctx, args| {
                push_engine(ctx, EngineCommand::Once(parse_toggle(args, "enabled")?));
                Ok(())
            },
        },
        UserCommand {
            name: "llm_commands",
            help: "Toggle whether commands in the assistant's output are parsed and executed.",
            sections: vec![CommandSection::new("enabled", false, "on (default) or off.")],
            run: |ctx, args| {
                push_engine(
                    ctx,
                    EngineCommand::LlmCommandsExecution(parse_toggle(args, "enabled")?),
                );
                Ok(())
            },
        },
        UserCommand {
            name: "thinking_level",
            help: "Set the model's reasoning effort: off, low, medium or high.",
            sections: vec![CommandSection::new("level", true, "off | low | medium | high")],
            run: |ctx, args| {
                let level: ThinkingLevel = arg(args, "level")
                    .ok_or_else(|| anyhow::anyhow!("a level is required"))?
                    .parse()?;
                push_engine(ctx, EngineCommand::ThinkingLevel(level));
                Ok(())
            },
        },
        UserCommand {
            name: "budget",
            help: "Set the deep-research message-cycle budget.",
            sections: vec![CommandSection::new("cycles", true, "Number of message cycles.")],
            run: |ctx, args| {
                let cycles: u32 = arg(args, "cycles")
                    .ok_or_else(|| anyhow::anyhow!("a cycle count is required"))?
                    .parse()
                    .map_err(|_| anyhow::anyhow!("the budget must be a number"))?;
                push_engine(ctx, EngineCommand::DeepResearchBudget(cycles));
                Ok(())
            },
        },
        UserCommand {
            name: "file",
            help: "Attach a text file to your next message.",
            sections: vec![CommandSection::new("path", true, "File to attach.")],
            run: |ctx, args| {
                let path = required_existing_file(args)?;
                push_attachment(
                    ctx,
                    MessageKind::TextualFile {
                        path: Some(path),
                        content: None,
                        name: None,
                    },
                );
                Ok(())
            },
        },
        UserCommand {
            name: "image",
            help: "Attach an image by path.",
            sections: vec![CommandSection::new("path", true, "Image file.")],
            run: |ctx, args| {
                let path = required_existing_file(args)?;
                push_attachment(ctx, MessageKind::Image { path });
                Ok(())
            },
        },
        UserCommand {
            name: "image_url",
            help: "Attach an image by URL.",
            sections: vec![CommandSection::new("url", true, "Image URL.")],
            run: |ctx, args| {
                let url = arg(args, "url").ok_or_else(|| anyhow::anyhow!("a URL is required"))?;
                push_attachment(ctx, MessageKind::ImageUrl { url });
                Ok(())
            },
        },
        UserCommand {
            name: "audio",
            help: "Attach an audio file.",
            sections: vec![CommandSection::new("path", true, "Audio file.")],
            run: |ctx, args| {
                let path = required_existing_file(args)?;
                push_attachment(ctx, MessageKind::Audio { path });
                Ok(())
            },
        },
        UserCommand {
            name: "video",
            help: "Attach a video file.",
            sections: vec![CommandSection::new("path", true, "Video file.")],
            run: |ctx, args| {
                let path = required_existing_file(args)?;
                push_attachment(ctx, MessageKind::Video { path });
                Ok(())
            },
        },
        UserCommand {
            name: "pdf",
            help: "Attach a PDF, optionally restricted to pages: /pdf report.pdf 1,3,5",
            sections: vec![CommandSection::new(
                "path",
                true,
                "PDF path, optionally followed by a comma-separated page list.",
            )],
            run: |ctx, args| {
                let raw = arg(args, "path").ok_or_else(|| anyhow::anyhow!("a path is required"))?;
                let (path_part, pages) = match raw.rsplit_once(char::is_whitespace) {
                    Some((path, spec)) if looks_like_page_list(spec) => {
                        (path.to_string(), Some(parse_page_list(spec)?))
                    }
                    _ => (raw, None),
                };
                let path = expand_path(&path_part);
                anyhow::ensure!(path.is_file(), "no such file: {}", path.display());
                push_attachment(ctx, MessageKind::EmbeddedPdf { path, pages });
                Ok(())
            },
        },
        UserCommand {
            name: "url",
            help: "Share a URL with the assistant.",
            sections: vec![CommandSection::new("url", true, "The URL.")],
            run: |ctx, args| {
                let url = arg(args, "url").ok_or_else(|| anyhow::anyhow!("a URL is required"))?;
                push_attachment(ctx, MessageKind::Url { url });
                Ok(())
            },
        },
        UserCommand {
            name: "help",
            help: "List the available commands.",
            sections: vec![],
            run: |ctx, _| {
                let listing = format!(
                    "Available commands: {}",
                    ctx.command_names
                        .iter()
                        .map(|n| format!("/{n}"))
                        .collect::<Vec<_>>()
                        .join(", ")
                );
                ctx.events.push(Event::Notification(listing));
                Ok(())
            },
        },
    ]
}

fn required_existing_file(args: &CommandArgs) -> anyhow::Result<PathBuf> {
    let raw = arg(args, "path").ok_or_else(|| anyhow::anyhow!("a path is required"))?;
    let path = expand_path(&raw);
    anyhow::ensure!(path.is_file(), "no such file: {}", path.display());
    Ok(path)
}

fn looks_like_page_list(spec: &str) -> bool {
    !spec.is_empty() && spec.chars().all(|c| c.is_ascii_digit() || c == ',')
}

fn parse_page_list(spec: &str) -> anyhow::Result<Vec<u32>> {
    spec.split(',')
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse()
                .map_err(|_| anyhow::anyhow!("bad page number: {part}"))
        })
        .collect()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
