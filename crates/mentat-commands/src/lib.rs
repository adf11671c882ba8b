// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! `mentat-commands` — the embedded command language both conversation
//! participants speak.
//!
//! Commands are free-form text blocks delimited by `<<< name` and `>>>`,
//! with `///section` markers separating named arguments:
//!
//! ```text
//! <<< create_file
//! ///path
//! notes/today.md
//! ///content
//! Remember to water the plants.
//! >>>
//! ```
//!
//! The crate provides the structural model ([`Command`], [`CommandSection`],
//! [`CommandRegistry`]), the lenient [`CommandParser`] that extracts blocks
//! from LLM- or user-produced text, and a help generator that renders the
//! registered commands into prompt documentation.
//!
//! Registries are plain values owned by whichever control panel hosts them;
//! there is no process-wide registry.

mod command;
mod help;
mod parser;

pub use command::{Command, CommandArgs, CommandRegistry, CommandSection};
pub use help::{render_command_help, render_commands_help};
pub use parser::{CommandParser, ParseResult};
