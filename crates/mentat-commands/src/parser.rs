// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use regex::Regex;

use crate::{Command, CommandArgs, CommandRegistry};

/// Outcome of parsing one command block.
///
/// `command_name` is `None` when the block named a command that is not in
/// the registry.  A result with a `None` name or a non-empty error list is
/// never executed by dispatchers; [`ParseResult::is_executable`] encodes
/// that rule.
#[derive(Debug, Clone)]
pub struct ParseResult {
    pub command_name: Option<String>,
    pub args: CommandArgs,
    pub errors: Vec<String>,
    /// 0-based line index of the `<<<` line within the parsed text.
    pub block_start_line: Option<usize>,
}

impl ParseResult {
    pub fn is_executable(&self) -> bool {
        self.command_name.is_some() && self.errors.is_empty()
    }
}

/// Extracts block-form commands from free-form text.
///
/// The parser is deliberately lenient about everything outside command
/// blocks — LLM output interleaves prose and commands — while reporting
/// precise, per-block errors for everything inside them.
pub struct CommandParser {
    block_open: Regex,
}

impl CommandParser {
    pub fn new() -> Self {
        Self {
            // Stripped line form: `<<< command_name`
            block_open: Regex::new(r"^<<<\s+(\S+)\s*$").unwrap(),
        }
    }

    /// Scan `text` and return one [`ParseResult`] per command block found,
    /// in document order.
    ///
    /// Structurally valid blocks whose command is registered are passed
    /// through the command's `transform_args` and `validate` hooks; any
    /// errors they return mark the result non-executable.
    pub fn parse<C>(&self, text: &str, registry: &CommandRegistry<C>) -> Vec<ParseResult> {
        let mut results = Vec::new();
        let mut block: Option<OpenBlock> = None;

        for (line_index, raw_line) in text.lines().enumerate() {
            // A `#` in column 1 disables any block syntax on the line; help
            // text uses this to show examples that must not execute.
            let commented = raw_line.starts_with('#');
            let stripped = raw_line.trim();

            if block.is_none() {
                if !commented {
                    if let Some(caps) = self.block_open.captures(stripped) {
                        block = Some(OpenBlock::new(caps[1].to_string(), line_index));
                    }
                }
                continue;
            }

            if !commented && stripped == ">>>" {
                if let Some(open) = block.take() {
                    results.push(open.finish(registry, false));
                }
            } else if !commented && raw_line.starts_with("///") {
                if let Some(open) = block.as_mut() {
                    open.begin_section(registry, raw_line[3..].trim().to_string());
                }
            } else if let Some(open) = block.as_mut() {
                open.push_content_line(raw_line);
            }
        }

        // EOF before `>>>`: report the partial block for diagnostics.
        if let Some(open) = block {
            results.push(open.finish(registry, true));
        }

        results
    }

    /// Aggregate the errors of `results` into a single human-readable report
    /// for the LLM to self-correct in its next turn, or `None` when every
    /// result is clean.
    pub fn error_report(&self, results: &[ParseResult]) -> Option<String> {
        let mut body = String::new();
        for result in results.iter().filter(|r| !r.errors.is_empty()) {
            let location = result
                .block_start_line
                .map(|l| format!(" (block starting at line {})", l + 1))
                .unwrap_or_default();
            match &result.command_name {
                Some(name) => body.push_str(&format!("Command '{name}'{location}:\n")),
                None => body.push_str(&format!("Command block{location}:\n")),
            }
            for error in &result.errors {
                body.push_str(&format!("  - {error}\n"));
            }
        }
        if body.is_empty() {
            return None;
        }
        Some(format!(
            "Your message contained command errors; none of the affected commands were executed.\n\
             {body}\
             Correct the commands and send them again in your next message."
        ))
    }
}

impl Default for CommandParser {
    fn default() -> Self {
        Self::new()
    }
}

struct OpenBlock {
    name: String,
    start_line: usize,
    args: CommandArgs,
    errors: Vec<String>,
    section: Option<(String, Vec<String>)>,
}

impl OpenBlock {
    fn new(name: String, start_line: usize) -> Self {
        Self {
            name,
            start_line,
            args: CommandArgs::new(),
            errors: Vec::new(),
            section: None,
        }
    }

    fn begin_section<C>(&mut self, registry: &CommandRegistry<C>, name: String) {
        self.commit_section(registry);
        self.section = Some((name, Vec::new()));
    }

    fn push_content_line(&mut self, line: &str) {
        // Text between the block opener and the first `///` marker carries
        // no section and is dropped.
        if let Some((_, lines)) = self.section.as_mut() {
            lines.push(line.to_string());
        }
    }

    fn commit_section<C>(&mut self, registry: &CommandRegistry<C>) {
        let Some((name, lines)) = self.section.take() else {
            return;
        };
        // Joining on '\n' trims exactly the trailing newline before the next
        // marker, preserving interior blank lines.
        let value = lines.join("\n");
        if self.args.contains(&name) && !self.section_allows_multiple(registry, &name) {
            self.errors.push(format!("section {name} specified multiple times"));
            return;
        }
        self.args.push(name, value);
    }

    fn section_allows_multiple<C>(&self, registry: &CommandRegistry<C>, section: &str) -> bool {
        match registry.get(&self.name) {
            Some(cmd) => cmd
                .sections()
                .iter()
                .any(|s| s.name == section && s.allow_multiple),
            // Unknown command: the unknown-command error dominates, so
            // accumulate values rather than adding duplicate noise.
            None => true,
        }
    }

    fn finish<C>(mut self, registry: &CommandRegistry<C>, unterminated: bool) -> ParseResult {
        self.commit_section(registry);
        if unterminated {
            self.errors.push("unterminated block".to_string());
        }

        match registry.get(&self.name) {
            Some(cmd) => {
                let args = if unterminated {
                    // Keep partial args untransformed for diagnostics.
                    self.args
                } else {
                    let args = cmd.transform_args(self.args);
                    self.errors.extend(cmd.validate(&args));
                    args
                };
                ParseResult {
                    command_name: Some(self.name),
                    args,
                    errors: self.errors,
                    block_start_line: Some(self.start_line),
                }
            }
            None => {
                self.errors.insert(0, format!("unknown command: {}", self.name));
                ParseResult {
                    command_name: None,
                    args: self.args,
                    errors: self.errors,
                    block_start_line: Some(self.start_line),
                }
            }
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
