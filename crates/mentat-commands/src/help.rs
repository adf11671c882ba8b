// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use crate::Command;

/// Render the usage documentation for one command.
///
/// The skeleton is shown with the `#` example prefix so the rendered help
/// can be embedded verbatim in an assistant prompt without the parser
/// picking it up as a real command.
pub fn render_command_help<C>(command: &dyn Command<C>) -> String {
    let mut out = String::new();
    out.push_str(&format!("### {}\n", command.name()));
    out.push_str(command.help_text());
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("\nUsage:\n");
    out.push_str(&format!("#<<< {}\n", command.name()));
    for section in command.sections() {
        let mut qualifiers = Vec::new();
        if !section.required {
            qualifiers.push("optional");
        }
        if section.allow_multiple {
            qualifiers.push("repeatable");
        }
        let qualifier = if qualifiers.is_empty() {
            String::new()
        } else {
            format!(" ({})", qualifiers.join(", "))
        };
        out.push_str(&format!("#///{}{}\n", section.name, qualifier));
        if section.help_text.is_empty() {
            out.push_str(&format!("#<{} value>\n", section.name));
        } else {
            out.push_str(&format!("#{}\n", section.help_text));
        }
    }
    out.push_str("#>>>\n");
    out
}

/// Render the documentation for a whole command set, in the given order.
pub fn render_commands_help<C>(commands: &[std::sync::Arc<dyn Command<C>>]) -> String {
    commands
        .iter()
        .map(|c| render_command_help(c.as_ref()))
        .collect::<Vec<_>>()
        .join("\n")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
