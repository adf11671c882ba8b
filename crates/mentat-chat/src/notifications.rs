// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::io::IsTerminal;

use crossterm::style::Stylize;

/// Coloured out-of-band notifications on the conversation terminal.
///
/// Message content is printed by the user interface; this printer exists
/// for everything around it — engine command confirmations, MCP status,
/// warnings.  Colour is dropped automatically when stdout is not a tty.
#[derive(Debug, Clone)]
pub struct NotificationsPrinter {
    use_color: bool,
}

impl NotificationsPrinter {
    pub fn new() -> Self {
        Self {
            use_color: std::io::stdout().is_terminal(),
        }
    }

    /// Plain printer for tests and piped output.
    pub fn uncolored() -> Self {
        Self { use_color: false }
    }

    pub fn notify(&self, text: &str) {
        if self.use_color {
            println!("{}", text.to_string().cyan());
        } else {
            println!("{text}");
        }
    }

    pub fn warn(&self, text: &str) {
        if self.use_color {
            println!("{}", text.to_string().yellow());
        } else {
            println!("{text}");
        }
    }

    pub fn error(&self, text: &str) {
        if self.use_color {
            eprintln!("{}", text.to_string().red());
        } else {
            eprintln!("{text}");
        }
    }
}

impl Default for NotificationsPrinter {
    fn default() -> Self {
        Self::new()
    }
}
