// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::path::PathBuf;

/// Options shared by the conversation modes.
#[derive(Args, Debug)]
pub struct CommonOpts {
    /// Model to use, e.g. "openai/gpt-4o" or "anthropic/claude-opus-4-5".
    /// Defaults to the configured model.
    #[arg(long, short = 'm')]
    pub model: Option<String>,

    /// Print assistant output as plain text (no markdown-aware rendering).
    #[arg(long)]
    pub no_markdown: bool,

    /// Use speech-to-text for input where a backend is configured.
    #[arg(long)]
    pub stt: bool,

    /// Verbose logging to stderr.
    #[arg(long, short = 'v')]
    pub verbose: bool,

    /// Debug logging to stderr (implies --verbose).
    #[arg(long)]
    pub debug: bool,

    /// Explicit config file path (merged over the discovered config layers).
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Interactive conversation with the assistant (the default).
    Chat {
        #[command(flatten)]
        common: CommonOpts,
    },

    /// Conversation with agent mode enabled from the first cycle: the
    /// assistant keeps taking turns until it runs its done command.
    SimpleAgent {
        #[command(flatten)]
        common: CommonOpts,
    },

    /// Research session: agent mode plus the deep-research MCP server set.
    Research {
        /// Research workspace, `repo` or `repo:name`.
        research_repo: Option<String>,

        #[command(flatten)]
        common: CommonOpts,
    },

    /// Inspection utilities.
    Utils {
        #[command(subcommand)]
        command: UtilsCommands,
    },

    /// Show version, config locations, and MCP server configuration.
    Info {
        /// Explicit config file path.
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },

    /// Generate shell completions.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum UtilsCommands {
    /// Print the effective merged configuration as JSON.
    ShowConfig {
        /// Explicit config file path.
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },
    /// List the assistant's and the user's built-in commands.
    ListCommands,
}

#[derive(Parser, Debug)]
#[command(
    name = "mentat",
    about = "An interactive CLI assistant that converses with LLM backends",
    version,
    long_about = None,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Options for the default chat mode.
    #[command(flatten)]
    pub common: CommonOpts,
}

pub fn print_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut std::io::stdout());
}
