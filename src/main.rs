// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands, CommonOpts, UtilsCommands};
use mentat_chat::user::builtin_user_commands;
use mentat_chat::{
    interrupt, AssistantParticipant, ConversationOrchestrator, FileOperationsHandler,
    LlmControlPanel, NotificationsPrinter, UserParticipant,
};
use mentat_commands::Command;
use mentat_config::Config;
use mentat_mcp::{McpManager, McpMode};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Completions { shell }) => {
            cli::print_completions(shell);
            Ok(())
        }
        Some(Commands::Utils { command }) => run_utils(command),
        Some(Commands::Info { config }) => {
            init_logging(false, false);
            let config = mentat_config::load(config.as_deref())?;
            print_info(&config);
            Ok(())
        }
        Some(Commands::Chat { common }) => run_conversation(common, ConversationFlavor::Chat),
        Some(Commands::SimpleAgent { common }) => {
            run_conversation(common, ConversationFlavor::SimpleAgent)
        }
        Some(Commands::Research {
            research_repo,
            common,
        }) => run_conversation(common, ConversationFlavor::Research { research_repo }),
        None => {
            let common = cli.common;
            run_conversation(common, ConversationFlavor::Chat)
        }
    }
}

enum ConversationFlavor {
    Chat,
    SimpleAgent,
    Research { research_repo: Option<String> },
}

fn run_conversation(common: CommonOpts, flavor: ConversationFlavor) -> anyhow::Result<()> {
    init_logging(common.verbose, common.debug);
    interrupt::install_sigint_handler();

    let config = mentat_config::load(common.config.as_deref())?;
    let printer = NotificationsPrinter::new();

    let model = common.model.as_deref().unwrap_or(&config.model);
    let provider = mentat_model::resolve(model)
        .with_context(|| format!("resolving model '{model}'"))?;

    if common.stt {
        printer.warn("No speech-to-text backend is configured; using keyboard input.");
    }

    let manager = Arc::new(McpManager::new(&config.mcp.chat, &config.mcp.deep_research)?);
    manager.start_loading();

    let panel = LlmControlPanel::new(config.llm_commands.clone());
    let (agent_mode, mcp_mode) = match &flavor {
        ConversationFlavor::Chat => (false, McpMode::Chat),
        ConversationFlavor::SimpleAgent => (true, McpMode::Chat),
        ConversationFlavor::Research { research_repo } => {
            if let Some(repo) = research_repo {
                printer.notify(&format!("Research workspace: {repo}"));
            }
            (true, McpMode::DeepResearch)
        }
    };
    panel.set_agent_mode(agent_mode);

    let assistant = AssistantParticipant::new(provider, panel).with_mcp_mode(mcp_mode);
    let user = UserParticipant::new(printer.clone()).plain_output(common.no_markdown);

    let orchestrator = ConversationOrchestrator::new(
        Arc::new(user),
        Arc::new(assistant),
        Arc::clone(&manager),
        printer.clone(),
        FileOperationsHandler::new(printer.clone()),
    );

    let result = orchestrator.run();
    manager.stop_all();
    result
}

fn run_utils(command: UtilsCommands) -> anyhow::Result<()> {
    init_logging(false, false);
    match command {
        UtilsCommands::ShowConfig { config } => {
            let config = mentat_config::load(config.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        UtilsCommands::ListCommands => {
            let panel = LlmControlPanel::new(Default::default());
            println!("Assistant commands:");
            for name in panel.command_names() {
                println!("  {name}");
            }
            println!("User commands:");
            for command in builtin_user_commands() {
                println!("  /{}", command.name());
            }
        }
    }
    Ok(())
}

fn print_info(config: &Config) {
    println!("mentat {}", env!("CARGO_PKG_VERSION"));
    println!("model: {}", config.model);
    if let Some(dir) = dirs::config_dir() {
        println!("config dir: {}", dir.join("mentat").display());
    }
    println!("chat MCP servers: {}", config.mcp.chat.len());
    for (name, command) in &config.mcp.chat {
        println!("  {name}: {command}");
    }
    println!("deep-research MCP servers: {}", config.mcp.deep_research.len());
    for (name, command) in &config.mcp.deep_research {
        println!("  {name}: {command}");
    }
}

/// Logging goes to stderr so stdout stays a clean conversation surface.
/// Quiet by default; RUST_LOG overrides the verbosity flags.
fn init_logging(verbose: bool, debug: bool) {
    let default_filter = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}
