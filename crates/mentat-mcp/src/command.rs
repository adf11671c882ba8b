// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::marker::PhantomData;
use std::sync::Arc;

use anyhow::Context;
use serde_json::{Map, Value};
use tracing::debug;

use mentat_commands::{Command, CommandArgs, CommandSection};

use crate::{McpClient, McpMode, McpToolSchema};

/// Section name used when a tool's input schema is too structured to map
/// onto flat sections.
pub const DATA_JSON_SECTION: &str = "data_json";

/// Capability surface an MCP tool command needs from its host context.
///
/// The chat control panel and the deep-research context each implement
/// this; the command routes its output through one method or the other
/// depending on the mode it was synthesised for.
pub trait McpCommandHost {
    /// Print a transient notification to the user.
    fn notify(&mut self, text: &str);
    /// Record a command output for the assistant's next turn.
    fn add_command_output(&mut self, command: &str, output: &str);
}

/// A command synthesised from one discovered MCP tool.
///
/// Sections are derived from the tool's JSON input schema: scalar
/// properties become individual sections; if any property is an object or
/// an array the whole argument surface collapses to a single `data_json`
/// section instead — nested structures are not decomposed.
pub struct McpToolCommand<C> {
    name: String,
    help_text: String,
    sections: Vec<CommandSection>,
    client: Arc<McpClient>,
    handle: tokio::runtime::Handle,
    mode: McpMode,
    _host: PhantomData<fn(&mut C)>,
}

impl<C> McpToolCommand<C> {
    pub fn from_schema(
        client: Arc<McpClient>,
        handle: tokio::runtime::Handle,
        mode: McpMode,
        schema: &McpToolSchema,
    ) -> Self {
        Self {
            name: schema.name.clone(),
            help_text: format!("MCP tool: {}\n\n{}", schema.name, schema.description),
            sections: sections_from_input_schema(&schema.input_schema),
            client,
            handle,
            mode,
            _host: PhantomData,
        }
    }

    /// Assemble the `arguments` object for `tools/call`: the optional
    /// `data_json` blob first, then individual scalar sections spliced over
    /// it so they win on conflict.
    fn tool_arguments(&self, args: &CommandArgs) -> anyhow::Result<Value> {
        let mut merged = Map::new();
        if let Some(blob) = args.get(DATA_JSON_SECTION) {
            let parsed: Value = serde_json::from_str(blob)
                .with_context(|| format!("invalid JSON in {DATA_JSON_SECTION}"))?;
            match parsed {
                Value::Object(object) => merged.extend(object),
                other => anyhow::bail!("{DATA_JSON_SECTION} must be a JSON object, got: {other}"),
            }
        }
        for (section, values) in args.iter() {
            if section == DATA_JSON_SECTION {
                continue;
            }
            if let Some(value) = values.first() {
                merged.insert(section.to_string(), Value::String(value.clone()));
            }
        }
        Ok(Value::Object(merged))
    }
}

impl<C: McpCommandHost> Command<C> for McpToolCommand<C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn help_text(&self) -> &str {
        &self.help_text
    }

    fn sections(&self) -> &[CommandSection] {
        &self.sections
    }

    fn execute(&self, ctx: &mut C, args: CommandArgs) -> anyhow::Result<()> {
        let arguments = self.tool_arguments(&args)?;
        debug!(tool = %self.name, "dispatching MCP tool call");

        let client = Arc::clone(&self.client);
        let tool = self.name.clone();
        // Submit to the MCP scheduler and block the foreground on the
        // result; the client applies its own per-call timeout.
        let result = self
            .handle
            .block_on(async move { client.call_tool(&tool, arguments).await })
            .with_context(|| format!("MCP tool '{}' failed", self.name))?;

        let output = format_tool_result(&self.name, &result);
        match self.mode {
            McpMode::Chat => ctx.notify(&format!("MCP tool '{}' output:\n{output}", self.name)),
            McpMode::DeepResearch => ctx.add_command_output(&self.name, &output),
        }
        Ok(())
    }
}

fn sections_from_input_schema(input_schema: &Value) -> Vec<CommandSection> {
    let empty = Map::new();
    let properties = input_schema
        .get("properties")
        .and_then(Value::as_object)
        .unwrap_or(&empty);
    let required: Vec<&str> = input_schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let has_complex_property = properties.values().any(|p| {
        matches!(
            p.get("type").and_then(Value::as_str),
            Some("object") | Some("array")
        )
    });
    if has_complex_property {
        return vec![CommandSection::new(
            DATA_JSON_SECTION,
            false,
            "JSON-structured arguments for this tool.",
        )];
    }

    // BTreeMap ordering keeps the section list stable across refreshes.
    let ordered: std::collections::BTreeMap<&String, &Value> = properties.iter().collect();
    ordered
        .into_iter()
        .map(|(name, property)| {
            CommandSection::new(
                name.clone(),
                required.contains(&name.as_str()),
                property
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string(),
            )
        })
        .collect()
}

/// Flatten the textual `content` parts of a `tools/call` result, with an
/// error banner when the server flagged `isError`.
fn format_tool_result(tool: &str, result: &Value) -> String {
    let mut output = String::new();
    if result.get("isError").and_then(Value::as_bool) == Some(true) {
        output.push_str(&format!("MCP tool error from '{tool}':\n"));
    }
    let texts: Vec<&str> = result
        .get("content")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter(|part| part.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();
    output.push_str(&texts.join("\n"));
    output
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
