// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Integration tests for the MCP client and manager against real child
//! processes.
//!
//! The fake servers are tiny `sh` scripts that read JSON-RPC lines from
//! stdin and answer with `printf`.  Request ids are deterministic (the
//! client numbers them 1, 2, 3 in handshake order), so the scripts can
//! hard-code their responses.  Received lines are appended to a log file
//! so tests can assert on the exact wire bodies the client produced.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde_json::{json, Value};

use mentat_commands::{Command, CommandArgs};
use mentat_mcp::{
    ClientStatus, McpClient, McpCommandHost, McpError, McpManager, McpMode, McpTimeouts,
};

const INITIALIZE_RESULT: &str = r#"{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2025-03-26","capabilities":{},"serverInfo":{"name":"fake","version":"0"}}}"#;
const TOOLS_RESULT: &str = r#"{"jsonrpc":"2.0","id":2,"result":{"tools":[{"name":"foo","description":"Echo tool","inputSchema":{"properties":{"q":{"type":"string","description":"query text"}},"required":["q"]}}]}}"#;
const CALL_RESULT: &str = r#"{"jsonrpc":"2.0","id":3,"result":{"content":[{"type":"text","text":"hello from foo"}]}}"#;

fn short_timeouts() -> McpTimeouts {
    McpTimeouts {
        handshake: Duration::from_secs(10),
        call: Duration::from_secs(10),
    }
}

/// Write a fake-server script into `dir` and return the command string that
/// launches it.  `$1` inside the script is the request log path.
fn fake_server(dir: &Path, name: &str, body: &str, log: &Path) -> String {
    let path = dir.join(format!("{name}.sh"));
    std::fs::write(&path, format!("#!/bin/sh\nOUT=\"$1\"\n{body}")).unwrap();
    format!("sh {} {}", path.display(), log.display())
}

/// A server that completes the handshake, serves one tool call, then idles.
fn serving_body() -> String {
    format!(
        "read line; echo \"$line\" >>\"$OUT\"\n\
         printf '{INITIALIZE_RESULT}\\n'\n\
         read line; echo \"$line\" >>\"$OUT\"\n\
         read line; echo \"$line\" >>\"$OUT\"\n\
         printf '{TOOLS_RESULT}\\n'\n\
         read line; echo \"$line\" >>\"$OUT\"\n\
         printf '{CALL_RESULT}\\n'\n\
         cat >/dev/null\n"
    )
}

struct RecordingHost {
    notifications: Vec<String>,
    command_outputs: Vec<(String, String)>,
}

impl RecordingHost {
    fn new() -> Self {
        Self {
            notifications: Vec::new(),
            command_outputs: Vec::new(),
        }
    }
}

impl McpCommandHost for RecordingHost {
    fn notify(&mut self, text: &str) {
        self.notifications.push(text.to_string());
    }
    fn add_command_output(&mut self, command: &str, output: &str) {
        self.command_outputs.push((command.into(), output.into()));
    }
}

fn logged_requests(log: &Path) -> Vec<Value> {
    std::fs::read_to_string(log)
        .unwrap_or_default()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

// ── Client lifecycle ──────────────────────────────────────────────────────────

#[test]
fn client_handshake_discovers_tools() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("requests.log");
    let cmd = fake_server(dir.path(), "server", &serving_body(), &log);

    let runtime = tokio::runtime::Runtime::new().unwrap();
    let client = McpClient::with_timeouts("fake", cmd, short_timeouts());
    runtime.block_on(client.start());

    assert_eq!(client.status(), ClientStatus::Connected);
    let tools = client.tools();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "foo");
    assert_eq!(tools[0].description, "Echo tool");

    // Handshake wire order: initialize, initialized, tools/list.
    let requests = logged_requests(&log);
    assert_eq!(requests[0]["method"], "initialize");
    assert_eq!(requests[0]["id"], json!(1));
    assert_eq!(requests[0]["params"]["protocolVersion"], "2025-03-26");
    assert_eq!(requests[1]["method"], "notifications/initialized");
    assert!(requests[1].get("id").is_none());
    assert_eq!(requests[2]["method"], "tools/list");
    assert_eq!(requests[2]["id"], json!(2));

    runtime.block_on(client.stop());
    assert_eq!(client.status(), ClientStatus::Disconnected);
}

#[test]
fn call_tool_round_trips_result_object() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("requests.log");
    let cmd = fake_server(dir.path(), "server", &serving_body(), &log);

    let runtime = tokio::runtime::Runtime::new().unwrap();
    let client = McpClient::with_timeouts("fake", cmd, short_timeouts());
    runtime.block_on(client.start());
    assert_eq!(client.status(), ClientStatus::Connected);

    let result = runtime
        .block_on(client.call_tool("foo", json!({ "q": "hello" })))
        .unwrap();
    assert_eq!(result["content"][0]["text"], "hello from foo");

    let requests = logged_requests(&log);
    let call = &requests[3];
    assert_eq!(call["jsonrpc"], "2.0");
    assert_eq!(call["method"], "tools/call");
    assert!(call["id"].is_u64());
    assert_eq!(call["params"], json!({ "name": "foo", "arguments": { "q": "hello" } }));

    runtime.block_on(client.stop());
}

#[test]
fn tool_call_timeout_fails_only_that_call() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("requests.log");
    // Handshake works, but tool calls are swallowed.
    let body = format!(
        "read line; echo \"$line\" >>\"$OUT\"\n\
         printf '{INITIALIZE_RESULT}\\n'\n\
         read line; echo \"$line\" >>\"$OUT\"\n\
         read line; echo \"$line\" >>\"$OUT\"\n\
         printf '{TOOLS_RESULT}\\n'\n\
         cat >/dev/null\n"
    );
    let cmd = fake_server(dir.path(), "server", &body, &log);

    let runtime = tokio::runtime::Runtime::new().unwrap();
    let client = McpClient::with_timeouts(
        "slow",
        cmd,
        McpTimeouts {
            handshake: Duration::from_secs(10),
            call: Duration::from_millis(300),
        },
    );
    runtime.block_on(client.start());
    assert_eq!(client.status(), ClientStatus::Connected);

    let err = runtime
        .block_on(client.call_tool("foo", json!({ "q": "x" })))
        .unwrap_err();
    assert!(matches!(err, McpError::Timeout(_)), "got: {err:?}");
    // The client survives a per-call timeout.
    assert_eq!(client.status(), ClientStatus::Connected);

    runtime.block_on(client.stop());
}

#[test]
fn stderr_error_line_flips_client_to_error() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("requests.log");
    let body = "echo '[ERROR] exploded on startup' >&2\ncat >/dev/null\n";
    let cmd = fake_server(dir.path(), "server", body, &log);

    let runtime = tokio::runtime::Runtime::new().unwrap();
    let client = McpClient::with_timeouts(
        "broken",
        cmd,
        McpTimeouts {
            handshake: Duration::from_millis(500),
            call: Duration::from_millis(500),
        },
    );
    runtime.block_on(client.start());

    assert_eq!(client.status(), ClientStatus::Error);
    // First error wins: the stderr line, not the handshake timeout.
    assert!(client.error_message().unwrap().contains("[ERROR] exploded"));

    runtime.block_on(client.stop());
}

#[test]
fn server_exit_after_handshake_fails_pending_and_marks_error() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("requests.log");
    // Handshake completes, then the process exits.
    let body = format!(
        "read line; echo \"$line\" >>\"$OUT\"\n\
         printf '{INITIALIZE_RESULT}\\n'\n\
         read line; echo \"$line\" >>\"$OUT\"\n\
         read line; echo \"$line\" >>\"$OUT\"\n\
         printf '{TOOLS_RESULT}\\n'\n"
    );
    let cmd = fake_server(dir.path(), "server", &body, &log);

    let runtime = tokio::runtime::Runtime::new().unwrap();
    let client = McpClient::with_timeouts("flaky", cmd, short_timeouts());
    runtime.block_on(client.start());

    // Give the reader task a moment to observe EOF.
    runtime.block_on(async {
        for _ in 0..50 {
            if client.status() == ClientStatus::Error {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    });
    assert_eq!(client.status(), ClientStatus::Error);

    // Further calls fail cleanly rather than hanging.
    let err = runtime
        .block_on(client.call_tool("foo", json!({})))
        .unwrap_err();
    assert!(matches!(err, McpError::NotConnected(_)));
}

// ── Manager + command synthesis (end to end) ──────────────────────────────────

#[test]
fn manager_discovery_with_one_healthy_and_one_failing_server() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("requests.log");
    let mut chat = BTreeMap::new();
    chat.insert(
        "alpha".to_string(),
        fake_server(dir.path(), "alpha", &serving_body(), &log),
    );
    chat.insert(
        "beta".to_string(),
        "/nonexistent/mcp-server-beta --stdio".to_string(),
    );

    let manager = McpManager::with_timeouts(&chat, &BTreeMap::new(), short_timeouts()).unwrap();
    manager.start_loading();
    assert!(manager.wait_for_initial_load(Duration::from_secs(20)));

    // The broken server is reported but does not block the healthy one.
    assert!(manager.has_errors());
    assert!(manager.error_report().contains("beta"));

    let commands = manager.create_commands_for_mode::<RecordingHost>(McpMode::Chat);
    assert_eq!(commands.len(), 1);
    let foo = &commands[0];
    assert_eq!(Command::<RecordingHost>::name(foo), "foo");
    let sections = Command::<RecordingHost>::sections(foo);
    assert_eq!(sections.len(), 1);
    assert_eq!(sections[0].name, "q");
    assert!(sections[0].required);
    assert_eq!(sections[0].help_text, "query text");

    // Execute the synthesised command from the foreground thread.
    let mut host = RecordingHost::new();
    let mut args = CommandArgs::new();
    args.push("q", "hello");
    foo.execute(&mut host, args).unwrap();
    assert_eq!(host.notifications.len(), 1);
    assert!(host.notifications[0].contains("hello from foo"));
    assert!(host.command_outputs.is_empty());

    // The call that went over the wire is exactly the spec'd body.
    let requests = logged_requests(&log);
    let call = requests
        .iter()
        .find(|r| r["method"] == "tools/call")
        .unwrap();
    assert_eq!(call["jsonrpc"], "2.0");
    assert!(call["id"].is_u64());
    assert_eq!(call["params"], json!({ "name": "foo", "arguments": { "q": "hello" } }));

    manager.stop_all();
}

#[test]
fn deep_research_mode_routes_to_command_output_buffer() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("requests.log");
    let mut research = BTreeMap::new();
    research.insert(
        "alpha".to_string(),
        fake_server(dir.path(), "alpha", &serving_body(), &log),
    );

    let manager =
        McpManager::with_timeouts(&BTreeMap::new(), &research, short_timeouts()).unwrap();
    manager.start_loading();
    assert!(manager.wait_for_initial_load(Duration::from_secs(20)));
    assert!(!manager.has_errors());

    // The research client set contributes nothing to chat mode.
    assert!(manager
        .create_commands_for_mode::<RecordingHost>(McpMode::Chat)
        .is_empty());

    let commands = manager.create_commands_for_mode::<RecordingHost>(McpMode::DeepResearch);
    assert_eq!(commands.len(), 1);

    let mut host = RecordingHost::new();
    let mut args = CommandArgs::new();
    args.push("q", "hi");
    commands[0].execute(&mut host, args).unwrap();
    assert!(host.notifications.is_empty());
    assert_eq!(host.command_outputs.len(), 1);
    assert_eq!(host.command_outputs[0].0, "foo");
    assert_eq!(host.command_outputs[0].1, "hello from foo");

    manager.stop_all();
}
