// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// MCP protocol revision sent in the `initialize` request.
pub const PROTOCOL_VERSION: &str = "2025-03-26";

/// Per-request deadlines.  A timed-out request fails only that call; the
/// client stays operational.
#[derive(Debug, Clone, Copy)]
pub struct McpTimeouts {
    pub handshake: Duration,
    pub call: Duration,
}

impl Default for McpTimeouts {
    fn default() -> Self {
        Self {
            handshake: Duration::from_secs(30),
            call: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Error)]
pub enum McpError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid server command string: {0:?}")]
    InvalidCommand(String),
    #[error("MCP server '{0}' is not connected")]
    NotConnected(String),
    #[error("MCP error {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        data: Option<Value>,
    },
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection lost")]
    ConnectionLost,
    #[error("write to MCP server failed: {0}")]
    Write(#[from] std::io::Error),
}

/// Lifecycle states of one MCP client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl std::fmt::Display for ClientStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientStatus::Disconnected => write!(f, "disconnected"),
            ClientStatus::Connecting => write!(f, "connecting"),
            ClientStatus::Connected => write!(f, "connected"),
            ClientStatus::Error => write!(f, "error"),
        }
    }
}

/// One tool offered by a server, as returned from `tools/list`.
///
/// `input_schema` is kept as raw JSON — command synthesis extracts what it
/// understands and tolerates everything else.
#[derive(Debug, Clone)]
pub struct McpToolSchema {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Client for one external MCP tool server.
///
/// The struct is shared as an `Arc` between the reader/stderr tasks it
/// spawns and the manager.  `pending` is shared between request futures and
/// the reader task behind a plain mutex (never held across an await); the
/// status fields use plain mutexes so the synchronous foreground can read
/// them directly.  Async methods need the manager's runtime in scope for
/// their IO to be driven.
pub struct McpClient {
    name: String,
    command: String,
    timeouts: McpTimeouts,
    status: Mutex<ClientStatus>,
    error_message: Mutex<Option<String>>,
    tools: Mutex<Vec<McpToolSchema>>,
    next_request_id: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<Result<Value, McpError>>>>,
    stdin: tokio::sync::Mutex<Option<ChildStdin>>,
    child: tokio::sync::Mutex<Option<Child>>,
    stopping: AtomicBool,
}

impl McpClient {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Arc<Self> {
        Self::with_timeouts(name, command, McpTimeouts::default())
    }

    pub fn with_timeouts(
        name: impl Into<String>,
        command: impl Into<String>,
        timeouts: McpTimeouts,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            command: command.into(),
            timeouts,
            status: Mutex::new(ClientStatus::Disconnected),
            error_message: Mutex::new(None),
            tools: Mutex::new(Vec::new()),
            next_request_id: AtomicU64::new(0),
            pending: Mutex::new(HashMap::new()),
            stdin: tokio::sync::Mutex::new(None),
            child: tokio::sync::Mutex::new(None),
            stopping: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> ClientStatus {
        *self.status.lock().unwrap()
    }

    pub fn error_message(&self) -> Option<String> {
        self.error_message.lock().unwrap().clone()
    }

    pub fn tools(&self) -> Vec<McpToolSchema> {
        self.tools.lock().unwrap().clone()
    }

    /// Spawn the server process and drive the handshake.  Never returns an
    /// error: failures land in the `error` status so the manager can report
    /// them in aggregate.
    pub async fn start(self: &Arc<Self>) {
        self.set_status(ClientStatus::Connecting);
        match self.try_start().await {
            Ok(()) => {
                // A fatal stderr line may already have flipped us to error
                // while the handshake was in flight; don't mask it.
                let mut status = self.status.lock().unwrap();
                if *status == ClientStatus::Connecting {
                    *status = ClientStatus::Connected;
                    info!(client = %self.name, "MCP client connected");
                }
            }
            Err(e) => {
                self.fail(format!(
                    "failed to start or initialize MCP server '{}': {e}",
                    self.name
                ));
            }
        }
    }

    async fn try_start(self: &Arc<Self>) -> Result<(), McpError> {
        let argv =
            shlex::split(&self.command).ok_or_else(|| McpError::InvalidCommand(self.command.clone()))?;
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| McpError::InvalidCommand(self.command.clone()))?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| McpError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        let stdout = child.stdout.take().expect("stdout was piped");
        let stderr = child.stderr.take().expect("stderr was piped");
        *self.stdin.lock().await = child.stdin.take();
        *self.child.lock().await = Some(child);

        tokio::spawn(Arc::clone(self).read_stdout(stdout));
        tokio::spawn(Arc::clone(self).read_stderr(stderr));

        self.handshake().await
    }

    /// initialize → initialized → tools/list.  `tools/call` is gated on the
    /// `connected` status, so it can never overtake this sequence.
    async fn handshake(&self) -> Result<(), McpError> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "clientInfo": {
                "name": "mentat",
                "version": env!("CARGO_PKG_VERSION"),
            },
            "capabilities": {},
        });
        self.request("initialize", params, self.timeouts.handshake)
            .await?;
        self.notify("notifications/initialized", json!({})).await?;

        let listed = self
            .request("tools/list", json!({}), self.timeouts.handshake)
            .await?;
        let tools = parse_tool_list(&self.name, &listed);
        info!(client = %self.name, count = tools.len(), "loaded MCP tools");
        *self.tools.lock().unwrap() = tools;
        Ok(())
    }

    /// Invoke a discovered tool and return the raw `result` object.
    pub async fn call_tool(&self, tool: &str, arguments: Value) -> Result<Value, McpError> {
        if self.status() != ClientStatus::Connected {
            return Err(McpError::NotConnected(self.name.clone()));
        }
        self.request(
            "tools/call",
            json!({ "name": tool, "arguments": arguments }),
            self.timeouts.call,
        )
        .await
    }

    /// Terminate the subprocess and await its exit.  Idempotent.
    pub async fn stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        *self.stdin.lock().await = None;
        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(e) = child.kill().await {
                debug!(client = %self.name, "kill failed (already exited?): {e}");
            }
        }
        self.set_status(ClientStatus::Disconnected);
    }

    async fn request(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, McpError> {
        let id = self.next_request_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(id, tx);

        let request = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        if let Err(e) = self.write_line(&request).await {
            self.pending.lock().unwrap().remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            // Sender dropped without resolving: connection teardown raced us.
            Ok(Err(_)) => Err(McpError::ConnectionLost),
            Err(_) => {
                self.pending.lock().unwrap().remove(&id);
                Err(McpError::Timeout(timeout))
            }
        }
    }

    async fn notify(&self, method: &str, params: Value) -> Result<(), McpError> {
        self.write_line(&json!({ "jsonrpc": "2.0", "method": method, "params": params }))
            .await
    }

    async fn write_line(&self, message: &Value) -> Result<(), McpError> {
        let mut guard = self.stdin.lock().await;
        let stdin = guard
            .as_mut()
            .ok_or_else(|| McpError::NotConnected(self.name.clone()))?;
        let mut line = message.to_string();
        line.push('\n');
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await?;
        Ok(())
    }

    async fn read_stdout(self: Arc<Self>, stdout: ChildStdout) {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => self.route_line(&line),
                Ok(None) => break,
                Err(e) => {
                    debug!(client = %self.name, "stdout read failed: {e}");
                    break;
                }
            }
        }
        self.on_connection_lost();
    }

    fn route_line(&self, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        let message: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(_) => {
                warn!(client = %self.name, "skipping non-JSON line from server: {}", line.trim());
                return;
            }
        };
        let Some(id) = message.get("id").and_then(Value::as_u64) else {
            // Notifications from servers are not expected.
            debug!(client = %self.name, "dropping unhandled message: {message}");
            return;
        };
        let Some(tx) = self.pending.lock().unwrap().remove(&id) else {
            debug!(client = %self.name, id, "response for unknown or timed-out request");
            return;
        };
        let outcome = match message.get("error") {
            Some(err) => Err(McpError::Rpc {
                code: err.get("code").and_then(Value::as_i64).unwrap_or(0),
                message: err
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
                data: err.get("data").cloned(),
            }),
            None => Ok(message.get("result").cloned().unwrap_or(Value::Null)),
        };
        let _ = tx.send(outcome);
    }

    async fn read_stderr(self: Arc<Self>, stderr: ChildStderr) {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(client = %self.name, "server stderr: {line}");
            if line.to_lowercase().contains("[error]") {
                self.fail(format!("error from server '{}': {line}", self.name));
            }
        }
    }

    /// Stdout EOF: every in-flight request fails, and unless this client is
    /// being stopped deliberately the whole client goes to `error`.
    fn on_connection_lost(&self) {
        let pending: Vec<_> = self.pending.lock().unwrap().drain().collect();
        for (_, tx) in pending {
            let _ = tx.send(Err(McpError::ConnectionLost));
        }
        if !self.stopping.load(Ordering::SeqCst) {
            self.fail(format!("MCP server '{}' closed its output stream", self.name));
        }
    }

    fn set_status(&self, status: ClientStatus) {
        *self.status.lock().unwrap() = status;
    }

    /// Transition to `error`.  The first recorded message wins.
    fn fail(&self, message: String) {
        warn!(client = %self.name, "{message}");
        self.set_status(ClientStatus::Error);
        let mut slot = self.error_message.lock().unwrap();
        if slot.is_none() {
            *slot = Some(message);
        }
    }
}

fn parse_tool_list(client_name: &str, listed: &Value) -> Vec<McpToolSchema> {
    let Some(items) = listed.get("tools").and_then(Value::as_array) else {
        warn!(client = %client_name, "tools/list response carried no tools array");
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let Some(name) = item.get("name").and_then(Value::as_str) else {
                warn!(client = %client_name, "skipping tool without a name: {item}");
                return None;
            };
            Some(McpToolSchema {
                name: name.to_string(),
                description: item
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or("An MCP-based tool.")
                    .to_string(),
                input_schema: item.get("inputSchema").cloned().unwrap_or(json!({})),
            })
        })
        .collect()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
