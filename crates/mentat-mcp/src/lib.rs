// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! `mentat-mcp` — MCP (Model Context Protocol) supervisor for mentat.
//!
//! Starts each configured tool server as a child process, speaks
//! line-delimited JSON-RPC 2.0 over its stdio, discovers the tools it
//! offers, and exposes every tool as a dynamically registered command on
//! the assistant's control panel.
//!
//! # Architecture
//!
//! ```text
//! conversation foreground (synchronous)
//!       │  Handle::block_on / Condvar latch
//!       ▼
//! McpManager ── background tokio runtime (1 worker thread)
//!       │
//!       ├─► McpClient "files"  ──►  child process (stdio JSON-RPC)
//!       └─► McpClient "web"    ──►  child process (stdio JSON-RPC)
//! ```
//!
//! All subprocess I/O lives on the manager's runtime; the foreground only
//! ever blocks on futures it submitted there.  Per-request correlation uses
//! monotonically increasing integer ids and a pending-sender map owned by
//! each client.

mod client;
mod command;
mod manager;

pub use client::{ClientStatus, McpClient, McpError, McpTimeouts, McpToolSchema, PROTOCOL_VERSION};
pub use command::{McpCommandHost, McpToolCommand, DATA_JSON_SECTION};
pub use manager::{McpManager, McpMode};
