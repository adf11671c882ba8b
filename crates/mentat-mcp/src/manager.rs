// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use tracing::{info, warn};

use crate::command::{McpCommandHost, McpToolCommand};
use crate::{ClientStatus, McpClient, McpTimeouts};

/// Which assistant a client's tools are routed to.  The distinction is
/// purely routing — the clients themselves are identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum McpMode {
    Chat,
    DeepResearch,
}

impl std::fmt::Display for McpMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            McpMode::Chat => write!(f, "chat"),
            McpMode::DeepResearch => write!(f, "deep_research"),
        }
    }
}

/// Owns every MCP client and the background scheduler they run on.
///
/// The scheduler is a tokio runtime with a single worker thread; all
/// subprocess stdio happens there.  The synchronous conversation foreground
/// talks to it through [`McpManager::handle`] (block-on submission) and the
/// initial-load latch.
pub struct McpManager {
    runtime: tokio::runtime::Runtime,
    chat_clients: Vec<Arc<McpClient>>,
    deep_research_clients: Vec<Arc<McpClient>>,
    load_state: Arc<(Mutex<bool>, Condvar)>,
    errors_acknowledged: AtomicBool,
}

impl McpManager {
    pub fn new(
        chat_servers: &BTreeMap<String, String>,
        deep_research_servers: &BTreeMap<String, String>,
    ) -> anyhow::Result<Self> {
        Self::with_timeouts(chat_servers, deep_research_servers, McpTimeouts::default())
    }

    pub fn with_timeouts(
        chat_servers: &BTreeMap<String, String>,
        deep_research_servers: &BTreeMap<String, String>,
        timeouts: McpTimeouts,
    ) -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("mentat-mcp")
            .enable_all()
            .build()?;
        let make = |servers: &BTreeMap<String, String>| {
            servers
                .iter()
                .map(|(name, cmd)| McpClient::with_timeouts(name, cmd, timeouts))
                .collect()
        };
        Ok(Self {
            runtime,
            chat_clients: make(chat_servers),
            deep_research_clients: make(deep_research_servers),
            load_state: Arc::new((Mutex::new(false), Condvar::new())),
            errors_acknowledged: AtomicBool::new(false),
        })
    }

    /// Kick off every client's startup concurrently on the background
    /// scheduler.  Returns immediately; completion is observable through
    /// [`McpManager::wait_for_initial_load`].
    pub fn start_loading(&self) {
        let clients: Vec<Arc<McpClient>> = self.all_clients().cloned().collect();
        let load_state = Arc::clone(&self.load_state);
        self.runtime.spawn(async move {
            info!("starting MCP client loading in background");
            let tasks: Vec<_> = clients
                .into_iter()
                .map(|client| tokio::spawn(async move { client.start().await }))
                .collect();
            for task in tasks {
                let _ = task.await;
            }
            let (flag, condvar) = &*load_state;
            *flag.lock().unwrap() = true;
            condvar.notify_all();
            info!("finished loading all MCP clients");
        });
    }

    pub fn initial_load_complete(&self) -> bool {
        *self.load_state.0.lock().unwrap()
    }

    /// Block the calling (foreground) thread until every client start has
    /// returned — success or error — or `timeout` expires.  Returns whether
    /// the load completed.
    pub fn wait_for_initial_load(&self, timeout: Duration) -> bool {
        let (flag, condvar) = &*self.load_state;
        let guard = flag.lock().unwrap();
        let (guard, result) = condvar
            .wait_timeout_while(guard, timeout, |done| !*done)
            .unwrap();
        if result.timed_out() && !*guard {
            warn!("timed out waiting for MCP clients to load after {timeout:?}");
            return false;
        }
        true
    }

    pub fn has_errors(&self) -> bool {
        self.all_clients()
            .any(|c| c.status() == ClientStatus::Error)
    }

    pub fn errors_acknowledged(&self) -> bool {
        self.errors_acknowledged.load(Ordering::SeqCst)
    }

    /// One-shot, user-driven: mark the currently reported errors as seen so
    /// the status report goes quiet.
    pub fn acknowledge_errors(&self) {
        self.errors_acknowledged.store(true, Ordering::SeqCst);
    }

    /// While loading: the clients still connecting.  Once loaded: the error
    /// report, unless errors were acknowledged.  `None` when there is
    /// nothing worth saying.
    pub fn status_report(&self) -> Option<String> {
        if self.initial_load_complete() {
            if !self.has_errors() || self.errors_acknowledged() {
                return None;
            }
            return Some(self.error_report());
        }

        let connecting: Vec<&str> = self
            .all_clients()
            .filter(|c| c.status() == ClientStatus::Connecting)
            .map(|c| c.name())
            .collect();
        if connecting.is_empty() {
            return None;
        }
        let mut report = String::from("MCP servers are loading...");
        for name in connecting {
            report.push_str(&format!("\n  - {name}: connecting..."));
        }
        Some(report)
    }

    pub fn error_report(&self) -> String {
        let mut report = String::from("MCP server errors:");
        for client in self.all_clients() {
            if client.status() == ClientStatus::Error {
                if let Some(message) = client.error_message() {
                    report.push_str(&format!("\n  - {}: {message}", client.name()));
                }
            }
        }
        report
    }

    /// Handle onto the background scheduler, for foreground block-on hops.
    pub fn handle(&self) -> tokio::runtime::Handle {
        self.runtime.handle().clone()
    }

    /// Synthesise a command per tool of every *connected* client in `mode`.
    /// Clients in any other state contribute nothing, so a server that died
    /// after discovery simply drops out on the next refresh.
    pub fn create_commands_for_mode<C: McpCommandHost>(
        &self,
        mode: McpMode,
    ) -> Vec<McpToolCommand<C>> {
        let clients = match mode {
            McpMode::Chat => &self.chat_clients,
            McpMode::DeepResearch => &self.deep_research_clients,
        };
        let mut commands = Vec::new();
        for client in clients {
            if client.status() != ClientStatus::Connected {
                continue;
            }
            for tool in client.tools() {
                commands.push(McpToolCommand::from_schema(
                    Arc::clone(client),
                    self.handle(),
                    mode,
                    &tool,
                ));
            }
        }
        commands
    }

    /// Terminate every child process.  Offered for embedders; the core
    /// relies on OS process exit for cleanup.
    pub fn stop_all(&self) {
        let clients: Vec<Arc<McpClient>> = self.all_clients().cloned().collect();
        self.handle().block_on(async move {
            for client in clients {
                client.stop().await;
            }
        });
    }

    fn all_clients(&self) -> impl Iterator<Item = &Arc<McpClient>> {
        self.chat_clients.iter().chain(self.deep_research_clients.iter())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn empty() -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    #[test]
    fn manager_without_servers_loads_immediately() {
        let manager = McpManager::new(&empty(), &empty()).unwrap();
        manager.start_loading();
        assert!(manager.wait_for_initial_load(Duration::from_secs(5)));
        assert!(manager.initial_load_complete());
        assert!(!manager.has_errors());
        assert!(manager.status_report().is_none());
    }

    #[test]
    fn wait_before_start_times_out() {
        let manager = McpManager::new(&empty(), &empty()).unwrap();
        assert!(!manager.wait_for_initial_load(Duration::from_millis(50)));
        assert!(!manager.initial_load_complete());
    }

    #[test]
    fn failed_spawn_is_reported_but_does_not_block_load() {
        let mut chat = empty();
        chat.insert("ghost".into(), "/nonexistent/mcp-xyz --stdio".into());
        let manager = McpManager::new(&chat, &empty()).unwrap();
        manager.start_loading();
        assert!(manager.wait_for_initial_load(Duration::from_secs(10)));
        assert!(manager.has_errors());
        let report = manager.status_report().unwrap();
        assert!(report.contains("ghost"));
    }

    #[test]
    fn acknowledge_silences_error_report() {
        let mut chat = empty();
        chat.insert("ghost".into(), "/nonexistent/mcp-xyz".into());
        let manager = McpManager::new(&chat, &empty()).unwrap();
        manager.start_loading();
        assert!(manager.wait_for_initial_load(Duration::from_secs(10)));
        assert!(manager.status_report().is_some());
        manager.acknowledge_errors();
        assert!(manager.status_report().is_none());
        // has_errors still reflects reality; only the report goes quiet.
        assert!(manager.has_errors());
    }

    #[test]
    fn commands_for_mode_empty_without_connected_clients() {
        struct NullHost;
        impl McpCommandHost for NullHost {
            fn notify(&mut self, _text: &str) {}
            fn add_command_output(&mut self, _command: &str, _output: &str) {}
        }
        let mut chat = empty();
        chat.insert("ghost".into(), "/nonexistent/mcp-xyz".into());
        let manager = McpManager::new(&chat, &empty()).unwrap();
        manager.start_loading();
        assert!(manager.wait_for_initial_load(Duration::from_secs(10)));
        let commands = manager.create_commands_for_mode::<NullHost>(McpMode::Chat);
        assert!(commands.is_empty());
    }

    #[test]
    fn mode_display_names() {
        assert_eq!(McpMode::Chat.to_string(), "chat");
        assert_eq!(McpMode::DeepResearch.to_string(), "deep_research");
    }
}
