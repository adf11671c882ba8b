// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::mpsc;
use std::sync::Arc;

use futures::StreamExt;
use tracing::warn;

use crate::{CompletionRequest, ModelProvider, ResponseEvent};

/// One chunk of a streamed completion, as seen by the blocking side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionChunk {
    Thinking(String),
    Text(String),
}

/// Bridges an async [`ModelProvider`] stream onto the synchronous
/// conversation foreground.
///
/// The provider's stream is driven to completion on a dedicated helper
/// thread; the foreground consumes chunks through a plain channel, so the
/// conversation loop never runs inside an async executor.  Dropping the
/// bridge early detaches the consumer; the helper thread notices the closed
/// channel and stops pulling the stream.
pub struct BlockingCompletion {
    rx: mpsc::Receiver<anyhow::Result<CompletionChunk>>,
}

impl BlockingCompletion {
    pub fn spawn(provider: Arc<dyn ModelProvider>, req: CompletionRequest) -> Self {
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            futures::executor::block_on(pump(provider, req, tx));
        });
        Self { rx }
    }

    /// Block until the next chunk arrives.  `None` once the stream finished
    /// or the helper thread exited.
    pub fn recv(&self) -> Option<anyhow::Result<CompletionChunk>> {
        self.rx.recv().ok()
    }
}

impl Iterator for BlockingCompletion {
    type Item = anyhow::Result<CompletionChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        self.recv()
    }
}

async fn pump(
    provider: Arc<dyn ModelProvider>,
    req: CompletionRequest,
    tx: mpsc::Sender<anyhow::Result<CompletionChunk>>,
) {
    let mut stream = match provider.complete(req).await {
        Ok(s) => s,
        Err(e) => {
            let _ = tx.send(Err(e));
            return;
        }
    };

    while let Some(event) = stream.next().await {
        let forwarded = match event {
            Ok(ResponseEvent::TextDelta(t)) if !t.is_empty() => Ok(CompletionChunk::Text(t)),
            Ok(ResponseEvent::ThinkingDelta(t)) if !t.is_empty() => {
                Ok(CompletionChunk::Thinking(t))
            }
            Ok(ResponseEvent::TextDelta(_)) | Ok(ResponseEvent::ThinkingDelta(_)) => continue,
            Ok(ResponseEvent::Done) => break,
            Ok(ResponseEvent::Error(e)) => {
                warn!("model stream error: {e}");
                continue;
            }
            Err(e) => {
                let _ = tx.send(Err(e));
                break;
            }
        };
        if tx.send(forwarded).is_err() {
            // Consumer went away; stop pulling the stream.
            break;
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
