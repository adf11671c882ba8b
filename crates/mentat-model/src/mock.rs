// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;

use crate::{CompletionRequest, ResponseEvent, ResponseStream, Role};

/// Deterministic mock provider for tests.  Echoes the last user message
/// back as the assistant response.
#[derive(Default)]
pub struct MockProvider;

#[async_trait]
impl crate::ModelProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }
    fn model_name(&self) -> &str {
        "mock-model"
    }

    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<ResponseStream> {
        let reply = req
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_else(|| "[no input]".to_string());

        let events: Vec<anyhow::Result<ResponseEvent>> = vec![
            Ok(ResponseEvent::TextDelta(format!("MOCK: {reply}"))),
            Ok(ResponseEvent::Done),
        ];
        Ok(Box::pin(stream::iter(events)))
    }
}

/// A pre-scripted mock provider.  Each call to `complete` pops the next
/// response script from the front of the queue.  This lets tests specify
/// exact event sequences without network access.
pub struct ScriptedMockProvider {
    scripts: Arc<Mutex<Vec<Vec<ResponseEvent>>>>,
    /// The last `CompletionRequest` seen by this provider.
    /// Written on each `complete()` call so tests can inspect what was sent.
    pub last_request: Arc<Mutex<Option<CompletionRequest>>>,
}

impl ScriptedMockProvider {
    /// Build a provider from a list of response scripts.
    /// The outer `Vec` is the ordered list of calls; the inner `Vec` is the
    /// sequence of [`ResponseEvent`]s emitted for that call.
    pub fn new(scripts: Vec<Vec<ResponseEvent>>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts)),
            last_request: Arc::new(Mutex::new(None)),
        }
    }

    /// Convenience: provider that always returns a single text reply.
    pub fn always_text(reply: impl Into<String>) -> Self {
        let r = reply.into();
        Self::new(vec![vec![
            ResponseEvent::TextDelta(r),
            ResponseEvent::Done,
        ]])
    }

    /// Convenience: one scripted reply per element, in order.
    pub fn replies(replies: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::new(
            replies
                .into_iter()
                .map(|r| vec![ResponseEvent::TextDelta(r.into()), ResponseEvent::Done])
                .collect(),
        )
    }
}

#[async_trait]
impl crate::ModelProvider for ScriptedMockProvider {
    fn name(&self) -> &str {
        "scripted-mock"
    }
    fn model_name(&self) -> &str {
        "scripted-mock-model"
    }

    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<ResponseStream> {
        *self.last_request.lock().unwrap() = Some(req);
        let events = {
            let mut scripts = self.scripts.lock().unwrap();
            if scripts.is_empty() {
                // Default fallback when all scripts are consumed
                vec![
                    ResponseEvent::TextDelta("[no more scripts]".into()),
                    ResponseEvent::Done,
                ]
            } else {
                scripts.remove(0)
            }
        };
        let wrapped: Vec<anyhow::Result<ResponseEvent>> = events.into_iter().map(Ok).collect();
        Ok(Box::pin(stream::iter(wrapped)))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;
    use crate::{ModelProvider, PromptMessage};

    fn empty_req() -> CompletionRequest {
        CompletionRequest {
            messages: vec![PromptMessage::user("hi")],
            ..Default::default()
        }
    }

    #[test]
    fn mock_echoes_last_user_message() {
        let p = MockProvider;
        let mut stream = futures::executor::block_on(p.complete(empty_req())).unwrap();
        let first = futures::executor::block_on(stream.next()).unwrap().unwrap();
        match first {
            ResponseEvent::TextDelta(t) => assert!(t.contains("MOCK: hi")),
            other => panic!("unexpected first event: {other:?}"),
        }
    }

    #[test]
    fn mock_ends_with_done() {
        let p = MockProvider;
        let stream = futures::executor::block_on(p.complete(empty_req())).unwrap();
        let events: Vec<_> = futures::executor::block_on(stream.collect::<Vec<_>>());
        assert!(matches!(events.last(), Some(Ok(ResponseEvent::Done))));
    }

    #[test]
    fn scripted_single_text_reply() {
        let p = ScriptedMockProvider::always_text("hello world");
        let mut stream = futures::executor::block_on(p.complete(empty_req())).unwrap();
        let ev = futures::executor::block_on(stream.next()).unwrap().unwrap();
        assert!(matches!(ev, ResponseEvent::TextDelta(t) if t == "hello world"));
    }

    #[test]
    fn scripted_replies_consumed_in_order() {
        let p = ScriptedMockProvider::replies(["one", "two"]);
        for expected in ["one", "two"] {
            let mut stream = futures::executor::block_on(p.complete(empty_req())).unwrap();
            let ev = futures::executor::block_on(stream.next()).unwrap().unwrap();
            assert!(matches!(ev, ResponseEvent::TextDelta(t) if t == expected));
        }
    }

    #[test]
    fn scripted_fallback_when_scripts_exhausted() {
        let p = ScriptedMockProvider::new(vec![]);
        let mut stream = futures::executor::block_on(p.complete(empty_req())).unwrap();
        let ev = futures::executor::block_on(stream.next()).unwrap().unwrap();
        assert!(matches!(ev, ResponseEvent::TextDelta(t) if t.contains("no more scripts")));
    }

    #[test]
    fn scripted_records_last_request() {
        let p = ScriptedMockProvider::always_text("x");
        let _ = futures::executor::block_on(p.complete(empty_req())).unwrap();
        let last = p.last_request.lock().unwrap();
        assert_eq!(last.as_ref().unwrap().messages[0].content, "hi");
    }
}
