// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Author {
    User,
    Assistant,
    System,
}

impl std::fmt::Display for Author {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Author::User => write!(f, "user"),
            Author::Assistant => write!(f, "assistant"),
            Author::System => write!(f, "system"),
        }
    }
}

/// A lazy, once-consumed text sequence.
///
/// Live streams are fed by a producer thread through a channel;
/// [`TextStream::next_chunk`] pulls chunks and accumulates them, so after
/// the first full traversal the stream is finished and only the buffered
/// text remains.  Clones share state: whichever holder drains the stream,
/// every other clone sees the accumulated text.
#[derive(Debug, Clone)]
pub struct TextStream {
    inner: Arc<Mutex<StreamInner>>,
}

#[derive(Debug)]
struct StreamInner {
    rx: Option<Receiver<String>>,
    accumulated: String,
    finished: bool,
}

/// Producer half of a live [`TextStream`].  Dropping it finishes the stream.
pub struct TextStreamSender(Sender<String>);

impl TextStreamSender {
    /// Returns false when every consumer is gone.
    pub fn send(&self, chunk: impl Into<String>) -> bool {
        self.0.send(chunk.into()).is_ok()
    }
}

impl TextStream {
    /// A live stream plus its producer handle.
    pub fn live() -> (TextStreamSender, TextStream) {
        let (tx, rx) = mpsc::channel();
        let stream = TextStream {
            inner: Arc::new(Mutex::new(StreamInner {
                rx: Some(rx),
                accumulated: String::new(),
                finished: false,
            })),
        };
        (TextStreamSender(tx), stream)
    }

    /// An already-finished stream holding `text`.
    pub fn finished(text: impl Into<String>) -> Self {
        TextStream {
            inner: Arc::new(Mutex::new(StreamInner {
                rx: None,
                accumulated: text.into(),
                finished: true,
            })),
        }
    }

    /// Block for the next chunk; `None` once the producer is done.
    pub fn next_chunk(&self) -> Option<String> {
        let mut inner = self.inner.lock().unwrap();
        let Some(rx) = inner.rx.as_ref() else {
            return None;
        };
        match rx.recv() {
            Ok(chunk) => {
                inner.accumulated.push_str(&chunk);
                Some(chunk)
            }
            Err(_) => {
                inner.rx = None;
                inner.finished = true;
                None
            }
        }
    }

    /// Consume any remaining chunks into the buffer.
    pub fn drain(&self) {
        while self.next_chunk().is_some() {}
    }

    /// The text accumulated so far (does not consume the stream).
    pub fn text(&self) -> String {
        self.inner.lock().unwrap().accumulated.clone()
    }

    /// Drain, then return the complete text.
    pub fn full_text(&self) -> String {
        self.drain();
        self.text()
    }

    pub fn has_finished(&self) -> bool {
        self.inner.lock().unwrap().finished
    }
}

impl PartialEq for TextStream {
    fn eq(&self, other: &Self) -> bool {
        let (a, b) = (self.inner.lock().unwrap(), other.inner.lock().unwrap());
        a.accumulated == b.accumulated && a.finished == b.finished
    }
}

// Streamed content serialises as its accumulated text plus a finished flag;
// deserialisation always yields an already-finished stream.
#[derive(Serialize, Deserialize)]
struct TextStreamRepr {
    text: String,
    has_finished: bool,
}

impl Serialize for TextStream {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let inner = self.inner.lock().unwrap();
        TextStreamRepr {
            text: inner.accumulated.clone(),
            has_finished: inner.finished,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TextStream {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let repr = TextStreamRepr::deserialize(deserializer)?;
        Ok(TextStream::finished(repr.text))
    }
}

/// The payload variants a [`Message`] can carry.
///
/// Serde tags (`type`) are part of the on-disk history format; renames are
/// load-bearing and must stay stable across versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageKind {
    Text {
        text: String,
        #[serde(default)]
        is_directly_entered: bool,
    },
    /// Text hidden from the user's rendering but fed to the assistant.
    Invisible {
        text: String,
        #[serde(default)]
        is_directly_entered: bool,
    },
    /// A notification visible only to the assistant, never rendered for the
    /// user.  Authored as user input so the assistant treats it as context.
    AssistantNotification { text: String },
    #[serde(rename = "text_generator")]
    TextGenerator { stream: TextStream },
    #[serde(rename = "thinking_and_response_generator")]
    ThinkingAndResponse {
        thinking: TextStream,
        response: TextStream,
    },
    Image { path: PathBuf },
    ImageUrl { url: String },
    Audio { path: PathBuf },
    Video { path: PathBuf },
    #[serde(rename = "pdf")]
    EmbeddedPdf {
        path: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pages: Option<Vec<u32>>,
    },
    /// A text file, either referenced by path (read when rendered for the
    /// assistant) or carried inline.
    TextualFile {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<PathBuf>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    Url { url: String },
    #[serde(rename = "llm_run_command_output")]
    CommandOutput { command: String, output: String },
}

/// What a message renders as on the user's terminal.
#[derive(Debug, Clone)]
pub enum UserContent {
    /// Nothing to show.
    Hidden,
    Text(String),
    /// Render chunk-by-chunk as the stream produces them.
    Stream(TextStream),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub author: Author,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: MessageKind,
}

impl Message {
    pub fn new(author: Author, kind: MessageKind) -> Self {
        Self {
            author,
            timestamp: Utc::now(),
            kind,
        }
    }

    pub fn text(author: Author, text: impl Into<String>) -> Self {
        Self::new(
            author,
            MessageKind::Text {
                text: text.into(),
                is_directly_entered: false,
            },
        )
    }

    /// Text typed directly by its author; excluded from the author's own
    /// history view.
    pub fn directly_entered(author: Author, text: impl Into<String>) -> Self {
        Self::new(
            author,
            MessageKind::Text {
                text: text.into(),
                is_directly_entered: true,
            },
        )
    }

    pub fn invisible(author: Author, text: impl Into<String>) -> Self {
        Self::new(
            author,
            MessageKind::Invisible {
                text: text.into(),
                is_directly_entered: true,
            },
        )
    }

    pub fn assistant_notification(text: impl Into<String>) -> Self {
        Self::new(
            Author::User,
            MessageKind::AssistantNotification { text: text.into() },
        )
    }

    pub fn command_output(command: impl Into<String>, output: impl Into<String>) -> Self {
        Self::new(
            Author::User,
            MessageKind::CommandOutput {
                command: command.into(),
                output: output.into(),
            },
        )
    }

    /// True for messages the author typed in themselves.  Used by the
    /// history store to keep a participant's own input out of the view it
    /// receives back.
    pub fn is_directly_entered(&self) -> bool {
        match &self.kind {
            MessageKind::Text {
                is_directly_entered,
                ..
            }
            | MessageKind::Invisible {
                is_directly_entered,
                ..
            } => *is_directly_entered,
            MessageKind::AssistantNotification { .. } => true,
            _ => false,
        }
    }

    /// What to render on the user's terminal.
    pub fn content_for_user(&self) -> UserContent {
        match &self.kind {
            MessageKind::Text { text, .. } => UserContent::Text(text.clone()),
            MessageKind::Invisible { .. } | MessageKind::AssistantNotification { .. } => {
                UserContent::Hidden
            }
            MessageKind::TextGenerator { stream } => UserContent::Stream(stream.clone()),
            MessageKind::ThinkingAndResponse { response, .. } => {
                UserContent::Stream(response.clone())
            }
            MessageKind::Image { path } => UserContent::Text(format!("[image: {}]", path.display())),
            MessageKind::ImageUrl { url } => UserContent::Text(format!("[image url: {url}]")),
            MessageKind::Audio { path } => UserContent::Text(format!("[audio: {}]", path.display())),
            MessageKind::Video { path } => UserContent::Text(format!("[video: {}]", path.display())),
            MessageKind::EmbeddedPdf { path, .. } => {
                UserContent::Text(format!("[pdf: {}]", path.display()))
            }
            MessageKind::TextualFile { path, name, .. } => {
                let label = name
                    .clone()
                    .or_else(|| path.as_ref().map(|p| p.display().to_string()))
                    .unwrap_or_else(|| "inline".to_string());
                UserContent::Text(format!("[file: {label}]"))
            }
            MessageKind::Url { url } => UserContent::Text(format!("[url: {url}]")),
            MessageKind::CommandOutput { .. } => UserContent::Hidden,
        }
    }

    /// What to feed the model.  Streams are drained to their full text;
    /// referenced files are read at call time.  `None` for content the
    /// assistant has no textual representation for.
    pub fn content_for_assistant(&self) -> Option<String> {
        match &self.kind {
            MessageKind::Text { text, .. } | MessageKind::Invisible { text, .. } => {
                Some(text.clone())
            }
            MessageKind::AssistantNotification { text } => Some(text.clone()),
            MessageKind::TextGenerator { stream } => Some(stream.full_text()),
            MessageKind::ThinkingAndResponse { response, .. } => Some(response.full_text()),
            MessageKind::Image { path } => Some(format!("[image attached: {}]", path.display())),
            MessageKind::ImageUrl { url } => Some(format!("[image attached: {url}]")),
            MessageKind::Audio { path } => Some(format!("[audio attached: {}]", path.display())),
            MessageKind::Video { path } => Some(format!("[video attached: {}]", path.display())),
            MessageKind::EmbeddedPdf { path, pages } => {
                let pages = pages
                    .as_ref()
                    .map(|p| {
                        format!(
                            " (pages {})",
                            p.iter().map(u32::to_string).collect::<Vec<_>>().join(",")
                        )
                    })
                    .unwrap_or_default();
                Some(format!("[pdf attached: {}{pages}]", path.display()))
            }
            MessageKind::TextualFile {
                path,
                content,
                name,
            } => {
                let label = name
                    .clone()
                    .or_else(|| path.as_ref().map(|p| p.display().to_string()))
                    .unwrap_or_else(|| "file".to_string());
                let body = match (content, path) {
                    (Some(inline), _) => inline.clone(),
                    (None, Some(path)) => std::fs::read_to_string(path)
                        .unwrap_or_else(|e| format!("[could not read {}: {e}]", path.display())),
                    (None, None) => String::new(),
                };
                Some(format!("File '{label}':\n{body}"))
            }
            MessageKind::Url { url } => Some(format!("[url: {url}]")),
            MessageKind::CommandOutput { command, output } => {
                Some(format!("Output of command '{command}':\n{output}"))
            }
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
