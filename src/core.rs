//! Core data types and traits shared by the broker, decoder and relay.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::notification::DeliveryError;

/// Sender shown when the payload does not name one.
pub const UNKNOWN_SENDER: &str = "Unknown";

/// A decoded SMS ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    sender: String,
    body: String,
}

impl Notification {
    /// Builds a notification. `None` when the body is empty.
    pub fn new(sender: impl Into<String>, body: impl Into<String>) -> Option<Self> {
        let body = body.into();
        if body.is_empty() {
            return None;
        }
        Some(Self {
            sender: sender.into(),
            body,
        })
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn body(&self) -> &str {
        &self.body
    }
}

/// The ordered list of chat ids every notification is delivered to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipientSet(Arc<[String]>);

impl RecipientSet {
    /// Builds the set, trimming ids and dropping blank ones.
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ids: Vec<String> = ids
            .into_iter()
            .map(|id| id.as_ref().trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        Self(ids.into())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Lifecycle of the broker connection as seen by the connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// Outcome of one fan-out.
#[derive(Debug, Default)]
pub struct DeliveryReport {
    /// Number of recipients a request was issued for.
    pub attempted: usize,
    /// Recipients that accepted the message.
    pub succeeded: Vec<String>,
    /// Recipients that failed, with the rendered error.
    pub failed: Vec<(String, String)>,
}

impl DeliveryReport {
    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty() && self.succeeded.len() == self.attempted
    }
}

/// Styling applied to a span of a [`ChatMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Bold,
    Code,
}

/// A styled span. `offset` and `length` count UTF-16 code units, as the Bot
/// API expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextEntity {
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub offset: usize,
    pub length: usize,
}

/// Plain message text plus the spans to style.
///
/// The text is never run through a markup parser, so SMS bodies containing
/// `_`, `*` or backticks arrive exactly as received.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatMessage {
    text: String,
    entities: Vec<TextEntity>,
}

impl ChatMessage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends unstyled text.
    pub fn plain(mut self, text: &str) -> Self {
        self.text.push_str(text);
        self
    }

    /// Appends text covered by one entity of `kind`.
    pub fn styled(mut self, kind: EntityKind, text: &str) -> Self {
        let length = utf16_len(text);
        if length > 0 {
            self.entities.push(TextEntity {
                kind,
                offset: utf16_len(&self.text),
                length,
            });
        }
        self.text.push_str(text);
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn entities(&self) -> &[TextEntity] {
        &self.entities
    }
}

fn utf16_len(text: &str) -> usize {
    text.encode_utf16().count()
}

/// A remote chat API able to post a message to one chat.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Posts `message` to `chat_id`.
    async fn send_message(&self, chat_id: &str, message: &ChatMessage)
        -> Result<(), DeliveryError>;
}
