// src/formatting.rs

use crate::core::{ChatMessage, EntityKind, Notification};

/// A trait for rendering notifications into chat messages.
pub trait TextFormatter: Send + Sync {
    fn format_notification(&self, notification: &Notification) -> ChatMessage;

    /// The one-time liveness message sent after startup.
    fn format_startup(&self, topic: &str) -> ChatMessage;
}

/// Renders the Telegram layout: bold labels, the sender as a code span and
/// the body appended untouched.
///
/// Styling travels as message entities; the body is never parsed as markup.
pub struct TelegramFormatter;

impl TextFormatter for TelegramFormatter {
    fn format_notification(&self, notification: &Notification) -> ChatMessage {
        ChatMessage::new()
            .plain("\u{1F4E9} ")
            .styled(EntityKind::Bold, "New SMS Received")
            .plain("\n\n\u{1F464} ")
            .styled(EntityKind::Bold, "From:")
            .plain(" ")
            .styled(EntityKind::Code, notification.sender())
            .plain("\n\u{1F4C4} ")
            .styled(EntityKind::Bold, "Message:")
            .plain("\n")
            .plain(notification.body())
    }

    fn format_startup(&self, topic: &str) -> ChatMessage {
        ChatMessage::new()
            .plain("\u{2705} ")
            .styled(EntityKind::Bold, "SMS bridge started")
            .plain("\n\nListening on ")
            .styled(EntityKind::Code, topic)
    }
}
