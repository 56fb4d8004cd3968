//! Outbound delivery of notifications to chat recipients.
//!
//! The [`relay::NotificationRelay`] formats each decoded SMS once and fans it
//! out to every configured chat through a [`crate::core::ChatClient`], the
//! production implementation of which is [`telegram::TelegramClient`].
pub mod relay;
pub mod telegram;

use thiserror::Error;

/// Failure of a single delivery to a single recipient.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The request never produced a response (connect error, timeout, ...).
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// The API answered with a non-success status code.
    #[error("unexpected status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    /// The API answered 2xx but reported `ok: false`.
    #[error("API rejected the message: {description}")]
    Api { description: String },
    /// The configured API root is not an absolute URL.
    #[error("invalid API base URL: {0}")]
    InvalidBaseUrl(String),
}

impl DeliveryError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, DeliveryError::Transport(e) if e.is_timeout())
    }
}
