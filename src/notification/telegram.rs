//! A client for sending messages through the Telegram Bot API.

use super::DeliveryError;
use crate::core::{ChatClient, ChatMessage};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, instrument};

/// Subset of the Bot API response envelope.
#[derive(Deserialize)]
struct ApiResponse {
    ok: bool,
    description: Option<String>,
}

/// A client for posting text messages with `sendMessage`.
pub struct TelegramClient {
    http: reqwest::Client,
    base_url: String,
    bot_token: String,
}

impl TelegramClient {
    /// Creates a new `TelegramClient`.
    ///
    /// # Arguments
    /// * `base_url` - API root, normally `https://api.telegram.org`
    /// * `bot_token` - the bot credential, embedded in the request path
    /// * `timeout` - upper bound for each request
    pub fn new(base_url: &str, bot_token: &str, timeout: Duration) -> Result<Self, DeliveryError> {
        reqwest::Url::parse(base_url).map_err(|e| DeliveryError::InvalidBaseUrl(e.to_string()))?;
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            bot_token: bot_token.to_string(),
        })
    }

    fn send_message_url(&self) -> String {
        format!("{}/bot{}/sendMessage", self.base_url, self.bot_token)
    }
}

#[async_trait]
impl ChatClient for TelegramClient {
    #[instrument(skip(self, message), fields(len = message.text().len()))]
    async fn send_message(&self, chat_id: &str, message: &ChatMessage) -> Result<(), DeliveryError> {
        let payload = json!({
            "chat_id": chat_id,
            "text": message.text(),
            "entities": message.entities(),
        });

        // The token is part of the URL, keep it out of error messages.
        let response = self
            .http
            .post(self.send_message_url())
            .json(&payload)
            .send()
            .await
            .map_err(reqwest::Error::without_url)?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(reqwest::Error::without_url)?;

        if !status.is_success() {
            return Err(DeliveryError::Status { status, body });
        }

        match serde_json::from_str::<ApiResponse>(&body) {
            Ok(ApiResponse { ok: false, description }) => Err(DeliveryError::Api {
                description: description.unwrap_or_else(|| "no description".to_string()),
            }),
            Ok(_) => Ok(()),
            Err(e) => {
                debug!(error = %e, "Unparseable success response, assuming delivered");
                Ok(())
            }
        }
    }
}
