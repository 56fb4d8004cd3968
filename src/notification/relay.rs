//! Fan-out of decoded notifications to every configured chat.

use crate::config::TelegramConfig;
use crate::core::{ChatClient, ChatMessage, DeliveryReport, Notification, RecipientSet};
use crate::formatting::{TelegramFormatter, TextFormatter};
use crate::notification::telegram::TelegramClient;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// Sends every notification to all recipients concurrently.
///
/// Cheap to clone; clones share the client, recipient list and formatter.
/// A relay without a client or without recipients still accepts work but
/// drops it with an error log.
#[derive(Clone)]
pub struct NotificationRelay {
    client: Option<Arc<dyn ChatClient>>,
    recipients: RecipientSet,
    formatter: Arc<dyn TextFormatter>,
}

impl NotificationRelay {
    /// Creates a relay over an arbitrary chat client.
    ///
    /// `client` is `None` when no usable credential is configured.
    pub fn new(client: Option<Arc<dyn ChatClient>>, recipients: RecipientSet) -> Self {
        if client.is_none() {
            warn!("Telegram bot token not configured, notifications will not be delivered.");
        }
        if recipients.is_empty() {
            warn!("No Telegram chat ids configured, notifications will not be delivered.");
        }
        Self {
            client,
            recipients,
            formatter: Arc::new(TelegramFormatter),
        }
    }

    /// Builds the production relay backed by the Telegram Bot API.
    ///
    /// A client that cannot be built leaves the relay disabled instead of
    /// failing startup.
    pub fn from_config(config: &TelegramConfig) -> Self {
        let client = config.usable_token().and_then(|token| {
            match TelegramClient::new(
                &config.api_base_url,
                token,
                Duration::from_secs(config.timeout_secs),
            ) {
                Ok(client) => Some(Arc::new(client) as Arc<dyn ChatClient>),
                Err(e) => {
                    error!(error = %e, "Failed to create Telegram client, notifications will not be delivered.");
                    None
                }
            }
        });
        Self::new(client, RecipientSet::new(&config.chat_ids))
    }

    /// True when a credential and at least one recipient are configured.
    pub fn is_enabled(&self) -> bool {
        self.client.is_some() && !self.recipients.is_empty()
    }

    /// Hands a notification off to a background task and returns immediately.
    ///
    /// The handle may be dropped; delivery continues regardless.
    pub fn submit(&self, notification: Notification) -> JoinHandle<DeliveryReport> {
        let relay = self.clone();
        tokio::spawn(async move { relay.deliver(&notification).await })
    }

    /// Sends the liveness message in the background. `None` when delivery is
    /// not configured.
    pub fn announce_startup(&self, topic: &str) -> Option<JoinHandle<DeliveryReport>> {
        if !self.is_enabled() {
            return None;
        }
        let message = Arc::new(self.formatter.format_startup(topic));
        let relay = self.clone();
        Some(tokio::spawn(async move {
            let report = relay.fan_out(message).await;
            info!(
                succeeded = report.succeeded.len(),
                failed = report.failed.len(),
                "Startup notification sent."
            );
            report
        }))
    }

    /// Formats and delivers one notification, waiting for every recipient.
    #[instrument(skip_all, fields(sender = %notification.sender()))]
    pub async fn deliver(&self, notification: &Notification) -> DeliveryReport {
        let message = Arc::new(self.formatter.format_notification(notification));
        let report = self.fan_out(message).await;
        if report.attempted > 0 {
            info!(
                succeeded = report.succeeded.len(),
                failed = report.failed.len(),
                "Forwarded SMS from {} to Telegram.",
                notification.sender()
            );
        }
        report
    }

    /// One independent task per recipient; a failure is logged and recorded
    /// for that recipient only.
    async fn fan_out(&self, message: Arc<ChatMessage>) -> DeliveryReport {
        let Some(client) = &self.client else {
            error!("Telegram bot token not configured!");
            return DeliveryReport::default();
        };
        if self.recipients.is_empty() {
            error!("No Telegram chat ids configured!");
            return DeliveryReport::default();
        }

        let tasks = self.recipients.iter().map(|chat_id| {
            let client = client.clone();
            let message = message.clone();
            let chat_id = chat_id.to_string();
            tokio::spawn(async move { client.send_message(&chat_id, &message).await })
        });
        let results = join_all(tasks).await;

        let mut report = DeliveryReport {
            attempted: self.recipients.len(),
            ..Default::default()
        };
        for (chat_id, result) in self.recipients.iter().zip(results) {
            match result {
                Ok(Ok(())) => {
                    debug!(recipient = %chat_id, "Delivered message.");
                    metrics::counter!("deliveries_succeeded_total").increment(1);
                    report.succeeded.push(chat_id.to_string());
                }
                Ok(Err(e)) => {
                    error!(recipient = %chat_id, error = %e, "Failed to send Telegram message");
                    metrics::counter!("deliveries_failed_total").increment(1);
                    report.failed.push((chat_id.to_string(), e.to_string()));
                }
                Err(e) => {
                    error!(recipient = %chat_id, error = %e, "Delivery task failed");
                    metrics::counter!("deliveries_failed_total").increment(1);
                    report.failed.push((chat_id.to_string(), e.to_string()));
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::DeliveryError;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tracing_test::traced_test;

    // Records every call; fails for the chat ids listed in `failing`.
    #[derive(Default)]
    struct FakeChatClient {
        sent: Mutex<Vec<(String, String)>>,
        failing: Vec<String>,
    }

    #[async_trait]
    impl ChatClient for FakeChatClient {
        async fn send_message(
            &self,
            chat_id: &str,
            message: &ChatMessage,
        ) -> Result<(), DeliveryError> {
            self.sent
                .lock()
                .unwrap()
                .push((chat_id.to_string(), message.text().to_string()));
            if self.failing.iter().any(|id| id == chat_id) {
                return Err(DeliveryError::Api {
                    description: "chat not found".to_string(),
                });
            }
            Ok(())
        }
    }

    fn relay_over(client: &Arc<FakeChatClient>, ids: &[&str]) -> NotificationRelay {
        let client: Arc<dyn ChatClient> = client.clone();
        NotificationRelay::new(Some(client), RecipientSet::new(ids))
    }

    fn notification() -> Notification {
        Notification::new("+15551234", "Hello").unwrap()
    }

    #[tokio::test]
    async fn test_deliver_reaches_every_recipient() {
        let client = Arc::new(FakeChatClient::default());
        let relay = relay_over(&client, &["111", "222", "333"]);

        let report = relay.deliver(&notification()).await;

        assert_eq!(report.attempted, 3);
        assert!(report.is_complete_success());
        let mut chats: Vec<String> = client
            .sent
            .lock()
            .unwrap()
            .iter()
            .map(|(id, text)| {
                assert!(text.contains("+15551234"));
                assert!(text.contains("Hello"));
                id.clone()
            })
            .collect();
        chats.sort();
        assert_eq!(chats, vec!["111", "222", "333"]);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_deliver_isolates_failed_recipient() {
        let client = Arc::new(FakeChatClient {
            failing: vec!["222".to_string()],
            ..Default::default()
        });
        let relay = relay_over(&client, &["111", "222", "333"]);

        let report = relay.deliver(&notification()).await;

        assert_eq!(report.attempted, 3);
        assert_eq!(report.succeeded, vec!["111", "333"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "222");
        assert_eq!(client.sent.lock().unwrap().len(), 3);
        assert!(logs_contain("Failed to send Telegram message"));
        assert!(logs_contain("chat not found"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_missing_credential_makes_no_calls() {
        let relay = NotificationRelay::new(None, RecipientSet::new(["111"]));

        let report = relay.deliver(&notification()).await;

        assert!(!relay.is_enabled());
        assert_eq!(report.attempted, 0);
        assert!(logs_contain("Telegram bot token not configured"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_empty_recipients_make_no_calls() {
        let client = Arc::new(FakeChatClient::default());
        let relay = relay_over(&client, &["", " "]);

        let report = relay.deliver(&notification()).await;

        assert_eq!(report.attempted, 0);
        assert!(client.sent.lock().unwrap().is_empty());
        assert!(logs_contain("No Telegram chat ids configured!"));
    }

    #[tokio::test]
    async fn test_placeholder_token_disables_relay() {
        let config = TelegramConfig {
            bot_token: Some(crate::config::PLACEHOLDER_BOT_TOKEN.to_string()),
            chat_ids: vec!["111".to_string()],
            ..Default::default()
        };

        let relay = NotificationRelay::from_config(&config);

        assert!(!relay.is_enabled());
        assert!(relay.announce_startup("sim_bridge/sms").is_none());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_unbuildable_client_disables_relay() {
        let config = TelegramConfig {
            bot_token: Some("42:secret".to_string()),
            chat_ids: vec!["111".to_string()],
            api_base_url: "not a url".to_string(),
            ..Default::default()
        };

        let relay = NotificationRelay::from_config(&config);
        let report = relay.deliver(&notification()).await;

        assert!(!relay.is_enabled());
        assert_eq!(report.attempted, 0);
        assert!(logs_contain("Failed to create Telegram client"));
    }

    #[tokio::test]
    async fn test_submit_delivers_in_background() {
        let client = Arc::new(FakeChatClient::default());
        let relay = relay_over(&client, &["111"]);

        let handle = relay.submit(notification());
        let report = handle.await.unwrap();

        assert_eq!(report.succeeded, vec!["111"]);
    }
}
