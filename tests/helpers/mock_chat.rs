//! A chat client that records deliveries instead of calling Telegram.
use async_trait::async_trait;
use smsbridge::core::{ChatClient, ChatMessage};
use smsbridge::notification::DeliveryError;
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
pub struct Sent {
    pub chat_id: String,
    pub text: String,
}

pub struct RecordingChatClient {
    failing: HashSet<String>,
    hang: bool,
    sent_tx: mpsc::UnboundedSender<Sent>,
    sent_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Sent>>,
    attempts: Mutex<usize>,
}

impl RecordingChatClient {
    pub fn new() -> Self {
        Self::failing_for(&[])
    }

    /// Deliveries to the given chat ids fail with an API error.
    pub fn failing_for(chat_ids: &[&str]) -> Self {
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        Self {
            failing: chat_ids.iter().map(|id| id.to_string()).collect(),
            hang: false,
            sent_tx,
            sent_rx: tokio::sync::Mutex::new(sent_rx),
            attempts: Mutex::new(0),
        }
    }

    /// Every `send_message` call is counted and then never completes.
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::new()
        }
    }

    /// Number of `send_message` calls, failed ones included.
    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }

    /// Polls until `count` calls have started or `timeout` elapses, returning
    /// the last observed count.
    pub async fn wait_for_attempts(&self, count: usize, timeout: Duration) -> usize {
        let _ = tokio::time::timeout(timeout, async {
            while self.attempts() < count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        self.attempts()
    }

    /// Waits for `count` successful deliveries or until `timeout` elapses.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> Vec<Sent> {
        let mut rx = self.sent_rx.lock().await;
        let mut sent = Vec::new();
        let _ = tokio::time::timeout(timeout, async {
            while sent.len() < count {
                match rx.recv().await {
                    Some(message) => sent.push(message),
                    None => break,
                }
            }
        })
        .await;
        sent
    }
}

#[async_trait]
impl ChatClient for RecordingChatClient {
    async fn send_message(&self, chat_id: &str, message: &ChatMessage) -> Result<(), DeliveryError> {
        *self.attempts.lock().unwrap() += 1;
        if self.hang {
            std::future::pending::<()>().await;
        }
        if self.failing.contains(chat_id) {
            return Err(DeliveryError::Api {
                description: "Bad Request: chat not found".to_string(),
            });
        }
        let _ = self.sent_tx.send(Sent {
            chat_id: chat_id.to_string(),
            text: message.text().to_string(),
        });
        Ok(())
    }
}
