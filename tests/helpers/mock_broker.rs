//! A scripted broker transport for testing the connector.
use async_trait::async_trait;
use smsbridge::broker::{BrokerError, BrokerEvent, BrokerSession, BrokerTransport};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::Instant;

/// What one call to `connect` should produce.
pub enum Attempt {
    /// `connect` itself fails.
    Fail(&'static str),
    /// A session that yields these events, then blocks forever.
    Session(Vec<Result<BrokerEvent, BrokerError>>),
}

pub fn connack_ok() -> Result<BrokerEvent, BrokerError> {
    Ok(BrokerEvent::ConnAck {
        success: true,
        code: "Success".to_string(),
    })
}

pub fn connack_refused() -> Result<BrokerEvent, BrokerError> {
    Ok(BrokerEvent::ConnAck {
        success: false,
        code: "NotAuthorized".to_string(),
    })
}

pub fn suback_rejected() -> Result<BrokerEvent, BrokerError> {
    Ok(BrokerEvent::SubscribeRejected {
        code: "Failure".to_string(),
    })
}

pub fn publish(topic: &str, payload: &[u8]) -> Result<BrokerEvent, BrokerError> {
    Ok(BrokerEvent::Message {
        topic: topic.to_string(),
        payload: payload.to_vec(),
    })
}

pub fn dropped() -> Result<BrokerEvent, BrokerError> {
    Err(BrokerError::Connection("connection reset by peer".to_string()))
}

/// Plays back one `Attempt` per `connect` call. Once the script is used up,
/// every further connection hangs without events.
pub struct ScriptedTransport {
    attempts: Mutex<VecDeque<Attempt>>,
    subscriptions: Arc<Mutex<Vec<String>>>,
    connect_tx: mpsc::UnboundedSender<Instant>,
}

impl ScriptedTransport {
    /// Returns the transport and a receiver yielding the time of every
    /// connection attempt.
    pub fn new(attempts: Vec<Attempt>) -> (Arc<Self>, mpsc::UnboundedReceiver<Instant>) {
        let (connect_tx, connect_rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            attempts: Mutex::new(attempts.into()),
            subscriptions: Arc::new(Mutex::new(Vec::new())),
            connect_tx,
        });
        (transport, connect_rx)
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrokerTransport for ScriptedTransport {
    async fn connect(&self) -> Result<Box<dyn BrokerSession>, BrokerError> {
        let _ = self.connect_tx.send(Instant::now());
        let attempt = self.attempts.lock().unwrap().pop_front();
        let events = match attempt {
            Some(Attempt::Fail(reason)) => {
                return Err(BrokerError::Connection(reason.to_string()))
            }
            Some(Attempt::Session(events)) => events.into(),
            None => VecDeque::new(),
        };
        Ok(Box::new(ScriptedSession {
            events,
            subscriptions: self.subscriptions.clone(),
        }))
    }
}

struct ScriptedSession {
    events: VecDeque<Result<BrokerEvent, BrokerError>>,
    subscriptions: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl BrokerSession for ScriptedSession {
    async fn next_event(&mut self) -> Result<BrokerEvent, BrokerError> {
        match self.events.pop_front() {
            Some(event) => event,
            None => std::future::pending().await,
        }
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), BrokerError> {
        self.subscriptions.lock().unwrap().push(topic.to_string());
        Ok(())
    }
}
