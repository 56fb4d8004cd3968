//! MQTT client for the SMS topic
//!
//! This module owns the broker subscription: connecting, subscribing once the
//! broker acknowledges the connection, handing payloads to the decoder and
//! relay, and reconnecting after a fixed delay whenever anything goes wrong.

use crate::config::BrokerConfig;
use crate::core::ConnectionState;
use crate::decoder;
use crate::notification::relay::NotificationRelay;
use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Packet, QoS,
    SubscribeReasonCode,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Errors that end a broker session.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("connection refused by broker, return code {0}")]
    Refused(String),
    #[error("subscribe failed: {0}")]
    Subscribe(String),
}

/// An event surfaced by a broker session.
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerEvent {
    /// The broker answered the connect request.
    ConnAck { success: bool, code: String },
    /// The broker refused the subscription (for example an ACL denial).
    SubscribeRejected { code: String },
    /// A message was published on a subscribed topic.
    Message { topic: String, payload: Vec<u8> },
    /// Anything else (pings, acks, outgoing packets).
    Other,
}

/// Opens broker sessions. Abstracted so tests can script the broker.
#[async_trait]
pub trait BrokerTransport: Send + Sync {
    /// Starts a new session. Network I/O may be deferred to the first
    /// `next_event` call.
    async fn connect(&self) -> Result<Box<dyn BrokerSession>, BrokerError>;
}

/// One connection to the broker.
#[async_trait]
pub trait BrokerSession: Send {
    /// Waits for the next event. An error ends the session.
    async fn next_event(&mut self) -> Result<BrokerEvent, BrokerError>;

    /// Subscribes to `topic`.
    async fn subscribe(&mut self, topic: &str) -> Result<(), BrokerError>;
}

/// The `rumqttc` backed transport.
pub struct MqttTransport {
    config: BrokerConfig,
}

impl MqttTransport {
    pub fn new(config: BrokerConfig) -> Self {
        Self { config }
    }

    fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(
            self.config.client_id.clone(),
            self.config.host.clone(),
            self.config.port,
        );
        options.set_keep_alive(Duration::from_secs(self.config.keep_alive_secs.max(5)));
        options.set_clean_session(true);
        if let Some(username) = &self.config.username {
            options.set_credentials(
                username.clone(),
                self.config.password.clone().unwrap_or_default(),
            );
        }
        options
    }

    fn qos(&self) -> QoS {
        match self.config.qos {
            0 => QoS::AtMostOnce,
            1 => QoS::AtLeastOnce,
            2 => QoS::ExactlyOnce,
            other => {
                warn!(qos = other, "Invalid QoS level, using 0");
                QoS::AtMostOnce
            }
        }
    }
}

#[async_trait]
impl BrokerTransport for MqttTransport {
    async fn connect(&self) -> Result<Box<dyn BrokerSession>, BrokerError> {
        let (client, eventloop) = AsyncClient::new(self.options(), 10);
        Ok(Box::new(MqttSession {
            client,
            eventloop,
            qos: self.qos(),
        }))
    }
}

struct MqttSession {
    client: AsyncClient,
    eventloop: EventLoop,
    qos: QoS,
}

#[async_trait]
impl BrokerSession for MqttSession {
    async fn next_event(&mut self) -> Result<BrokerEvent, BrokerError> {
        match self.eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => Ok(BrokerEvent::ConnAck {
                success: ack.code == ConnectReturnCode::Success,
                code: format!("{:?}", ack.code),
            }),
            Ok(Event::Incoming(Packet::SubAck(ack))) => {
                match ack
                    .return_codes
                    .iter()
                    .find(|code| matches!(code, SubscribeReasonCode::Failure))
                {
                    Some(code) => Ok(BrokerEvent::SubscribeRejected {
                        code: format!("{:?}", code),
                    }),
                    None => Ok(BrokerEvent::Other),
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => Ok(BrokerEvent::Message {
                topic: publish.topic,
                payload: publish.payload.to_vec(),
            }),
            Ok(_) => Ok(BrokerEvent::Other),
            // rumqttc reports a refused CONNACK as an error; surface it as an
            // acknowledgement so the connector can log the return code.
            Err(ConnectionError::ConnectionRefused(code)) => Ok(BrokerEvent::ConnAck {
                success: false,
                code: format!("{:?}", code),
            }),
            Err(e) => Err(BrokerError::Connection(e.to_string())),
        }
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), BrokerError> {
        self.client
            .subscribe(topic, self.qos)
            .await
            .map_err(|e| BrokerError::Subscribe(e.to_string()))
    }
}

/// Keeps the subscription alive and feeds received payloads to the relay.
pub struct BrokerConnector {
    transport: Arc<dyn BrokerTransport>,
    address: String,
    topic: String,
    reconnect_delay: Duration,
    relay: NotificationRelay,
    announce_startup: bool,
    startup_announced: bool,
    state_tx: watch::Sender<ConnectionState>,
}

impl BrokerConnector {
    /// Creates a new connector.
    ///
    /// # Arguments
    /// * `transport` - opens broker sessions
    /// * `config` - broker address, topic and reconnect delay
    /// * `relay` - receives every decoded notification
    /// * `announce_startup` - send the liveness message after the first connection
    pub fn new(
        transport: Arc<dyn BrokerTransport>,
        config: &BrokerConfig,
        relay: NotificationRelay,
        announce_startup: bool,
    ) -> Self {
        Self {
            transport,
            address: format!("{}:{}", config.host, config.port),
            topic: config.topic.clone(),
            reconnect_delay: Duration::from_secs(config.reconnect_delay_secs),
            relay,
            announce_startup,
            startup_announced: false,
            state_tx: watch::channel(ConnectionState::Disconnected).0,
        }
    }

    /// Follows the connection state while `run` owns the connector.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Runs the connect/process/retry loop until `shutdown_rx` fires.
    ///
    /// Every failure is logged and followed by a fixed delay; there is no
    /// retry limit.
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        info!("Starting SMS to Telegram bridge...");
        loop {
            let result = tokio::select! {
                biased;
                _ = shutdown_rx.changed() => break,
                result = self.connect_and_run() => result,
            };

            if let Err(e) = result {
                error!(
                    "Connection failed: {}. Retrying in {} seconds...",
                    e,
                    self.reconnect_delay.as_secs()
                );
            }
            self.set_state(ConnectionState::Disconnected);
            metrics::counter!("broker_reconnects_total").increment(1);

            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => break,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }
        self.set_state(ConnectionState::Disconnected);
        info!("Broker connector received shutdown signal, exiting.");
    }

    /// Opens one session and processes it until it fails.
    async fn connect_and_run(&mut self) -> Result<(), BrokerError> {
        self.set_state(ConnectionState::Connecting);
        info!("Attempting to connect to MQTT broker at {}", self.address);
        let mut session = self.transport.connect().await?;

        loop {
            match session.next_event().await? {
                BrokerEvent::ConnAck { success: true, .. } => {
                    self.set_state(ConnectionState::Connected);
                    info!("Connected to MQTT Broker at {}", self.address);
                    session.subscribe(&self.topic).await?;
                    info!("Subscribed to topic: {}", self.topic);
                    self.maybe_announce_startup();
                }
                BrokerEvent::ConnAck { success: false, code } => {
                    error!(code = %code, "Failed to connect to MQTT, return code {}", code);
                    return Err(BrokerError::Refused(code));
                }
                BrokerEvent::SubscribeRejected { code } => {
                    error!(
                        code = %code,
                        "Broker rejected subscription to {}, return code {}",
                        self.topic, code
                    );
                    return Err(BrokerError::Subscribe(format!("rejected with {}", code)));
                }
                BrokerEvent::Message { topic, payload } => self.handle_message(&topic, &payload),
                BrokerEvent::Other => {}
            }
        }
    }

    /// Decodes and hands off one payload without waiting for delivery.
    fn handle_message(&self, topic: &str, payload: &[u8]) {
        if !topic_matches(&self.topic, topic) {
            debug!(topic, "Ignoring message on unexpected topic");
            return;
        }
        metrics::counter!("sms_received_total").increment(1);
        if let Some(notification) = decoder::decode_and_log(payload) {
            // Fire and forget; the handle is not awaited.
            let _ = self.relay.submit(notification);
        }
    }

    fn maybe_announce_startup(&mut self) {
        if !self.announce_startup || self.startup_announced {
            return;
        }
        self.startup_announced = true;
        if self.relay.announce_startup(&self.topic).is_none() {
            debug!("Outbound delivery not configured, skipping startup notification");
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            info!(from = %previous, to = %state, "Broker connection state changed");
        }
    }
}

/// MQTT topic filter matching with `+` and `#` wildcards.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');
    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}
