//! The main application logic, decoupled from the entry point.

use crate::{
    broker::{BrokerConnector, BrokerTransport, MqttTransport},
    config::Config,
    core::{ChatClient, RecipientSet},
    notification::relay::NotificationRelay,
    task_manager::TaskManager,
};
use anyhow::Result;
use std::{sync::Arc, time::Duration};
use tokio::sync::watch;
use tracing::{info, instrument};

/// How long running tasks get to finish after the shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// A handle to the running application.
pub struct App {
    task_manager: TaskManager,
}

impl App {
    /// Creates a new `AppBuilder` to construct an `App`.
    pub fn builder(config: Config) -> AppBuilder {
        AppBuilder::new(config)
    }

    /// Waits for the shutdown signal and then stops all tasks.
    pub async fn run(self) -> Result<()> {
        let mut shutdown_rx = self.task_manager.get_shutdown_rx();
        while !*shutdown_rx.borrow_and_update() {
            if shutdown_rx.changed().await.is_err() {
                break;
            }
        }
        info!("Shutdown signal received. Waiting for tasks to complete...");

        self.task_manager.shutdown(SHUTDOWN_GRACE).await;
        Ok(())
    }
}

/// Builder for the bridge.
///
/// Wires the relay and the broker connector from one immutable `Config`, and
/// lets tests replace the broker transport and the chat client.
pub struct AppBuilder {
    config: Config,
    transport_override: Option<Arc<dyn BrokerTransport>>,
    chat_client_override: Option<Arc<dyn ChatClient>>,
}

impl AppBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            transport_override: None,
            chat_client_override: None,
        }
    }

    /// Overrides the MQTT transport for testing.
    pub fn transport_override(mut self, transport: Arc<dyn BrokerTransport>) -> Self {
        self.transport_override = Some(transport);
        self
    }

    /// Overrides the Telegram client for testing. The credential check is
    /// skipped; recipients still come from the configuration.
    pub fn chat_client_override(mut self, client: Arc<dyn ChatClient>) -> Self {
        self.chat_client_override = Some(client);
        self
    }

    /// Builds all components and spawns the broker connector.
    #[instrument(skip_all)]
    pub async fn build(self, shutdown_rx: watch::Receiver<bool>) -> Result<App> {
        let config = self.config;
        let task_manager = TaskManager::new(shutdown_rx);

        let relay = match self.chat_client_override {
            Some(client) => {
                NotificationRelay::new(Some(client), RecipientSet::new(&config.telegram.chat_ids))
            }
            None => NotificationRelay::from_config(&config.telegram),
        };

        let transport = self
            .transport_override
            .unwrap_or_else(|| Arc::new(MqttTransport::new(config.broker.clone())) as Arc<dyn BrokerTransport>);

        let connector = BrokerConnector::new(
            transport,
            &config.broker,
            relay,
            config.telegram.startup_notification,
        );
        task_manager.spawn("BrokerConnector", connector.run(task_manager.get_shutdown_rx()));

        info!("Bridge initialized. Waiting for SMS on {}...", config.broker.topic);
        Ok(App { task_manager })
    }
}
