//! Configuration management for the SMS bridge
//!
//! This module defines the main `Config` struct and its sub-structs,
//! responsible for holding all application settings. It uses the `figment`
//! crate to layer defaults, an optional `smsbridge.toml` file, the legacy
//! environment variables used by the bridge deployment scripts, prefixed
//! environment variables and finally command-line arguments.

use crate::cli::Cli;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Deserializer, Serialize};

/// Token value shipped in the sample deployment; treated as "not configured".
pub const PLACEHOLDER_BOT_TOKEN: &str = "YOUR_TELEGRAM_BOT_TOKEN";

/// The main configuration struct for the application.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// The logging level for the application.
    pub log_level: String,
    /// Configuration for the MQTT broker subscription.
    pub broker: BrokerConfig,
    /// Configuration for outbound Telegram delivery.
    pub telegram: TelegramConfig,
    /// Configuration for the periodic metrics log.
    pub metrics: MetricsConfig,
}

/// Configuration for the MQTT broker subscription.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct BrokerConfig {
    /// Hostname or IP address of the broker.
    pub host: String,
    /// TCP port of the broker.
    pub port: u16,
    /// The topic the modem firmware publishes SMS payloads to.
    pub topic: String,
    /// MQTT client identifier.
    pub client_id: String,
    /// MQTT keep-alive interval in seconds.
    pub keep_alive_secs: u64,
    /// Fixed delay between reconnection attempts, in seconds.
    pub reconnect_delay_secs: u64,
    /// Optional broker username.
    pub username: Option<String>,
    /// Optional broker password.
    pub password: Option<String>,
    /// Subscription QoS level (0, 1 or 2).
    pub qos: u8,
}

/// Configuration for outbound Telegram delivery.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot API token. Absent or placeholder disables delivery.
    pub bot_token: Option<String>,
    /// Recipient chat identifiers. Accepts a list or a comma-separated string.
    #[serde(deserialize_with = "deserialize_chat_ids")]
    pub chat_ids: Vec<String>,
    /// Base URL of the Bot API.
    pub api_base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Send a one-time "bridge started" message after the first broker connection.
    pub startup_notification: bool,
}

/// Configuration for the periodic metrics log.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Log metrics to the console periodically.
    pub log_metrics: bool,
    /// Interval between metric snapshots, in seconds.
    pub log_interval_secs: u64,
}

impl TelegramConfig {
    /// Returns the bot token if one is configured and is not the placeholder.
    pub fn usable_token(&self) -> Option<&str> {
        self.bot_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty() && *token != PLACEHOLDER_BOT_TOKEN)
    }
}

impl Config {
    /// Loads the application configuration.
    ///
    /// Sources are merged in increasing priority: built-in defaults, the TOML
    /// file given on the command line, the legacy `MQTT_*`/`TELEGRAM_*`
    /// variables, `SMSBRIDGE_`-prefixed variables (`__` separates sections,
    /// e.g. `SMSBRIDGE_BROKER__PORT=1884`) and the command-line flags.
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));
        if let Some(path) = &cli.config {
            figment = figment.merge(Toml::file(path));
        }
        let config: Config = figment
            .merge(legacy_env())
            .merge(Env::prefixed("SMSBRIDGE_").split("__"))
            .merge(cli.clone())
            .extract()?;
        Ok(config)
    }
}

/// Maps the unprefixed variable names used by older deployments onto config keys.
fn legacy_env() -> Env {
    Env::raw()
        .only(&[
            "MQTT_BROKER",
            "MQTT_PORT",
            "TELEGRAM_BOT_TOKEN",
            "TELEGRAM_CHAT_ID",
        ])
        .map(|key| {
            match key.as_str().to_ascii_uppercase().as_str() {
                "MQTT_BROKER" => "broker.host",
                "MQTT_PORT" => "broker.port",
                "TELEGRAM_BOT_TOKEN" => "telegram.bot_token",
                _ => "telegram.chat_ids",
            }
            .into()
        })
}

/// Splits a comma-separated recipient string, dropping blank entries.
pub fn split_chat_ids(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

fn deserialize_chat_ids<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ChatIds {
        Joined(String),
        Number(i64),
        List(Vec<ChatId>),
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ChatId {
        Text(String),
        Number(i64),
    }

    let ids = match ChatIds::deserialize(deserializer)? {
        ChatIds::Joined(raw) => split_chat_ids(&raw),
        ChatIds::Number(id) => vec![id.to_string()],
        ChatIds::List(list) => list
            .into_iter()
            .map(|id| match id {
                ChatId::Text(text) => text.trim().to_string(),
                ChatId::Number(n) => n.to_string(),
            })
            .filter(|id| !id.is_empty())
            .collect(),
    };
    Ok(ids)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            broker: BrokerConfig::default(),
            telegram: TelegramConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            topic: "sim_bridge/sms".to_string(),
            client_id: "smsbridge".to_string(),
            keep_alive_secs: 60,
            reconnect_delay_secs: 5,
            username: None,
            password: None,
            qos: 0,
        }
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            chat_ids: Vec::new(),
            api_base_url: "https://api.telegram.org".to_string(),
            timeout_secs: 10,
            startup_notification: true,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            log_metrics: false,
            log_interval_secs: 60,
        }
    }
}
