//! Command-Line Interface (CLI) argument parsing.
//!
//! This module defines the command-line arguments for the application using the
//! `clap` crate. These arguments are parsed at startup and then merged on top of
//! the configuration file and the environment.

use clap::Parser;
use figment::{
    value::{Dict, Map, Value},
    Error, Metadata, Profile, Provider,
};
use std::path::PathBuf;

/// Relays SMS notifications from an MQTT topic to Telegram chats.
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Hostname of the MQTT broker.
    #[arg(long, value_name = "HOST")]
    pub broker_host: Option<String>,

    /// Port of the MQTT broker.
    #[arg(long, value_name = "PORT")]
    pub broker_port: Option<u16>,

    /// Topic carrying the SMS payloads.
    #[arg(long, value_name = "TOPIC")]
    pub topic: Option<String>,

    /// Comma-separated list of Telegram chat ids.
    #[arg(long, value_name = "IDS")]
    pub chat_ids: Option<String>,

    /// Log level filter (e.g. "debug", "info,rumqttc=warn").
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Periodically log internal metrics.
    #[arg(long)]
    pub log_metrics: bool,
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut dict = Dict::new();
        let mut broker = Dict::new();
        let mut telegram = Dict::new();
        let mut metrics = Dict::new();

        if let Some(host) = &self.broker_host {
            broker.insert("host".into(), Value::from(host.clone()));
        }
        if let Some(port) = self.broker_port {
            broker.insert("port".into(), Value::from(port));
        }
        if let Some(topic) = &self.topic {
            broker.insert("topic".into(), Value::from(topic.clone()));
        }
        if let Some(ids) = &self.chat_ids {
            telegram.insert("chat_ids".into(), Value::from(ids.clone()));
        }
        if let Some(level) = &self.log_level {
            dict.insert("log_level".into(), Value::from(level.clone()));
        }
        // A bare flag can only switch the metrics log on, never off.
        if self.log_metrics {
            metrics.insert("log_metrics".into(), Value::from(true));
        }

        for (section, values) in [("broker", broker), ("telegram", telegram), ("metrics", metrics)] {
            if !values.is_empty() {
                dict.insert(section.into(), Value::from(values));
            }
        }

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}
