//! smsbridge - relays SMS notifications from MQTT to Telegram
//!
//! The modem firmware publishes every received SMS as a small JSON document on
//! a broker topic. This library subscribes to that topic, decodes each payload
//! and forwards it to every configured Telegram chat.

pub mod app;
pub mod broker;
pub mod cli;
pub mod config;
pub mod core;
pub mod decoder;
pub mod formatting;
pub mod internal_metrics;
pub mod notification;
pub mod task_manager;

// Re-export core types for convenience
pub use crate::core::*;
