#![allow(dead_code)]
pub mod mock_broker;
pub mod mock_chat;

use smsbridge::config::Config;

/// A config with two recipients and the startup message disabled.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.telegram.chat_ids = vec!["111".to_string(), "222".to_string()];
    config.telegram.startup_notification = false;
    config
}
