//! Decoding of raw SMS payloads received from the broker.
//!
//! The modem firmware publishes a JSON object such as
//! `{"sender":"+15551234","message":"Hello"}`. Both fields are optional on the
//! wire; a missing sender becomes [`UNKNOWN_SENDER`] and a missing or empty
//! message means there is nothing to relay.

use crate::core::{Notification, UNKNOWN_SENDER};
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, warn};

/// Reasons a payload does not produce a [`Notification`].
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("payload is a JSON {0}, expected an object")]
    NotAnObject(&'static str),
    #[error("empty message content")]
    EmptyMessage,
}

/// Parses a raw payload into a notification.
pub fn decode(payload: &[u8]) -> Result<Notification, DecodeError> {
    let text = std::str::from_utf8(payload)?;
    let value: Value = serde_json::from_str(text)?;
    let fields = match value {
        Value::Object(fields) => fields,
        other => return Err(DecodeError::NotAnObject(json_kind(&other))),
    };

    let sender = field_text(fields.get("sender")).unwrap_or_else(|| UNKNOWN_SENDER.to_string());
    let body = field_text(fields.get("message")).unwrap_or_default();

    Notification::new(sender, body).ok_or(DecodeError::EmptyMessage)
}

/// Decodes a payload and logs why it was dropped when it was.
///
/// Never fails: rejected payloads are logged and yield `None`.
pub fn decode_and_log(payload: &[u8]) -> Option<Notification> {
    info!(
        payload = %String::from_utf8_lossy(payload),
        "Received MQTT message"
    );
    match decode(payload) {
        Ok(notification) => Some(notification),
        Err(DecodeError::EmptyMessage) => {
            warn!("Received empty message content.");
            metrics::counter!("sms_decode_failures_total", "reason" => "empty").increment(1);
            None
        }
        Err(e @ DecodeError::InvalidUtf8(_)) => {
            error!(error = %e, "Failed to decode payload text");
            metrics::counter!("sms_decode_failures_total", "reason" => "utf8").increment(1);
            None
        }
        Err(e @ DecodeError::InvalidJson(_)) => {
            error!(error = %e, "Failed to decode JSON payload");
            metrics::counter!("sms_decode_failures_total", "reason" => "json").increment(1);
            None
        }
        Err(e @ DecodeError::NotAnObject(_)) => {
            error!(error = %e, "Error processing message");
            metrics::counter!("sms_decode_failures_total", "reason" => "shape").increment(1);
            None
        }
    }
}

/// Strings are taken verbatim, `null` counts as absent and any other value
/// is rendered as JSON text.
fn field_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
