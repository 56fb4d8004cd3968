//! Internal counters for the bridge.
//!
//! Counters are recorded through the `metrics` facade at their call sites.
//! Nothing is exported over the network; when `metrics.log_metrics` is set the
//! [`logging_recorder::LoggingRecorder`] is installed and prints a snapshot of
//! every counter at a fixed interval.
pub mod logging_recorder;

use metrics::Unit;

/// Registers descriptions for every counter the bridge records.
pub fn describe_metrics() {
    metrics::describe_counter!("sms_received_total", Unit::Count, "Messages received on the SMS topic.");
    metrics::describe_counter!("sms_decode_failures_total", Unit::Count, "Payloads dropped by the decoder, labeled by reason.");
    metrics::describe_counter!("deliveries_succeeded_total", Unit::Count, "Per-recipient deliveries accepted by the chat API.");
    metrics::describe_counter!("deliveries_failed_total", Unit::Count, "Per-recipient deliveries that failed.");
    metrics::describe_counter!("broker_reconnects_total", Unit::Count, "Broker sessions that ended and were retried.");
}
