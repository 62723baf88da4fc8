//! Metrics instrumentation for the subscription core.
//!
//! Recorded through the `metrics` facade; installing an exporter is left
//! to the embedding application.

use metrics::{counter, gauge};

/// Metric names.
pub mod names {
    pub const ENVELOPES_TOTAL: &str = "tally_envelopes_total";
    pub const MESSAGES_TOTAL: &str = "tally_messages_total";
    pub const DELIVERIES_TOTAL: &str = "tally_deliveries_total";
    pub const DELIVERIES_DROPPED_TOTAL: &str = "tally_deliveries_dropped_total";
    pub const DECODE_ERRORS_TOTAL: &str = "tally_decode_errors_total";
    pub const SUBSCRIPTIONS_ACTIVE: &str = "tally_subscriptions_active";
}

/// Describe all metrics to the installed recorder.
pub fn describe_metrics() {
    metrics::describe_counter!(names::ENVELOPES_TOTAL, "Total number of envelopes routed");
    metrics::describe_counter!(names::MESSAGES_TOTAL, "Total number of envelope messages seen");
    metrics::describe_counter!(
        names::DELIVERIES_TOTAL,
        "Total number of payloads and status events handed to sinks"
    );
    metrics::describe_counter!(
        names::DELIVERIES_DROPPED_TOTAL,
        "Deliveries dropped because the sink was full or closed"
    );
    metrics::describe_counter!(names::DECODE_ERRORS_TOTAL, "Envelopes rejected by the decoder");
    metrics::describe_gauge!(
        names::SUBSCRIPTIONS_ACTIVE,
        "Current number of tracked subscriptions"
    );
}

/// Record a routed envelope.
pub fn record_envelope(messages: usize) {
    counter!(names::ENVELOPES_TOTAL).increment(1);
    counter!(names::MESSAGES_TOTAL).increment(messages as u64);
}

/// Record a delivery attempt.
pub fn record_delivery(delivered: bool) {
    if delivered {
        counter!(names::DELIVERIES_TOTAL).increment(1);
    } else {
        counter!(names::DELIVERIES_DROPPED_TOTAL).increment(1);
    }
}

/// Record a rejected envelope.
pub fn record_decode_error() {
    counter!(names::DECODE_ERRORS_TOTAL).increment(1);
}

/// Update the tracked subscription count for one registry kind.
pub fn set_active_subscriptions(kind: &'static str, count: usize) {
    gauge!(names::SUBSCRIPTIONS_ACTIVE, "kind" => kind).set(count as f64);
}
