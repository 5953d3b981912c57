use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Duration;

/// Describe all pipeline metrics (safe to call multiple times)
///
/// Nothing is exported unless the host application installs a recorder.
pub fn init_metric_descriptions() {
    describe_counter!(
        "telemetry_envelopes_enqueued_total",
        "Envelopes accepted into the event buffer"
    );
    describe_counter!(
        "telemetry_batches_delivered_total",
        "Batches accepted by the ingestion API"
    );
    describe_counter!(
        "telemetry_envelopes_delivered_total",
        "Envelopes accepted by the ingestion API"
    );
    describe_counter!(
        "telemetry_delivery_retries_total",
        "Delivery attempts that were retried"
    );
    describe_counter!(
        "telemetry_dead_letters_total",
        "Envelopes moved to the dead-letter sink"
    );
    describe_histogram!(
        "telemetry_delivery_duration_seconds",
        "Duration of one ingestion request"
    );
}

/// Record an enqueued envelope
pub fn record_enqueued(event_type: &'static str) {
    counter!("telemetry_envelopes_enqueued_total", "type" => event_type).increment(1);
}

/// Record a delivered batch
pub fn record_delivered(envelopes: usize) {
    counter!("telemetry_batches_delivered_total").increment(1);
    counter!("telemetry_envelopes_delivered_total").increment(envelopes as u64);
}

/// Record a retried attempt
pub fn record_retry() {
    counter!("telemetry_delivery_retries_total").increment(1);
}

/// Record dead-lettered envelopes
pub fn record_dead_letters(reason: &'static str, count: usize) {
    counter!("telemetry_dead_letters_total", "reason" => reason).increment(count as u64);
}

/// Record ingestion request duration
pub fn record_delivery_duration(duration: Duration) {
    histogram!("telemetry_delivery_duration_seconds").record(duration.as_secs_f64());
}
