//! Metric names and recording helpers

use std::time::Instant;

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Histogram, Meter};

/// Instrumentation scope for every Chitin meter
pub const METER_NAME: &str = "chitin";

/// Webhook deliveries, labelled by `outcome` and `event_type`
pub const WEBHOOK_EVENT_COUNT: &str = "billing.webhook.event.count";
/// Wall time from request receipt to response, in seconds
pub const WEBHOOK_PROCESSING_DURATION: &str = "billing.webhook.processing.duration";
/// Tokens added to balances by grant transitions
pub const ENTITLEMENT_TOKENS_GRANTED: &str = "billing.entitlement.tokens.granted";
/// Markers removed by the retention sweep
pub const MARKERS_PURGED: &str = "billing.marker.purged";

/// Meter for the global provider (a no-op until telemetry export is configured)
pub fn meter() -> Meter {
    opentelemetry::global::meter(METER_NAME)
}

/// Record a duration measurement on a histogram
pub fn record_duration(histogram: &Histogram<f64>, start: Instant, attributes: &[KeyValue]) {
    histogram.record(start.elapsed().as_secs_f64(), attributes);
}
