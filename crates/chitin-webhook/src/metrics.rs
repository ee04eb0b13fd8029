use std::time::Instant;

use chitin_telemetry::metrics::{self, record_duration};
use chitin_telemetry::{Counter, Histogram, KeyValue};

/// Instruments recorded by the webhook endpoint
#[derive(Clone)]
pub struct WebhookMetrics {
    events: Counter<u64>,
    duration: Histogram<f64>,
    tokens_granted: Counter<u64>,
}

impl WebhookMetrics {
    pub fn new() -> Self {
        let meter = metrics::meter();
        Self {
            events: meter
                .u64_counter(metrics::WEBHOOK_EVENT_COUNT)
                .with_description("Billing webhook deliveries by outcome")
                .build(),
            duration: meter
                .f64_histogram(metrics::WEBHOOK_PROCESSING_DURATION)
                .with_description("Billing webhook processing time")
                .with_unit("s")
                .build(),
            tokens_granted: meter
                .u64_counter(metrics::ENTITLEMENT_TOKENS_GRANTED)
                .with_description("Identification tokens granted by purchase events")
                .build(),
        }
    }

    /// Record one delivery
    pub fn record(&self, start: Instant, outcome: &'static str, event_type: Option<&str>) {
        let mut attributes = vec![KeyValue::new("outcome", outcome)];
        if let Some(event_type) = event_type {
            attributes.push(KeyValue::new("event_type", event_type.to_owned()));
        }

        self.events.add(1, &attributes);
        record_duration(&self.duration, start, &attributes);
    }

    pub fn record_grant(&self, tokens: u64, product_id: Option<&str>) {
        if tokens > 0 {
            self.tokens_granted
                .add(tokens, &[KeyValue::new("product_id", product_id.unwrap_or("unknown").to_owned())]);
        }
    }
}

impl Default for WebhookMetrics {
    fn default() -> Self {
        Self::new()
    }
}
