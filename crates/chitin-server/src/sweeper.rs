//! Periodic removal of event markers past their retention window

use std::sync::Arc;
use std::time::Duration;

use chitin_store::DocumentStore;
use chitin_telemetry::metrics;
use tokio_util::sync::CancellationToken;

/// Purge expired markers every `interval` until `shutdown` fires
pub async fn run(store: Arc<dyn DocumentStore>, interval: Duration, shutdown: CancellationToken) {
    let purged_counter = metrics::meter()
        .u64_counter(metrics::MARKERS_PURGED)
        .with_description("Event markers removed after their retention window")
        .build();

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match store.purge_expired().await {
            Ok(0) => {}
            Ok(purged) => {
                tracing::debug!(purged, "purged expired event markers");
                purged_counter.add(u64::try_from(purged).unwrap_or(u64::MAX), &[]);
            }
            Err(e) => tracing::warn!(error = %e, "event marker purge failed"),
        }
    }
}
