//! Idempotency guard
//!
//! An event is admitted only if this delivery wins the conditional create
//! of its marker. The marker stays `claimed` while the entitlement
//! mutation runs and becomes `completed` only after it commits, so a
//! completed marker always implies a committed mutation.

use std::sync::Arc;
use std::time::Duration;

use chitin_store::{ClaimOutcome, DocumentStore, EventMarker, MarkerState, StoreError};
use jiff::Timestamp;

use crate::event::BillingEvent;

/// Ownership of one event for the duration of its processing
#[derive(Debug)]
#[must_use = "a claim must be committed or abandoned"]
pub struct Claim {
    marker: EventMarker,
}

impl Claim {
    pub fn event_id(&self) -> &str {
        &self.marker.event_id
    }
}

/// Result of asking to process an event
#[derive(Debug)]
pub enum Admission {
    /// This delivery owns the event
    Proceed(Claim),
    /// A marker already exists; the event must not be applied again
    AlreadyProcessed(MarkerState),
}

#[derive(Clone)]
pub struct IdempotencyGuard {
    store: Arc<dyn DocumentStore>,
    lease: Duration,
}

impl IdempotencyGuard {
    pub fn new(store: Arc<dyn DocumentStore>, lease: Duration) -> Self {
        Self { store, lease }
    }

    /// Check for an existing marker, then claim the event
    ///
    /// The lookup short-circuits plain redeliveries without a write; the
    /// claim is what decides between concurrent deliveries.
    pub async fn admit(&self, event: &BillingEvent) -> Result<Admission, StoreError> {
        if let Some(existing) = self.store.marker(&event.event_id).await? {
            return Ok(Admission::AlreadyProcessed(existing.state));
        }

        let marker = EventMarker::claim(
            event.event_id.as_str(),
            event.app_user_id.as_str(),
            event.event_type.as_str(),
            event.product_id.clone(),
        );

        match self.store.claim_marker(&marker, self.lease).await? {
            ClaimOutcome::Claimed => Ok(Admission::Proceed(Claim { marker })),
            ClaimOutcome::Held(state) => {
                tracing::debug!(event_id = %event.event_id, ?state, "lost event claim to a concurrent delivery");
                Ok(Admission::AlreadyProcessed(state))
            }
        }
    }

    /// Mark the claimed event completed
    pub async fn commit(&self, claim: Claim, processed_at: Timestamp) -> Result<(), StoreError> {
        self.store.complete_marker(&claim.marker.completed(processed_at)).await
    }

    /// Drop the claim so a redelivery can process the event
    ///
    /// Only this delivery's own claim is removed. If the lease lapsed and
    /// another delivery took the event over, its marker stays. A failed
    /// release is logged; the claim then lapses with its lease.
    pub async fn abandon(&self, claim: Claim) {
        match self.store.release_marker(&claim.marker).await {
            Ok(true) => {}
            Ok(false) => tracing::warn!(
                event_id = %claim.event_id(),
                lease_secs = self.lease.as_secs(),
                "event claim lapsed before release; leaving the current marker in place"
            ),
            Err(e) => tracing::error!(
                event_id = %claim.event_id(),
                error = %e,
                lease_secs = self.lease.as_secs(),
                "failed to release event claim; redeliveries are blocked until the lease lapses"
            ),
        }
    }
}
