//! Persistence for entitlement records and processed-event markers
//!
//! Two logical collections live behind [`DocumentStore`]: one entitlement
//! record per app user, and one marker per billing provider event. Every
//! mutation of an entitlement record is applied as a single atomic write.

#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

pub mod error;
pub mod memory;
pub mod types;
pub mod valkey;

use std::time::Duration;

use async_trait::async_trait;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use types::{ClaimOutcome, EntitlementRecord, EventMarker, MarkerState, Mutation};
pub use valkey::ValkeyStore;

/// Document store holding entitlement records and event markers
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch the entitlement record for a user
    async fn entitlement(&self, app_user_id: &str) -> Result<Option<EntitlementRecord>, StoreError>;

    /// Merge a grant or revoke into a user's record in one atomic write
    ///
    /// Creates the record when it does not exist yet.
    async fn apply(&self, app_user_id: &str, mutation: &Mutation) -> Result<(), StoreError>;

    /// Fetch the marker for a provider event, if one is live
    async fn marker(&self, event_id: &str) -> Result<Option<EventMarker>, StoreError>;

    /// Conditionally create a claimed marker
    ///
    /// Only one caller can hold the claim for an event id. The claim lapses
    /// after `lease` unless it is completed first.
    async fn claim_marker(&self, marker: &EventMarker, lease: Duration) -> Result<ClaimOutcome, StoreError>;

    /// Overwrite a claim with its completed marker
    async fn complete_marker(&self, marker: &EventMarker) -> Result<(), StoreError>;

    /// Drop a claim that was never completed
    ///
    /// Only removes the marker if it is still exactly `claim`. A claim that
    /// lapsed and was retaken by another delivery, or that has since been
    /// completed, is left alone and `false` is returned.
    async fn release_marker(&self, claim: &EventMarker) -> Result<bool, StoreError>;

    /// Remove markers whose retention has lapsed
    ///
    /// Backends with native key expiry have nothing to do here.
    async fn purge_expired(&self) -> Result<usize, StoreError> {
        Ok(0)
    }
}
