use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::types::{ClaimOutcome, EntitlementRecord, EventMarker, MarkerState, Mutation};
use crate::{DocumentStore, StoreError};

struct StoredMarker {
    marker: EventMarker,
    expires_at: Option<Instant>,
}

impl StoredMarker {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Process-local store
///
/// Suitable for a single instance and for tests. Each key's shard lock makes
/// a mutation or a claim atomic; nothing survives a restart.
pub struct MemoryStore {
    entitlements: DashMap<String, EntitlementRecord>,
    markers: DashMap<String, StoredMarker>,
    retention: Option<Duration>,
}

impl MemoryStore {
    /// Create a store whose completed markers live for `retention` (`None` keeps them)
    pub fn new(retention: Option<Duration>) -> Self {
        Self {
            entitlements: DashMap::new(),
            markers: DashMap::new(),
            retention,
        }
    }

    /// Number of markers held, including expired ones not yet purged
    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn entitlement(&self, app_user_id: &str) -> Result<Option<EntitlementRecord>, StoreError> {
        Ok(self.entitlements.get(app_user_id).map(|record| record.clone()))
    }

    async fn apply(&self, app_user_id: &str, mutation: &Mutation) -> Result<(), StoreError> {
        self.entitlements
            .entry(app_user_id.to_owned())
            .or_default()
            .apply(mutation);
        Ok(())
    }

    async fn marker(&self, event_id: &str) -> Result<Option<EventMarker>, StoreError> {
        let now = Instant::now();
        Ok(self
            .markers
            .get(event_id)
            .filter(|stored| !stored.is_expired(now))
            .map(|stored| stored.marker.clone()))
    }

    async fn claim_marker(&self, marker: &EventMarker, lease: Duration) -> Result<ClaimOutcome, StoreError> {
        let now = Instant::now();
        let claim = StoredMarker {
            marker: marker.clone(),
            expires_at: Some(now + lease),
        };

        match self.markers.entry(marker.event_id.clone()) {
            Entry::Occupied(mut entry) if entry.get().is_expired(now) => {
                tracing::debug!(event_id = %marker.event_id, "retaking lapsed event claim");
                entry.insert(claim);
                Ok(ClaimOutcome::Claimed)
            }
            Entry::Occupied(entry) => Ok(ClaimOutcome::Held(entry.get().marker.state)),
            Entry::Vacant(entry) => {
                entry.insert(claim);
                Ok(ClaimOutcome::Claimed)
            }
        }
    }

    async fn complete_marker(&self, marker: &EventMarker) -> Result<(), StoreError> {
        let expires_at = self.retention.map(|retention| Instant::now() + retention);
        self.markers.insert(
            marker.event_id.clone(),
            StoredMarker {
                marker: marker.clone(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn release_marker(&self, claim: &EventMarker) -> Result<bool, StoreError> {
        let released = self
            .markers
            .remove_if(&claim.event_id, |_, stored| {
                stored.marker.state == MarkerState::Claimed && stored.marker == *claim
            })
            .is_some();
        Ok(released)
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        let now = Instant::now();
        let before = self.markers.len();
        self.markers.retain(|_, stored| !stored.is_expired(now));
        Ok(before.saturating_sub(self.markers.len()))
    }
}
