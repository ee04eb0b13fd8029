//! Store double that counts calls and can fail entitlement writes

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chitin_config::{ProductsConfig, UnknownProductPolicy};
use chitin_store::{
    ClaimOutcome, DocumentStore, EntitlementRecord, EventMarker, MemoryStore, Mutation, StoreError,
};
use http::header::AUTHORIZATION;
use http::{HeaderMap, HeaderValue};
use secrecy::SecretString;

use crate::auth::BearerAuth;
use crate::entitlement::ProductCatalog;
use crate::processor::WebhookProcessor;

pub const TOKEN: &str = "test-webhook-token";

#[derive(Default)]
pub struct RecordingStore {
    inner: MemoryStore,
    pub reads: AtomicUsize,
    pub applies: AtomicUsize,
    pub marker_writes: AtomicUsize,
    pub fail_apply: AtomicBool,
}

impl RecordingStore {
    pub fn calls(&self) -> usize {
        self.reads.load(Ordering::SeqCst) + self.applies.load(Ordering::SeqCst) + self.marker_writes.load(Ordering::SeqCst)
    }

    pub fn applies(&self) -> usize {
        self.applies.load(Ordering::SeqCst)
    }

    pub fn set_fail_apply(&self, fail: bool) {
        self.fail_apply.store(fail, Ordering::SeqCst);
    }

    /// Read the record without counting the call
    pub async fn record(&self, app_user_id: &str) -> Option<EntitlementRecord> {
        self.inner.entitlement(app_user_id).await.unwrap()
    }

    pub async fn stored_marker(&self, event_id: &str) -> Option<EventMarker> {
        self.inner.marker(event_id).await.unwrap()
    }

    pub async fn seed(&self, app_user_id: &str, mutation: &Mutation) {
        self.inner.apply(app_user_id, mutation).await.unwrap();
    }
}

#[async_trait]
impl DocumentStore for RecordingStore {
    async fn entitlement(&self, app_user_id: &str) -> Result<Option<EntitlementRecord>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.entitlement(app_user_id).await
    }

    async fn apply(&self, app_user_id: &str, mutation: &Mutation) -> Result<(), StoreError> {
        if self.fail_apply.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("write rejected".to_owned()));
        }
        self.applies.fetch_add(1, Ordering::SeqCst);
        // Widen the window between claim and completion for concurrency tests
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.inner.apply(app_user_id, mutation).await
    }

    async fn marker(&self, event_id: &str) -> Result<Option<EventMarker>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.marker(event_id).await
    }

    async fn claim_marker(&self, marker: &EventMarker, lease: Duration) -> Result<ClaimOutcome, StoreError> {
        self.marker_writes.fetch_add(1, Ordering::SeqCst);
        self.inner.claim_marker(marker, lease).await
    }

    async fn complete_marker(&self, marker: &EventMarker) -> Result<(), StoreError> {
        self.marker_writes.fetch_add(1, Ordering::SeqCst);
        self.inner.complete_marker(marker).await
    }

    async fn release_marker(&self, claim: &EventMarker) -> Result<bool, StoreError> {
        self.marker_writes.fetch_add(1, Ordering::SeqCst);
        self.inner.release_marker(claim).await
    }
}

pub fn processor(store: Arc<RecordingStore>) -> WebhookProcessor {
    processor_with(store, UnknownProductPolicy::Entitle)
}

pub fn processor_with(store: Arc<RecordingStore>, policy: UnknownProductPolicy) -> WebhookProcessor {
    WebhookProcessor::new(
        BearerAuth::new(Some(SecretString::from(TOKEN))),
        ProductCatalog::new(ProductsConfig::default(), policy),
        store,
        Duration::from_secs(60),
    )
}

pub fn authorized() -> HeaderMap {
    bearer(TOKEN)
}

pub fn bearer(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {token}")).unwrap());
    headers
}

pub fn payload(event_id: &str, event_type: &str, app_user_id: &str, product_id: Option<&str>) -> Vec<u8> {
    serde_json::json!({
        "event": {
            "id": event_id,
            "type": event_type,
            "app_user_id": app_user_id,
            "product_id": product_id,
            "event_timestamp_ms": 1_767_225_600_000_i64,
        }
    })
    .to_string()
    .into_bytes()
}
