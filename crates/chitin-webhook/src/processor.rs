use std::sync::Arc;
use std::time::Duration;

use chitin_config::Config;
use chitin_store::{DocumentStore, MarkerState, StoreError};
use http::HeaderMap;
use jiff::Timestamp;

use crate::auth::BearerAuth;
use crate::entitlement::{Acknowledgement, ProductCatalog, Transition};
use crate::error::WebhookError;
use crate::event::{self, BillingEvent, EventType};
use crate::guard::{Admission, IdempotencyGuard};

/// How a delivery was settled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Granted { tokens: u64, product_id: Option<String> },
    Revoked,
    Acknowledged(Acknowledgement),
    /// A marker for the event already existed
    AlreadyProcessed(MarkerState),
}

/// Successful result of one webhook delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub event_id: String,
    pub event_type: EventType,
    pub disposition: Disposition,
}

impl Outcome {
    /// Short status for the response body
    pub fn status(&self) -> &'static str {
        match self.disposition {
            Disposition::Granted { .. } | Disposition::Revoked => "processed",
            Disposition::Acknowledged(_) => "acknowledged",
            Disposition::AlreadyProcessed(_) => "already_processed",
        }
    }

    pub fn message(&self) -> String {
        match &self.disposition {
            Disposition::Granted { tokens, .. } => format!("granted {tokens} tokens"),
            Disposition::Revoked => "subscription revoked".to_owned(),
            Disposition::Acknowledged(ack) => ack.message().to_owned(),
            Disposition::AlreadyProcessed(MarkerState::Completed) => "event already processed".to_owned(),
            Disposition::AlreadyProcessed(MarkerState::Claimed) => "event is being processed".to_owned(),
        }
    }
}

/// Runs one delivery through authentication, parsing, the idempotency
/// guard, and the entitlement state machine
///
/// Holds no mutable state of its own; everything shared lives in the store.
pub struct WebhookProcessor {
    auth: BearerAuth,
    catalog: ProductCatalog,
    guard: IdempotencyGuard,
    store: Arc<dyn DocumentStore>,
}

impl WebhookProcessor {
    pub fn new(auth: BearerAuth, catalog: ProductCatalog, store: Arc<dyn DocumentStore>, claim_lease: Duration) -> Self {
        Self {
            auth,
            catalog,
            guard: IdempotencyGuard::new(Arc::clone(&store), claim_lease),
            store,
        }
    }

    /// Build a processor from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the claim lease cannot be parsed
    pub fn from_config(config: &Config, store: Arc<dyn DocumentStore>) -> anyhow::Result<Self> {
        let auth = BearerAuth::new(config.webhook.bearer_token().cloned());
        let catalog = ProductCatalog::new(config.products.clone(), config.webhook.unknown_product_policy);
        Ok(Self::new(auth, catalog, store, config.webhook.claim_ttl()?))
    }

    /// Process one delivery
    ///
    /// Authentication runs before anything touches the store. A failed
    /// entitlement write releases the event claim so the provider's retry
    /// can apply it.
    ///
    /// # Errors
    ///
    /// Returns a [`WebhookError`] describing the response to send
    pub async fn handle(&self, headers: &HeaderMap, body: &[u8]) -> Result<Outcome, WebhookError> {
        self.auth.verify(headers)?;
        let event = event::parse_event(body)?;

        let claim = match self.guard.admit(&event).await {
            Ok(Admission::Proceed(claim)) => claim,
            Ok(Admission::AlreadyProcessed(state)) => {
                tracing::info!(
                    event_id = %event.event_id,
                    event_type = %event.event_type,
                    app_user_id = %event.app_user_id,
                    ?state,
                    "billing event already processed"
                );
                return Ok(outcome(event, Disposition::AlreadyProcessed(state)));
            }
            Err(e) => {
                log_persistence_failure(&event, &e, "event marker lookup failed");
                return Err(e.into());
            }
        };

        let transition = self.catalog.plan(&event);
        let now = Timestamp::now();

        if let Some(mutation) = transition.mutation(&event, now)
            && let Err(e) = self.store.apply(&event.app_user_id, &mutation).await
        {
            log_persistence_failure(&event, &e, "entitlement write failed");
            self.guard.abandon(claim).await;
            return Err(e.into());
        }

        if let Err(e) = self.guard.commit(claim, now).await {
            // The mutation is committed; a 500 here would invite a second grant
            log_persistence_failure(&event, &e, "entitlement applied but event marker was not completed");
        }

        if let Some(state) = transition.target_state() {
            tracing::info!(
                event_id = %event.event_id,
                event_type = %event.event_type,
                app_user_id = %event.app_user_id,
                %state,
                "entitlement updated"
            );
        }

        let disposition = match transition {
            Transition::Grant { tokens, product_id } => Disposition::Granted { tokens, product_id },
            Transition::Revoke => Disposition::Revoked,
            Transition::Acknowledge(ack) => Disposition::Acknowledged(ack),
        };

        Ok(outcome(event, disposition))
    }
}

fn outcome(event: BillingEvent, disposition: Disposition) -> Outcome {
    Outcome {
        event_id: event.event_id,
        event_type: event.event_type,
        disposition,
    }
}

fn log_persistence_failure(event: &BillingEvent, error: &StoreError, context: &str) {
    tracing::error!(
        event_id = %event.event_id,
        event_type = %event.event_type,
        app_user_id = %event.app_user_id,
        product_id = event.product_id.as_deref().unwrap_or("-"),
        error = %error,
        "{context}"
    );
}
