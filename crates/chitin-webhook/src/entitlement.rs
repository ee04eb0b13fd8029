//! Entitlement state machine
//!
//! Maps a provider event onto a grant, a revoke, or a plain
//! acknowledgement. Nothing here touches the store; the processor applies
//! the resulting [`Mutation`].

use std::fmt;

use chitin_config::{ProductsConfig, UnknownProductPolicy};
use chitin_store::Mutation;
use jiff::Timestamp;

use crate::event::{BillingEvent, EventType};

/// Subscription state an entitlement record ends up in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntitlementState {
    /// No live subscription; the balance may still hold standalone grants
    Unentitled,
    Entitled,
}

impl fmt::Display for EntitlementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unentitled => "unentitled",
            Self::Entitled => "entitled",
        })
    }
}

/// Why an event was acknowledged without touching the entitlement record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acknowledgement {
    /// Provider connectivity check
    Test,
    /// Purchase moved between users; left for manual review
    Transfer,
    /// Event type this service does not act on
    Unhandled,
    /// Purchase of an unlisted product under the `ignore` policy
    UnknownProductIgnored,
}

impl Acknowledgement {
    pub fn message(self) -> &'static str {
        match self {
            Self::Test => "test event acknowledged",
            Self::Transfer => "transfer logged for manual review",
            Self::Unhandled => "event type not handled",
            Self::UnknownProductIgnored => "unknown product ignored",
        }
    }
}

/// What an event does to its user's entitlement record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Grant { tokens: u64, product_id: Option<String> },
    Revoke,
    Acknowledge(Acknowledgement),
}

impl Transition {
    /// State the record is left in, if the transition changes it
    pub fn target_state(&self) -> Option<EntitlementState> {
        match self {
            Self::Grant { .. } => Some(EntitlementState::Entitled),
            Self::Revoke => Some(EntitlementState::Unentitled),
            Self::Acknowledge(_) => None,
        }
    }

    /// Store mutation for this transition, stamped with server time `at`
    pub fn mutation(&self, event: &BillingEvent, at: Timestamp) -> Option<Mutation> {
        let event_type = event.event_type.as_str().to_owned();
        match self {
            Self::Grant { tokens, product_id } => Some(Mutation::Grant {
                tokens: *tokens,
                product_id: product_id.clone(),
                event_type,
                at,
            }),
            Self::Revoke => Some(Mutation::Revoke { event_type, at }),
            Self::Acknowledge(_) => None,
        }
    }
}

/// Product table plus the policy for products missing from it
#[derive(Debug, Clone)]
pub struct ProductCatalog {
    products: ProductsConfig,
    unknown_product_policy: UnknownProductPolicy,
}

impl ProductCatalog {
    pub fn new(products: ProductsConfig, unknown_product_policy: UnknownProductPolicy) -> Self {
        Self {
            products,
            unknown_product_policy,
        }
    }

    /// Decide the transition for an event
    pub fn plan(&self, event: &BillingEvent) -> Transition {
        match &event.event_type {
            EventType::InitialPurchase | EventType::Renewal => self.plan_grant(event),
            EventType::Cancellation | EventType::Expiration => Transition::Revoke,
            EventType::Test => {
                tracing::info!(event_id = %event.event_id, "billing provider test event received");
                Transition::Acknowledge(Acknowledgement::Test)
            }
            EventType::Transfer => {
                tracing::warn!(
                    event_id = %event.event_id,
                    app_user_id = %event.app_user_id,
                    "transfer event needs manual review; entitlement left unchanged"
                );
                Transition::Acknowledge(Acknowledgement::Transfer)
            }
            EventType::Other(raw) => {
                tracing::info!(
                    event_id = %event.event_id,
                    app_user_id = %event.app_user_id,
                    event_type = %raw,
                    "unhandled billing event type acknowledged"
                );
                Transition::Acknowledge(Acknowledgement::Unhandled)
            }
        }
    }

    fn plan_grant(&self, event: &BillingEvent) -> Transition {
        let product_id = event.product_id.as_deref();
        if let Some(tokens) = product_id.and_then(|id| self.products.tokens_for(id)) {
            return Transition::Grant {
                tokens,
                product_id: event.product_id.clone(),
            };
        }

        tracing::warn!(
            event_id = %event.event_id,
            event_type = %event.event_type,
            app_user_id = %event.app_user_id,
            product_id = product_id.unwrap_or("-"),
            policy = ?self.unknown_product_policy,
            "purchase for unknown product"
        );

        match self.unknown_product_policy {
            UnknownProductPolicy::Entitle => Transition::Grant {
                tokens: 0,
                product_id: event.product_id.clone(),
            },
            UnknownProductPolicy::Ignore => Transition::Acknowledge(Acknowledgement::UnknownProductIgnored),
        }
    }
}
