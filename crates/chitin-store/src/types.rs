use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// Per-user subscription status and identification credit balance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitlementRecord {
    /// Consumable identification credits
    pub token_balance: u64,
    /// Whether the user holds a live paid entitlement
    pub subscription_active: bool,
    /// Product of the most recent grant
    pub subscription_product_id: Option<String>,
    /// Provider event type of the most recent applied mutation
    pub last_event_type: Option<String>,
    /// Server time of the most recent grant
    pub last_grant_at: Option<Timestamp>,
    /// Server time of the most recent revoke
    pub last_revoke_at: Option<Timestamp>,
}

/// A single atomic change to an entitlement record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Add tokens and activate the subscription
    Grant {
        tokens: u64,
        product_id: Option<String>,
        event_type: String,
        at: Timestamp,
    },
    /// Zero the balance and deactivate the subscription
    Revoke { event_type: String, at: Timestamp },
}

impl EntitlementRecord {
    /// Merge a mutation into this record
    ///
    /// Fields a mutation does not name are left as they are.
    pub fn apply(&mut self, mutation: &Mutation) {
        match mutation {
            Mutation::Grant {
                tokens,
                product_id,
                event_type,
                at,
            } => {
                self.token_balance = self.token_balance.saturating_add(*tokens);
                self.subscription_active = true;
                if let Some(product_id) = product_id {
                    self.subscription_product_id = Some(product_id.clone());
                }
                self.last_event_type = Some(event_type.clone());
                self.last_grant_at = Some(*at);
            }
            Mutation::Revoke { event_type, at } => {
                self.token_balance = 0;
                self.subscription_active = false;
                self.last_event_type = Some(event_type.clone());
                self.last_revoke_at = Some(*at);
            }
        }
    }
}

/// Lifecycle of a processed-event marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerState {
    /// A delivery is applying the event right now
    Claimed,
    /// The event's mutation has been committed
    Completed,
}

/// Idempotency record for one provider event, with an audit copy of what was applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMarker {
    pub event_id: String,
    pub app_user_id: String,
    pub event_type: String,
    pub product_id: Option<String>,
    pub state: MarkerState,
    pub claimed_at: Timestamp,
    pub processed_at: Option<Timestamp>,
}

impl EventMarker {
    /// A fresh claim for an event
    pub fn claim(
        event_id: impl Into<String>,
        app_user_id: impl Into<String>,
        event_type: impl Into<String>,
        product_id: Option<String>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            app_user_id: app_user_id.into(),
            event_type: event_type.into(),
            product_id,
            state: MarkerState::Claimed,
            claimed_at: Timestamp::now(),
            processed_at: None,
        }
    }

    /// The completed form of this marker
    #[must_use]
    pub fn completed(mut self, at: Timestamp) -> Self {
        self.state = MarkerState::Completed;
        self.processed_at = Some(at);
        self
    }

    pub fn is_completed(&self) -> bool {
        self.state == MarkerState::Completed
    }
}

/// Result of a conditional marker create
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This caller now owns the event
    Claimed,
    /// A marker already exists in the given state
    Held(MarkerState),
}
