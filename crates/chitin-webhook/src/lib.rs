//! Billing provider webhook
//!
//! A delivery passes through bearer authentication, payload parsing, the
//! idempotency guard, and the entitlement state machine in that order.
//! Any stage can end the request; only a delivery that clears every stage
//! leaves a completed event marker behind.

#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

pub mod auth;
pub mod entitlement;
pub mod error;
pub mod event;
pub mod guard;
mod metrics;
pub mod processor;
pub mod router;

#[cfg(test)]
mod test_support;

pub use auth::BearerAuth;
pub use entitlement::{Acknowledgement, EntitlementState, ProductCatalog, Transition};
pub use error::{AuthFailure, WebhookError};
pub use event::{BillingEvent, EventType, parse_event};
pub use guard::{Admission, Claim, IdempotencyGuard};
pub use processor::{Disposition, Outcome, WebhookProcessor};
pub use router::{WebhookState, webhook_router};
