//! Billing provider payload parsing
//!
//! The provider posts either `{ "event": { ... } }` or the event object
//! itself. Both shapes collapse into one [`BillingEvent`] here so nothing
//! downstream looks at the wire shape again.

use std::fmt;

use jiff::Timestamp;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::WebhookError;

/// Provider event type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventType {
    InitialPurchase,
    Renewal,
    Cancellation,
    Expiration,
    Test,
    Transfer,
    /// Any type this service does not act on, kept verbatim for logs
    Other(String),
}

impl EventType {
    /// Label used when the payload carries no type at all
    pub const UNSPECIFIED: &str = "UNSPECIFIED";

    pub fn parse(raw: &str) -> Self {
        let normalized = raw.trim().to_ascii_uppercase();
        match normalized.as_str() {
            "INITIAL_PURCHASE" => Self::InitialPurchase,
            "RENEWAL" => Self::Renewal,
            "CANCELLATION" => Self::Cancellation,
            "EXPIRATION" => Self::Expiration,
            "TEST" => Self::Test,
            "TRANSFER" => Self::Transfer,
            "" => Self::Other(Self::UNSPECIFIED.to_owned()),
            _ => Self::Other(normalized),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::InitialPurchase => "INITIAL_PURCHASE",
            Self::Renewal => "RENEWAL",
            Self::Cancellation => "CANCELLATION",
            Self::Expiration => "EXPIRATION",
            Self::Test => "TEST",
            Self::Transfer => "TRANSFER",
            Self::Other(raw) => raw,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical event extracted from either payload shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingEvent {
    /// Provider-assigned idempotency key
    pub event_id: String,
    pub event_type: EventType,
    /// Key of the entitlement record the event targets
    pub app_user_id: String,
    pub product_id: Option<String>,
    /// Provider-side event time, logged only
    pub event_timestamp_ms: Option<i64>,
}

/// Wire shape of a delivery
#[derive(Debug)]
enum Payload {
    Wrapped(RawEvent),
    Flat(RawEvent),
}

#[derive(Debug, Default, Deserialize)]
struct RawEvent {
    #[serde(default)]
    id: Option<String>,
    #[serde(default, rename = "type")]
    event_type: Option<String>,
    #[serde(default)]
    app_user_id: Option<String>,
    #[serde(default)]
    product_id: Option<String>,
    #[serde(default)]
    event_timestamp_ms: Option<Value>,
}

impl Payload {
    /// Pick the shape by the presence of an `event` key
    ///
    /// A body carrying `event` is always the wrapped shape, so bad field
    /// types inside it are reported instead of being reread as a flat event
    /// with nothing set.
    fn from_object(mut object: Map<String, Value>) -> Result<Self, serde_json::Error> {
        match object.remove("event") {
            Some(event) => RawEvent::deserialize(event).map(Self::Wrapped),
            None => RawEvent::deserialize(Value::Object(object)).map(Self::Flat),
        }
    }

    fn shape(&self) -> &'static str {
        match self {
            Self::Wrapped(_) => "wrapped",
            Self::Flat(_) => "flat",
        }
    }

    fn into_event(self) -> RawEvent {
        match self {
            Self::Wrapped(event) | Self::Flat(event) => event,
        }
    }
}

/// Parse a request body into a [`BillingEvent`]
///
/// # Errors
///
/// Returns [`WebhookError::MalformedPayload`] if the body is not a JSON
/// object of the expected shape, or lacks an event `id` or `app_user_id`
pub fn parse_event(body: &[u8]) -> Result<BillingEvent, WebhookError> {
    let value: Value = serde_json::from_slice(body).map_err(|e| {
        tracing::warn!(error = %e, "rejecting billing webhook: body is not valid JSON");
        WebhookError::malformed("request body must be a JSON object")
    })?;

    let Value::Object(object) = value else {
        tracing::warn!("rejecting billing webhook: body is not a JSON object");
        return Err(WebhookError::malformed("request body must be a JSON object"));
    };

    let payload = Payload::from_object(object).map_err(|e| {
        tracing::warn!(error = %e, "rejecting billing webhook: unexpected event field types");
        WebhookError::malformed("event fields have unexpected types")
    })?;
    let shape = payload.shape();
    let raw = payload.into_event();

    let event_id = non_empty(raw.id);
    let app_user_id = non_empty(raw.app_user_id);
    let event_type = raw
        .event_type
        .as_deref()
        .map_or_else(|| EventType::Other(EventType::UNSPECIFIED.to_owned()), EventType::parse);
    let product_id = non_empty(raw.product_id);
    let event_timestamp_ms = raw.event_timestamp_ms.as_ref().and_then(timestamp_ms);

    tracing::info!(
        event_id = event_id.as_deref().unwrap_or("-"),
        event_type = %event_type,
        app_user_id = app_user_id.as_deref().unwrap_or("-"),
        product_id = product_id.as_deref().unwrap_or("-"),
        shape,
        event_time = event_timestamp_ms
            .and_then(|ms| Timestamp::from_millisecond(ms).ok())
            .map(tracing::field::display),
        "received billing event"
    );

    let Some(app_user_id) = app_user_id else {
        tracing::warn!(event_id = event_id.as_deref().unwrap_or("-"), %event_type, "rejecting billing event without app_user_id");
        return Err(WebhookError::malformed("missing app_user_id"));
    };

    let Some(event_id) = event_id else {
        tracing::warn!(%app_user_id, %event_type, "rejecting billing event without id");
        return Err(WebhookError::malformed("missing event id"));
    };

    Ok(BillingEvent {
        event_id,
        event_type,
        app_user_id,
        product_id,
        event_timestamp_ms,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

/// Integer milliseconds, accepting floats the provider sometimes sends
#[allow(clippy::cast_possible_truncation)]
fn timestamp_ms(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|ms| ms.is_finite()).map(|ms| ms as i64))
}
