use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

/// Billing provider webhook configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookConfig {
    /// Route the provider posts events to
    #[serde(default = "default_path")]
    pub path: String,

    /// Shared bearer token the provider sends in `Authorization`
    ///
    /// Left unset (or empty) the endpoint answers every request with 500
    /// until an operator supplies it; the process still starts.
    #[serde(default)]
    pub bearer_token: Option<SecretString>,

    /// What an `INITIAL_PURCHASE` or `RENEWAL` for an unlisted product does
    #[serde(default)]
    pub unknown_product_policy: UnknownProductPolicy,

    /// How long a delivery may hold an event claim before it can be retaken
    #[serde(default = "default_claim_ttl")]
    pub claim_ttl: String,
}

/// Policy for purchase events naming a product missing from `[products]`
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UnknownProductPolicy {
    /// Activate the subscription and grant zero tokens
    #[default]
    Entitle,
    /// Leave the entitlement record untouched and only acknowledge
    Ignore,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            bearer_token: None,
            unknown_product_policy: UnknownProductPolicy::default(),
            claim_ttl: default_claim_ttl(),
        }
    }
}

impl WebhookConfig {
    /// The configured bearer token, treating an empty value as unset
    pub fn bearer_token(&self) -> Option<&SecretString> {
        self.bearer_token
            .as_ref()
            .filter(|token| !token.expose_secret().is_empty())
    }

    /// Parsed claim lease
    ///
    /// # Errors
    ///
    /// Returns an error if `claim_ttl` is not a valid duration string
    pub fn claim_ttl(&self) -> anyhow::Result<Duration> {
        duration_str::parse(&self.claim_ttl)
            .map_err(|e| anyhow::anyhow!("invalid webhook.claim_ttl '{}': {e}", self.claim_ttl))
    }
}

fn default_path() -> String {
    "/webhooks/billing".to_owned()
}

fn default_claim_ttl() -> String {
    "5m".to_owned()
}
