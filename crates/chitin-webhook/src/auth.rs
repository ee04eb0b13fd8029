//! Bearer token check for inbound provider requests

use http::HeaderMap;
use http::header::AUTHORIZATION;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::{AuthFailure, WebhookError};

/// Validates `Authorization: Bearer <token>` against the configured secret
#[derive(Clone)]
pub struct BearerAuth {
    secret: Option<SecretString>,
}

impl BearerAuth {
    /// Build from the configured secret; `None` rejects every request with 500
    pub fn new(secret: Option<SecretString>) -> Self {
        Self { secret }
    }

    /// Check the request headers
    ///
    /// Digests are compared in constant time, so neither the token contents
    /// nor its length are observable through timing.
    pub fn verify(&self, headers: &HeaderMap) -> Result<(), WebhookError> {
        let Some(secret) = self.secret.as_ref() else {
            tracing::error!("rejecting billing webhook: bearer token is not configured");
            return Err(WebhookError::Configuration);
        };

        let token = bearer_token(headers)
            .inspect_err(|reason| tracing::warn!(%reason, "rejecting billing webhook"))
            .map_err(WebhookError::Unauthenticated)?;

        let expected = Sha256::digest(secret.expose_secret().as_bytes());
        let presented = Sha256::digest(token.as_bytes());

        if bool::from(expected.ct_eq(&presented)) {
            Ok(())
        } else {
            let reason = AuthFailure::TokenMismatch;
            tracing::warn!(%reason, "rejecting billing webhook");
            Err(WebhookError::Unauthenticated(reason))
        }
    }
}

impl std::fmt::Debug for BearerAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerAuth")
            .field("configured", &self.secret.is_some())
            .finish()
    }
}

/// Extract the token from an exact `Bearer <token>` header
fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthFailure> {
    let value = headers.get(AUTHORIZATION).ok_or(AuthFailure::MissingHeader)?;
    let value = value.to_str().map_err(|_| AuthFailure::MalformedHeader)?;

    match value.strip_prefix("Bearer ") {
        Some(token) if !token.is_empty() && !token.contains(char::is_whitespace) => Ok(token),
        _ => Err(AuthFailure::MalformedHeader),
    }
}
