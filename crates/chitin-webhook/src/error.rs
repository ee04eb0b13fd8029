use std::fmt;

use chitin_core::HttpError;
use chitin_store::StoreError;
use http::StatusCode;
use thiserror::Error;

/// Why a request failed authentication
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    MissingHeader,
    MalformedHeader,
    TokenMismatch,
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MissingHeader => "missing authorization header",
            Self::MalformedHeader => "malformed authorization header",
            Self::TokenMismatch => "bearer token mismatch",
        })
    }
}

/// Errors that end webhook processing with a non-200 response
#[derive(Debug, Error)]
pub enum WebhookError {
    /// The server holds no bearer token to compare against
    #[error("webhook bearer token is not configured")]
    Configuration,

    /// The caller did not present the configured bearer token
    #[error("unauthenticated: {0}")]
    Unauthenticated(AuthFailure),

    /// The body cannot be turned into an applicable event
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// Reading or writing the store failed; the provider should retry
    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),
}

impl WebhookError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedPayload(reason.into())
    }

    /// Whether the provider is expected to redeliver after this error
    pub fn is_retryable(&self) -> bool {
        self.status_code().is_server_error()
    }
}

impl HttpError for WebhookError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Configuration | Self::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::MalformedPayload(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::Configuration => "configuration_error",
            Self::Unauthenticated(_) => "authentication_error",
            Self::MalformedPayload(_) => "invalid_request_error",
            Self::Persistence(_) => "persistence_error",
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::Unauthenticated(_) => "unauthorized".to_owned(),
            Self::MalformedPayload(reason) => reason.clone(),
            Self::Configuration | Self::Persistence(_) => "an internal error occurred".to_owned(),
        }
    }
}
