use http::StatusCode;
use serde::Serialize;

/// Trait for domain errors that can be converted to HTTP responses
///
/// Implemented by each feature crate's error type. The server layer
/// turns these into responses, so domain crates never build bodies by hand
/// and never leak internal detail to callers.
pub trait HttpError: std::error::Error {
    /// HTTP status code for this error
    fn status_code(&self) -> StatusCode;

    /// Machine-readable error type (e.g. `authentication_error`)
    fn error_type(&self) -> &str;

    /// Message safe to expose to callers
    fn client_message(&self) -> String;

    /// Serializable envelope for this error
    fn to_body(&self) -> ErrorBody {
        ErrorBody {
            error: ErrorDetail {
                error_type: self.error_type().to_owned(),
                message: self.client_message(),
            },
        }
    }
}

/// JSON error envelope returned on every failed request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorDetail {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Denied;

    impl std::fmt::Display for Denied {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("denied: token mismatch")
        }
    }

    impl std::error::Error for Denied {}

    impl HttpError for Denied {
        fn status_code(&self) -> StatusCode {
            StatusCode::UNAUTHORIZED
        }

        fn error_type(&self) -> &str {
            "authentication_error"
        }

        fn client_message(&self) -> String {
            "unauthorized".to_owned()
        }
    }

    #[test]
    fn body_uses_client_message_not_display() {
        let body = serde_json::to_value(Denied.to_body()).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"error": {"type": "authentication_error", "message": "unauthorized"}})
        );
    }
}
