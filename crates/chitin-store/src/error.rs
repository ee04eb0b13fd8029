use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connection or command failure in the backing store
    #[error("store backend: {0}")]
    Backend(String),
    /// Stored document could not be encoded or decoded
    #[error("serialization: {0}")]
    Serialization(String),
}
