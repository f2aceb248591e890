//! Error types for the discovery store.

use taskexec_core::DiscoveryError;
use thiserror::Error;

/// Result type alias for state store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during state store operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("failed to read seed file: {0}")]
    Seed(String),
}

impl From<StateError> for DiscoveryError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::Serialize(msg) | StateError::Deserialize(msg) => DiscoveryError::Serialization(msg),
            other => DiscoveryError::Backend(other.to_string()),
        }
    }
}
