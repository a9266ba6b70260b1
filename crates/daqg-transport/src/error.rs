use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("sink '{0}' unreachable")]
    Unreachable(String),

    #[error("sink '{0}' rejected payload: {1}")]
    Rejected(String, String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal transport error: {0}")]
    Internal(String),
}
