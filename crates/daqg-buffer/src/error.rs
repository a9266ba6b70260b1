use thiserror::Error;

#[derive(Debug, Error)]
pub enum BufferError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal buffer error: {0}")]
    Internal(String),
}
