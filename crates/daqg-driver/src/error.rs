use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("invalid driver config: {0}")]
    Config(String),

    #[error("connect failed: {0}")]
    Connect(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("operation not supported by this driver")]
    Unsupported,

    #[error("driver not registered for tag: {0}")]
    NotRegistered(String),

    #[error("internal driver error: {0}")]
    Internal(String),
}
