use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("invalid source id: {0}")]
    InvalidSourceId(String),

    #[error("unknown driver tag: {0}")]
    UnknownDriverTag(String),

    #[error("invalid retry policy: {0}")]
    InvalidRetryPolicy(String),

    #[error("invalid mapping rule for source '{source_id}': {reason}")]
    InvalidMappingRule { source_id: String, reason: String },

    #[error("invalid sink spec: {0}")]
    InvalidSinkSpec(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
