use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] daqg_config::ConfigError),

    #[error(transparent)]
    Domain(#[from] daqg_domain::DomainError),

    #[error(transparent)]
    Driver(#[from] daqg_driver::DriverError),

    #[error(transparent)]
    Mapping(#[from] daqg_mapping::MappingError),

    #[error(transparent)]
    Buffer(#[from] daqg_buffer::BufferError),

    #[error("unknown source: {0}")]
    UnknownSource(String),

    #[error("reconciliation already in progress")]
    ReconcileBusy,

    #[error("internal engine error: {0}")]
    Internal(String),
}
