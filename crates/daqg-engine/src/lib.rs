mod audit;
mod discovery;
mod error;
mod hash;
mod orchestrator;
mod runtime;
mod supervisor;

pub use audit::{AuditEvent, AuditLog};
pub use discovery::promote as promote_discovery;
pub use error::EngineError;
pub use hash::compute_desired_hash;
pub use orchestrator::{Orchestrator, ReconcileReport, STOP_GRACE_DEADLINE};
pub use runtime::{ConnectorSnapshot, ConnectorStatus};
pub use supervisor::{ConnectorSupervisor, SourceSample};

use std::sync::Arc;

use daqg_buffer::{Buffer, InMemoryBuffer, PostgresBuffer, RedbBuffer};
use daqg_domain::{BufferBackend, BufferConfig};
use tracing::warn;

/// Builds the configured buffer backend, falling back to an in-memory
/// buffer if an external backend cannot be reached at startup (§4.5).
pub async fn build_buffer(config: &BufferConfig) -> Arc<dyn Buffer> {
    match &config.backend {
        BufferBackend::Memory => Arc::new(InMemoryBuffer::new()),
        BufferBackend::Redb { path } => match RedbBuffer::open(std::path::Path::new(path)) {
            Ok(buffer) => Arc::new(buffer),
            Err(e) => {
                warn!(error = %e, path = %path, "failed to open redb buffer, falling back to memory");
                Arc::new(InMemoryBuffer::new())
            }
        },
        BufferBackend::Postgres { url } => match PostgresBuffer::connect(url).await {
            Ok(buffer) => Arc::new(buffer),
            Err(e) => {
                warn!(error = %e, "failed to connect postgres buffer, falling back to memory");
                Arc::new(InMemoryBuffer::new())
            }
        },
    }
}
