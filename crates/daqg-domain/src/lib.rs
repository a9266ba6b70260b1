pub mod buffer;
pub mod error;
pub mod mapping;
pub mod record;
pub mod sink;
pub mod source;
pub mod storage;

pub use buffer::{BufferRole, BufferedEntry};
pub use error::DomainError;
pub use mapping::{Mapping, MappingRule, MappingTarget, MappingTargetKind, Transform};
pub use record::{CanonicalRecord, CompactMeasurement, CompactRecord, Measurement, RawSample, RecordMetadata};
pub use sink::{HttpAuth, SinkSpec, WireFormat};
pub use source::{DriverKind, RetryPolicy, SourceId, SourceSpec};
pub use storage::{BufferBackend, BufferConfig, OutputFormats, StorageConfig};
