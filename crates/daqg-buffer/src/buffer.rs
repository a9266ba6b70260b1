use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::entry::BufferRecord;
use crate::error::BufferError;

/// Bounded, time-windowed store of canonical records with per-source
/// indexing (§4.5). Used both as a recovery queue for a down sink and as a
/// short-term retrieval cache — `BufferRole` on each entry distinguishes the two.
#[async_trait]
pub trait Buffer: Send + Sync + 'static {
    async fn store(&self, record: BufferRecord) -> Result<(), BufferError>;

    /// Newest-first, at most `n` entries.
    async fn get_latest(&self, n: usize) -> Result<Vec<BufferRecord>, BufferError>;

    async fn get_by_source(&self, source_id: &str, n: usize) -> Result<Vec<BufferRecord>, BufferError>;

    async fn get_by_time_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<BufferRecord>, BufferError>;

    async fn search(&self, substring: &str) -> Result<Vec<BufferRecord>, BufferError>;

    async fn clear(&self) -> Result<(), BufferError>;

    async fn clear_by_source(&self, source_id: &str) -> Result<(), BufferError>;

    /// Recovery-flush candidates for `sink_name`: `BufferRole::Recovery`
    /// entries whose `intended_subject` matches, oldest-first (§4.6).
    async fn recovery_candidates(&self, sink_name: &str) -> Result<Vec<BufferRecord>, BufferError>;

    /// Deletes a set of entries by id after a successful recovery republish.
    async fn delete(&self, ids: &[Uuid]) -> Result<(), BufferError>;

    /// Evicts entries beyond `max_entries` (oldest first) or older than
    /// `retention`, whichever triggers (§4.5). Returns the number evicted.
    async fn evict(&self, max_entries: usize, retention: std::time::Duration) -> Result<usize, BufferError>;
}
