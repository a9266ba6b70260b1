use chrono::{DateTime, Utc};
use daqg_domain::BufferedEntry;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A `BufferedEntry` plus the identity needed for per-entry delete during
/// recovery flush (§4.6). The identity lives at the storage layer, not in
/// the domain type, the same way the teacher's runtime state wraps its
/// domain structs with store-owned bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferRecord {
    pub id: Uuid,
    pub entry: BufferedEntry,
}

impl BufferRecord {
    pub fn new(entry: BufferedEntry) -> Self {
        BufferRecord {
            id: Uuid::new_v4(),
            entry,
        }
    }

    pub fn ingested_at(&self) -> DateTime<Utc> {
        self.entry.record.metadata.timestamp
    }
}
