use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::CanonicalRecord;

/// Which role a buffered entry plays (§9 "Buffer persistence coupling").
/// The buffer blurs short-term cache and failure-recovery queue; this flag
/// keeps both behaviors while making the distinction explicit so only
/// `Recovery` entries are candidates for flush + delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferRole {
    /// Stored purely for short-term retrieval; never targeted by recovery flush.
    Cache,
    /// Failed to publish to `intended_subject`; a flush candidate once that
    /// sink reports healthy again.
    Recovery,
}

/// A CanonicalRecord plus the envelope describing why it is buffered (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferedEntry {
    pub record: CanonicalRecord,
    pub role: BufferRole,
    /// Sink name this entry is queued for. Populated only for `Recovery` entries.
    pub intended_subject: Option<String>,
    pub buffered_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

impl BufferedEntry {
    pub fn cache(record: CanonicalRecord, buffered_at: DateTime<Utc>) -> Self {
        BufferedEntry {
            record,
            role: BufferRole::Cache,
            intended_subject: None,
            buffered_at,
            last_error: None,
        }
    }

    pub fn recovery(
        record: CanonicalRecord,
        intended_subject: impl Into<String>,
        last_error: impl Into<String>,
        buffered_at: DateTime<Utc>,
    ) -> Self {
        BufferedEntry {
            record,
            role: BufferRole::Recovery,
            intended_subject: Some(intended_subject.into()),
            buffered_at,
            last_error: Some(last_error.into()),
        }
    }

    pub fn is_recovery_candidate_for(&self, sink_name: &str) -> bool {
        self.role == BufferRole::Recovery
            && self.intended_subject.as_deref() == Some(sink_name)
    }
}
