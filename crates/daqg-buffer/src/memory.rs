use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::buffer::Buffer;
use crate::entry::BufferRecord;
use crate::error::BufferError;

#[derive(Debug, Default)]
struct Inner {
    entries: VecDeque<BufferRecord>,
}

/// In-memory [`Buffer`] implementation. All data is lost on process exit;
/// external-backed buffers degrade to this on store failure (§4.5).
#[derive(Debug, Clone, Default)]
pub struct InMemoryBuffer {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryBuffer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Buffer for InMemoryBuffer {
    async fn store(&self, record: BufferRecord) -> Result<(), BufferError> {
        let mut guard = self.inner.write().await;
        guard.entries.push_back(record);
        Ok(())
    }

    async fn get_latest(&self, n: usize) -> Result<Vec<BufferRecord>, BufferError> {
        let guard = self.inner.read().await;
        let mut sorted: Vec<BufferRecord> = guard.entries.iter().cloned().collect();
        sorted.sort_by(|a, b| b.ingested_at().cmp(&a.ingested_at()));
        sorted.truncate(n);
        Ok(sorted)
    }

    async fn get_by_source(&self, source_id: &str, n: usize) -> Result<Vec<BufferRecord>, BufferError> {
        let guard = self.inner.read().await;
        let mut matched: Vec<BufferRecord> = guard
            .entries
            .iter()
            .filter(|r| r.entry.record.metadata.source_id == source_id)
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.ingested_at().cmp(&a.ingested_at()));
        matched.truncate(n);
        Ok(matched)
    }

    async fn get_by_time_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<BufferRecord>, BufferError> {
        let guard = self.inner.read().await;
        Ok(guard
            .entries
            .iter()
            .filter(|r| {
                let ts = r.ingested_at();
                ts >= start && ts <= end
            })
            .cloned()
            .collect())
    }

    async fn search(&self, substring: &str) -> Result<Vec<BufferRecord>, BufferError> {
        let guard = self.inner.read().await;
        let needle = substring.to_ascii_lowercase();
        Ok(guard
            .entries
            .iter()
            .filter(|r| {
                serde_json::to_string(&r.entry.record)
                    .map(|s| s.to_ascii_lowercase().contains(&needle))
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn clear(&self) -> Result<(), BufferError> {
        let mut guard = self.inner.write().await;
        guard.entries.clear();
        Ok(())
    }

    async fn clear_by_source(&self, source_id: &str) -> Result<(), BufferError> {
        let mut guard = self.inner.write().await;
        guard.entries.retain(|r| r.entry.record.metadata.source_id != source_id);
        Ok(())
    }

    async fn recovery_candidates(&self, sink_name: &str) -> Result<Vec<BufferRecord>, BufferError> {
        let guard = self.inner.read().await;
        let mut candidates: Vec<BufferRecord> = guard
            .entries
            .iter()
            .filter(|r| r.entry.is_recovery_candidate_for(sink_name))
            .cloned()
            .collect();
        candidates.sort_by(|a, b| a.ingested_at().cmp(&b.ingested_at()));
        Ok(candidates)
    }

    async fn delete(&self, ids: &[Uuid]) -> Result<(), BufferError> {
        let mut guard = self.inner.write().await;
        guard.entries.retain(|r| !ids.contains(&r.id));
        Ok(())
    }

    async fn evict(&self, max_entries: usize, retention: std::time::Duration) -> Result<usize, BufferError> {
        let mut guard = self.inner.write().await;
        let before = guard.entries.len();

        let cutoff = Utc::now() - chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::zero());
        guard.entries.retain(|r| r.ingested_at() >= cutoff);

        while guard.entries.len() > max_entries {
            // Oldest first: find and remove the minimum-timestamp entry.
            if let Some((idx, _)) = guard
                .entries
                .iter()
                .enumerate()
                .min_by_key(|(_, r)| r.ingested_at())
            {
                guard.entries.remove(idx);
            } else {
                break;
            }
        }

        Ok(before - guard.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daqg_domain::{BufferedEntry, CanonicalRecord, RecordMetadata};

    fn record_at(source_id: &str, ts: DateTime<Utc>) -> BufferRecord {
        BufferRecord::new(BufferedEntry::cache(
            CanonicalRecord {
                id: source_id.to_string(),
                kind: "Sensor".to_string(),
                measurements: vec![],
                metadata: RecordMetadata {
                    timestamp: ts,
                    source_id: source_id.to_string(),
                    source_type: "modbus".to_string(),
                    quality: "good".to_string(),
                    extra: serde_json::Map::new(),
                },
            },
            ts,
        ))
    }

    #[tokio::test]
    async fn get_latest_returns_newest_first_bounded_by_capacity() {
        let buffer = InMemoryBuffer::new();
        let base = Utc::now();
        for i in 0..5u32 {
            buffer
                .store(record_at("m1", base + chrono::Duration::seconds(i as i64)))
                .await
                .unwrap();
        }
        let latest = buffer.get_latest(3).await.unwrap();
        assert_eq!(latest.len(), 3);
        assert!(latest[0].ingested_at() > latest[1].ingested_at());
        assert!(latest[1].ingested_at() > latest[2].ingested_at());
    }

    #[tokio::test]
    async fn evict_enforces_max_entries_bound() {
        let buffer = InMemoryBuffer::new();
        let base = Utc::now();
        for i in 0..20u32 {
            buffer
                .store(record_at("m1", base + chrono::Duration::seconds(i as i64)))
                .await
                .unwrap();
        }
        buffer.evict(10, std::time::Duration::from_secs(3600 * 24 * 7)).await.unwrap();
        let all = buffer.get_latest(100).await.unwrap();
        assert_eq!(all.len(), 10);
        // Newest-first: the retained window must be the 10 most recent.
        assert_eq!(all[9].entry.record.metadata.timestamp, base + chrono::Duration::seconds(10));
    }

    #[tokio::test]
    async fn recovery_candidates_are_oldest_first_and_sink_scoped() {
        let buffer = InMemoryBuffer::new();
        let base = Utc::now();
        let mut bus_entry = record_at("m1", base);
        bus_entry.entry.role = daqg_domain::BufferRole::Recovery;
        bus_entry.entry.intended_subject = Some("bus".to_string());
        buffer.store(bus_entry).await.unwrap();

        let mut broker_entry = record_at("m2", base + chrono::Duration::seconds(1));
        broker_entry.entry.role = daqg_domain::BufferRole::Recovery;
        broker_entry.entry.intended_subject = Some("broker".to_string());
        buffer.store(broker_entry).await.unwrap();

        let candidates = buffer.recovery_candidates("bus").await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].entry.intended_subject.as_deref(), Some("bus"));
    }
}
