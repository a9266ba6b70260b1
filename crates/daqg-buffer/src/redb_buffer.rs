use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition};
use uuid::Uuid;

use crate::buffer::Buffer;
use crate::entry::BufferRecord;
use crate::error::BufferError;

const ENTRIES: TableDefinition<&str, &[u8]> = TableDefinition::new("buffer_entries");

/// [`Buffer`] backed by an embedded redb database file; entries survive
/// process restarts (§4.5 "Optional external backing").
#[derive(Clone)]
pub struct RedbBuffer {
    db: Arc<Database>,
}

impl RedbBuffer {
    pub fn open(path: &Path) -> Result<Self, BufferError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| BufferError::Internal(e.to_string()))?;
        }
        let db = Database::create(path).map_err(|e| BufferError::Internal(e.to_string()))?;
        {
            let wtxn = db.begin_write().map_err(|e| BufferError::Internal(e.to_string()))?;
            wtxn.open_table(ENTRIES).map_err(|e| BufferError::Internal(e.to_string()))?;
            wtxn.commit().map_err(|e| BufferError::Internal(e.to_string()))?;
        }
        Ok(RedbBuffer { db: Arc::new(db) })
    }

    fn all(&self) -> Result<Vec<BufferRecord>, BufferError> {
        let rtxn = self.db.begin_read().map_err(|e| BufferError::Internal(e.to_string()))?;
        let table = rtxn.open_table(ENTRIES).map_err(|e| BufferError::Internal(e.to_string()))?;
        let mut out = Vec::new();
        for entry in table.iter().map_err(|e| BufferError::Internal(e.to_string()))? {
            let (_k, v) = entry.map_err(|e| BufferError::Internal(e.to_string()))?;
            out.push(serde_json::from_slice(v.value())?);
        }
        Ok(out)
    }
}

#[async_trait]
impl Buffer for RedbBuffer {
    async fn store(&self, record: BufferRecord) -> Result<(), BufferError> {
        let bytes = serde_json::to_vec(&record)?;
        let key = record.id.to_string();
        let wtxn = self.db.begin_write().map_err(|e| BufferError::Internal(e.to_string()))?;
        {
            let mut table = wtxn.open_table(ENTRIES).map_err(|e| BufferError::Internal(e.to_string()))?;
            table
                .insert(key.as_str(), bytes.as_slice())
                .map_err(|e| BufferError::Internal(e.to_string()))?;
        }
        wtxn.commit().map_err(|e| BufferError::Internal(e.to_string()))?;
        Ok(())
    }

    async fn get_latest(&self, n: usize) -> Result<Vec<BufferRecord>, BufferError> {
        let mut all = self.all()?;
        all.sort_by(|a, b| b.ingested_at().cmp(&a.ingested_at()));
        all.truncate(n);
        Ok(all)
    }

    async fn get_by_source(&self, source_id: &str, n: usize) -> Result<Vec<BufferRecord>, BufferError> {
        let mut matched: Vec<BufferRecord> = self
            .all()?
            .into_iter()
            .filter(|r| r.entry.record.metadata.source_id == source_id)
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
        Ok(self
            .all()?
            .into_iter()
            .filter(|r| {
                let ts = r.ingested_at();
                ts >= start && ts <= end
            })
            .collect())
    }

    async fn search(&self, substring: &str) -> Result<Vec<BufferRecord>, BufferError> {
        let needle = substring.to_ascii_lowercase();
        Ok(self
            .all()?
            .into_iter()
            .filter(|r| {
                serde_json::to_string(&r.entry.record)
                    .map(|s| s.to_ascii_lowercase().contains(&needle))
                    .unwrap_or(false)
            })
            .collect())
    }

    async fn clear(&self) -> Result<(), BufferError> {
        let wtxn = self.db.begin_write().map_err(|e| BufferError::Internal(e.to_string()))?;
        {
            let mut table = wtxn.open_table(ENTRIES).map_err(|e| BufferError::Internal(e.to_string()))?;
            let keys: Vec<String> = table
                .iter()
                .map_err(|e| BufferError::Internal(e.to_string()))?
                .filter_map(|e| e.ok().map(|(k, _)| k.value().to_string()))
                .collect();
            for key in keys {
                table.remove(key.as_str()).map_err(|e| BufferError::Internal(e.to_string()))?;
            }
        }
        wtxn.commit().map_err(|e| BufferError::Internal(e.to_string()))?;
        Ok(())
    }

    async fn clear_by_source(&self, source_id: &str) -> Result<(), BufferError> {
        let ids: Vec<Uuid> = self
            .all()?
            .into_iter()
            .filter(|r| r.entry.record.metadata.source_id == source_id)
            .map(|r| r.id)
            .collect();
        self.delete(&ids).await
    }

    async fn recovery_candidates(&self, sink_name: &str) -> Result<Vec<BufferRecord>, BufferError> {
        let mut candidates: Vec<BufferRecord> = self
            .all()?
            .into_iter()
            .filter(|r| r.entry.is_recovery_candidate_for(sink_name))
            .collect();
        candidates.sort_by(|a, b| a.ingested_at().cmp(&b.ingested_at()));
        Ok(candidates)
    }

    async fn delete(&self, ids: &[Uuid]) -> Result<(), BufferError> {
        let wtxn = self.db.begin_write().map_err(|e| BufferError::Internal(e.to_string()))?;
        {
            let mut table = wtxn.open_table(ENTRIES).map_err(|e| BufferError::Internal(e.to_string()))?;
            for id in ids {
                table
                    .remove(id.to_string().as_str())
                    .map_err(|e| BufferError::Internal(e.to_string()))?;
            }
        }
        wtxn.commit().map_err(|e| BufferError::Internal(e.to_string()))?;
        Ok(())
    }

    async fn evict(&self, max_entries: usize, retention: std::time::Duration) -> Result<usize, BufferError> {
        let mut all = self.all()?;
        let cutoff = Utc::now() - chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::zero());

        let mut to_remove: Vec<Uuid> = all.iter().filter(|r| r.ingested_at() < cutoff).map(|r| r.id).collect();
        all.retain(|r| r.ingested_at() >= cutoff);

        if all.len() > max_entries {
            all.sort_by(|a, b| a.ingested_at().cmp(&b.ingested_at()));
            let overflow = all.len() - max_entries;
            to_remove.extend(all.iter().take(overflow).map(|r| r.id));
        }

        let removed = to_remove.len();
        self.delete(&to_remove).await?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daqg_domain::{BufferedEntry, CanonicalRecord, RecordMetadata};
    use tempfile::TempDir;

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
    async fn persistence_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("buffer.redb");
        {
            let buffer = RedbBuffer::open(&path).unwrap();
            buffer.store(record_at("m1", Utc::now())).await.unwrap();
        }
        {
            let buffer = RedbBuffer::open(&path).unwrap();
            let latest = buffer.get_latest(10).await.unwrap();
            assert_eq!(latest.len(), 1);
        }
    }

    #[tokio::test]
    async fn get_by_source_filters_correctly() {
        let dir = TempDir::new().unwrap();
        let buffer = RedbBuffer::open(&dir.path().join("buffer.redb")).unwrap();
        buffer.store(record_at("m1", Utc::now())).await.unwrap();
        buffer.store(record_at("m2", Utc::now())).await.unwrap();
        let m1 = buffer.get_by_source("m1", 10).await.unwrap();
        assert_eq!(m1.len(), 1);
    }
}
