use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::buffer::Buffer;
use crate::entry::BufferRecord;
use crate::error::BufferError;

const MIGRATIONS: &str = r#"
CREATE TABLE IF NOT EXISTS buffer_entries (
    id          UUID PRIMARY KEY,
    source_id   TEXT NOT NULL,
    ingested_at TIMESTAMPTZ NOT NULL,
    entry       JSONB NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_buffer_entries_source ON buffer_entries (source_id);
CREATE INDEX IF NOT EXISTS idx_buffer_entries_ingested_at ON buffer_entries (ingested_at);
"#;

/// [`Buffer`] backed by PostgreSQL (§4.5 "relational" external backing).
/// On connection failure callers fall back to [`crate::InMemoryBuffer`].
#[derive(Clone)]
pub struct PostgresBuffer {
    pool: PgPool,
}

impl PostgresBuffer {
    pub async fn connect(url: &str) -> Result<Self, BufferError> {
        let pool = PgPool::connect(url)
            .await
            .map_err(|e| BufferError::Internal(format!("postgres connect: {e}")))?;
        let buffer = PostgresBuffer { pool };
        buffer.migrate().await?;
        Ok(buffer)
    }

    async fn migrate(&self) -> Result<(), BufferError> {
        sqlx::query(MIGRATIONS)
            .execute(&self.pool)
            .await
            .map_err(|e| BufferError::Internal(format!("migration: {e}")))?;
        Ok(())
    }
}

fn row_to_record(value: serde_json::Value) -> Result<BufferRecord, BufferError> {
    serde_json::from_value(value).map_err(BufferError::Serialization)
}

#[async_trait]
impl Buffer for PostgresBuffer {
    async fn store(&self, record: BufferRecord) -> Result<(), BufferError> {
        let json = serde_json::to_value(&record)?;
        sqlx::query(
            "INSERT INTO buffer_entries (id, source_id, ingested_at, entry)
             VALUES ($1, $2, $3, $4::jsonb)
             ON CONFLICT (id) DO UPDATE SET entry = EXCLUDED.entry",
        )
        .bind(record.id)
        .bind(&record.entry.record.metadata.source_id)
        .bind(record.ingested_at())
        .bind(json)
        .execute(&self.pool)
        .await
        .map_err(|e| BufferError::Internal(e.to_string()))?;
        Ok(())
    }

    async fn get_latest(&self, n: usize) -> Result<Vec<BufferRecord>, BufferError> {
        let rows: Vec<(serde_json::Value,)> = sqlx::query_as(
            "SELECT entry FROM buffer_entries ORDER BY ingested_at DESC LIMIT $1",
        )
        .bind(n as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| BufferError::Internal(e.to_string()))?;
        rows.into_iter().map(|(v,)| row_to_record(v)).collect()
    }

    async fn get_by_source(&self, source_id: &str, n: usize) -> Result<Vec<BufferRecord>, BufferError> {
        let rows: Vec<(serde_json::Value,)> = sqlx::query_as(
            "SELECT entry FROM buffer_entries WHERE source_id = $1 ORDER BY ingested_at DESC LIMIT $2",
        )
        .bind(source_id)
        .bind(n as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| BufferError::Internal(e.to_string()))?;
        rows.into_iter().map(|(v,)| row_to_record(v)).collect()
    }

    async fn get_by_time_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<BufferRecord>, BufferError> {
        let rows: Vec<(serde_json::Value,)> = sqlx::query_as(
            "SELECT entry FROM buffer_entries WHERE ingested_at BETWEEN $1 AND $2 ORDER BY ingested_at",
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| BufferError::Internal(e.to_string()))?;
        rows.into_iter().map(|(v,)| row_to_record(v)).collect()
    }

    async fn search(&self, substring: &str) -> Result<Vec<BufferRecord>, BufferError> {
        let pattern = format!("%{}%", substring.to_ascii_lowercase());
        let rows: Vec<(serde_json::Value,)> = sqlx::query_as(
            "SELECT entry FROM buffer_entries WHERE lower(entry::text) LIKE $1",
        )
        .bind(pattern)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| BufferError::Internal(e.to_string()))?;
        rows.into_iter().map(|(v,)| row_to_record(v)).collect()
    }

    async fn clear(&self) -> Result<(), BufferError> {
        sqlx::query("DELETE FROM buffer_entries")
            .execute(&self.pool)
            .await
            .map_err(|e| BufferError::Internal(e.to_string()))?;
        Ok(())
    }

    async fn clear_by_source(&self, source_id: &str) -> Result<(), BufferError> {
        sqlx::query("DELETE FROM buffer_entries WHERE source_id = $1")
            .bind(source_id)
            .execute(&self.pool)
            .await
            .map_err(|e| BufferError::Internal(e.to_string()))?;
        Ok(())
    }

    async fn recovery_candidates(&self, sink_name: &str) -> Result<Vec<BufferRecord>, BufferError> {
        let rows: Vec<(serde_json::Value,)> = sqlx::query_as(
            "SELECT entry FROM buffer_entries
             WHERE entry->>'role' = 'recovery' AND entry->>'intended_subject' = $1
             ORDER BY ingested_at",
        )
        .bind(sink_name)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| BufferError::Internal(e.to_string()))?;
        rows.into_iter().map(|(v,)| row_to_record(v)).collect()
    }

    async fn delete(&self, ids: &[Uuid]) -> Result<(), BufferError> {
        if ids.is_empty() {
            return Ok(());
        }
        sqlx::query("DELETE FROM buffer_entries WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await
            .map_err(|e| BufferError::Internal(e.to_string()))?;
        Ok(())
    }

    async fn evict(&self, max_entries: usize, retention: std::time::Duration) -> Result<usize, BufferError> {
        let cutoff = Utc::now() - chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::zero());
        let expired = sqlx::query("DELETE FROM buffer_entries WHERE ingested_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| BufferError::Internal(e.to_string()))?
            .rows_affected();

        let overflow = sqlx::query(
            "DELETE FROM buffer_entries WHERE id IN (
                SELECT id FROM buffer_entries ORDER BY ingested_at DESC OFFSET $1
            )",
        )
        .bind(max_entries as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| BufferError::Internal(e.to_string()))?
        .rows_affected();

        Ok((expired + overflow) as usize)
    }
}
