use std::path::Path;

use daqg_domain::{BufferBackend, BufferConfig, OutputFormats, SourceSpec, StorageConfig};
use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::raw::{sinks_from_raw, RawBufferBackend, RawSourceDocument, RawStorageDocument};

/// Loads the source-list document (§6). Malformed files are rejected outright;
/// callers are expected to retain the previous in-memory config on `Err`.
pub fn load_source_document(path: &Path) -> Result<Vec<SourceSpec>, ConfigError> {
    let content = read_to_string(path)?;
    let raw: RawSourceDocument = parse_yaml(&content, path)?;
    for spec in &raw.sources {
        spec.validate()
            .map_err(|e| ConfigError::Conversion {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
    }
    debug!(count = raw.sources.len(), path = %path.display(), "loaded source document");
    Ok(raw.sources)
}

/// Loads the storage + transport document (§6).
pub fn load_storage_document(path: &Path) -> Result<StorageConfig, ConfigError> {
    let content = read_to_string(path)?;
    let raw: RawStorageDocument = parse_yaml(&content, path)?;

    let backend = match raw.storage.backend {
        Some(RawBufferBackend::Memory) | None => BufferBackend::Memory,
        Some(RawBufferBackend::Redb { path }) => BufferBackend::Redb { path },
        Some(RawBufferBackend::Postgres { url }) => BufferBackend::Postgres { url },
    };

    let buffer = BufferConfig {
        max_entries: raw.storage.max_data_points.unwrap_or(10_000),
        retention_days: raw.storage.retention_days.unwrap_or(7),
        backend,
    };

    let sinks = sinks_from_raw(raw.transport);
    let output_formats = raw.output_formats.unwrap_or_default();

    Ok(StorageConfig {
        buffer,
        sinks,
        output_formats,
    })
}

/// Writes `sources` back to `path` as the atomic-replace source document
/// (§4.8 "Writes are atomic (temp file + rename)").
pub fn write_source_document(path: &Path, sources: &[SourceSpec]) -> Result<(), ConfigError> {
    let doc = RawSourceDocument {
        sources: sources.to_vec(),
    };
    let yaml = serde_yaml::to_string(&doc).map_err(|e| ConfigError::YamlParse {
        path: path.display().to_string(),
        source: e,
    })?;
    atomic_write(path, &yaml)
}

/// Writes the raw storage + transport document back to `path`, same
/// atomic-replace discipline as [`write_source_document`].
pub fn write_storage_document(path: &Path, doc: &RawStorageDocument) -> Result<(), ConfigError> {
    let yaml = serde_yaml::to_string(doc).map_err(|e| ConfigError::YamlParse {
        path: path.display().to_string(),
        source: e,
    })?;
    atomic_write(path, &yaml)
}

pub(crate) fn atomic_write(path: &Path, contents: &str) -> Result<(), ConfigError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let tmp_path = dir.join(format!(
        ".{}.tmp",
        path.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "config".to_string())
    ));
    std::fs::write(&tmp_path, contents).map_err(|e| ConfigError::Io {
        path: tmp_path.display().to_string(),
        source: e,
    })?;
    std::fs::rename(&tmp_path, path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(())
}

fn read_to_string(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    })
}

fn parse_yaml<T: serde::de::DeserializeOwned>(content: &str, path: &Path) -> Result<T, ConfigError> {
    serde_yaml::from_str(content).map_err(|e| {
        warn!(path = %path.display(), error = %e, "failed to parse config document");
        ConfigError::YamlParse {
            path: path.display().to_string(),
            source: e,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use daqg_domain::SinkSpec;

    #[test]
    fn load_source_document_parses_modbus_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sources.yml");
        std::fs::write(
            &path,
            r#"
sources:
  - id: m1
    type: modbus
    enabled: true
    config:
      host: 127.0.0.1
      port: 5020
    autoMapping: false
    retryPolicy:
      maxAttempts: 5
      initialDelay: 500
"#,
        )
        .unwrap();

        let sources = load_source_document(&path).unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].id.as_str(), "m1");
    }

    #[test]
    fn load_storage_document_applies_defaults_and_sinks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.yml");
        std::fs::write(
            &path,
            r#"
storage:
  maxDataPoints: 500
transport:
  httpPush:
    endpoint: https://example.test/ingest
"#,
        )
        .unwrap();

        let storage = load_storage_document(&path).unwrap();
        assert_eq!(storage.buffer.max_entries, 500);
        assert_eq!(storage.buffer.retention_days, 7);
        assert_eq!(storage.sinks.len(), 1);
        assert!(matches!(storage.sinks[0], SinkSpec::HttpPush { .. }));
    }

    #[test]
    fn malformed_document_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sources.yml");
        std::fs::write(&path, "sources: [ { id: m1, type: not-a-real-driver } ]").unwrap();
        assert!(load_source_document(&path).is_err());
    }

    #[test]
    fn write_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sources.yml");
        let sources = vec![daqg_domain::SourceSpec {
            id: daqg_domain::SourceId::new("m1"),
            kind: daqg_domain::DriverKind::Mqtt,
            enabled: true,
            config: serde_json::json!({}),
            auto_mapping: true,
            retry_policy: daqg_domain::RetryPolicy::default(),
        }];
        write_source_document(&path, &sources).unwrap();
        let loaded = load_source_document(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, sources[0].id);
    }
}
