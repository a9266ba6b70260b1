use serde::{Deserialize, Serialize};

use crate::sink::SinkSpec;

/// Where the Data Buffer (C5) keeps its entries. Memory is always available;
/// the external backends degrade to in-memory on failure (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BufferBackend {
    Memory,
    Redb { path: String },
    Postgres { url: String },
}

impl Default for BufferBackend {
    fn default() -> Self {
        BufferBackend::Memory
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferConfig {
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_retention_days")]
    pub retention_days: u64,
    #[serde(default)]
    pub backend: BufferBackend,
}

fn default_max_entries() -> usize {
    10_000
}

fn default_retention_days() -> u64 {
    7
}

impl Default for BufferConfig {
    fn default() -> Self {
        BufferConfig {
            max_entries: default_max_entries(),
            retention_days: default_retention_days(),
            backend: BufferBackend::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputFormats {
    #[serde(default = "default_true")]
    pub json: bool,
    #[serde(default)]
    pub compact: bool,
}

fn default_true() -> bool {
    true
}

impl Default for OutputFormats {
    fn default() -> Self {
        OutputFormats {
            json: true,
            compact: false,
        }
    }
}

/// The validated storage + transport document (§6 "On-disk configuration").
#[derive(Debug, Clone, Default)]
pub struct StorageConfig {
    pub buffer: BufferConfig,
    pub sinks: Vec<SinkSpec>,
    pub output_formats: OutputFormats,
}
