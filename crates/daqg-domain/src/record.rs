use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Protocol-typed payload emitted by a driver. Opaque per driver; the only
/// contract is a JSON-like tree of string keys to primitive/nested values
/// (§3, §9 "Mapping value representation").
pub type RawSample = serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub value: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "sourceId")]
    pub source_id: String,
    #[serde(rename = "sourceType")]
    pub source_type: String,
    pub quality: String,
    /// Rule-added fields (e.g. the raw sample when `includeMetadata` is set).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The uniform output of the Mapping Engine (§3). `timestamp` is always set;
/// `measurements` may legitimately be empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub measurements: Vec<Measurement>,
    pub metadata: RecordMetadata,
}

/// Short-key wire form (§6 "Transport wire formats"). Losslessly reversible
/// to `CanonicalRecord` given the same schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactRecord {
    pub i: String,
    pub t: String,
    pub ts: DateTime<Utc>,
    pub m: Vec<CompactMeasurement>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub meta: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactMeasurement {
    pub i: String,
    pub t: String,
    pub v: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub u: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
}

impl From<&CanonicalRecord> for CompactRecord {
    fn from(record: &CanonicalRecord) -> Self {
        let mut meta = record.metadata.extra.clone();
        meta.insert(
            "sourceId".to_string(),
            serde_json::Value::String(record.metadata.source_id.clone()),
        );
        meta.insert(
            "sourceType".to_string(),
            serde_json::Value::String(record.metadata.source_type.clone()),
        );
        meta.insert(
            "quality".to_string(),
            serde_json::Value::String(record.metadata.quality.clone()),
        );
        CompactRecord {
            i: record.id.clone(),
            t: record.kind.clone(),
            ts: record.metadata.timestamp,
            m: record
                .measurements
                .iter()
                .map(|m| CompactMeasurement {
                    i: m.id.clone(),
                    t: m.kind.clone(),
                    v: m.value.clone(),
                    u: m.unit.clone(),
                    q: m.quality.clone(),
                })
                .collect(),
            meta,
        }
    }
}

impl From<&CompactRecord> for CanonicalRecord {
    fn from(compact: &CompactRecord) -> Self {
        let mut extra = compact.meta.clone();
        let source_id = extra
            .remove("sourceId")
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_default();
        let source_type = extra
            .remove("sourceType")
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_default();
        let quality = extra
            .remove("quality")
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_default();
        CanonicalRecord {
            id: compact.i.clone(),
            kind: compact.t.clone(),
            measurements: compact
                .m
                .iter()
                .map(|m| Measurement {
                    id: m.i.clone(),
                    kind: m.t.clone(),
                    value: m.v.clone(),
                    unit: m.u.clone(),
                    quality: m.q.clone(),
                })
                .collect(),
            metadata: RecordMetadata {
                timestamp: compact.ts,
                source_id,
                source_type,
                quality,
                extra,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_record() -> CanonicalRecord {
        CanonicalRecord {
            id: "m1".into(),
            kind: "Sensor".into(),
            measurements: vec![Measurement {
                id: "temp".into(),
                kind: "int".into(),
                value: serde_json::json!(-42),
                unit: Some("C".into()),
                quality: None,
            }],
            metadata: RecordMetadata {
                timestamp: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
                source_id: "m1".into(),
                source_type: "modbus".into(),
                quality: "good".into(),
                extra: serde_json::Map::new(),
            },
        }
    }

    #[test]
    fn compact_round_trip_is_lossless() {
        let record = sample_record();
        let compact = CompactRecord::from(&record);
        let back = CanonicalRecord::from(&compact);
        assert_eq!(back, record);
    }
}
