use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::source::SourceId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingTargetKind {
    NgsiLd,
    Canonical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingTarget {
    #[serde(rename = "type")]
    pub kind: MappingTargetKind,
    #[serde(rename = "entityType")]
    pub entity_type: String,
}

/// Transform variants, exhaustive per §4.4. `Formula` is evaluated by a
/// restricted AST interpreter (`daqg_mapping::formula`), never a host eval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Transform {
    Direct,
    Number,
    String,
    Boolean,
    Scale { factor: f64, offset: f64 },
    Round { decimals: u32 },
    Uppercase,
    Lowercase,
    Map { table: HashMap<String, serde_json::Value> },
    Formula { expr: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mapping {
    #[serde(rename = "sourceField")]
    pub source_field: String,
    #[serde(rename = "targetField")]
    pub target_field: String,
    #[serde(flatten)]
    pub transform: Transform,
}

/// Persistent, per-source transformation recipe (§3). At most one rule per
/// `source_id` is enforced by the catalog, not by this type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingRule {
    #[serde(rename = "sourceId")]
    pub source_id: SourceId,
    pub target: MappingTarget,
    pub mappings: Vec<Mapping>,
    #[serde(rename = "includeMetadata", default)]
    pub include_metadata: bool,
    #[serde(rename = "autoGenerated", default)]
    pub auto_generated: bool,
    #[serde(rename = "generatedAt")]
    pub generated_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_scale_round_trips() {
        let t = Transform::Scale {
            factor: 0.1,
            offset: -273.15,
        };
        let json = serde_json::to_string(&t).unwrap();
        let back: Transform = serde_json::from_str(&json).unwrap();
        assert_eq!(t, back);
    }

    #[test]
    fn mapping_rule_round_trips_through_json() {
        let rule = MappingRule {
            source_id: SourceId::new("m1"),
            target: MappingTarget {
                kind: MappingTargetKind::Canonical,
                entity_type: "Sensor".into(),
            },
            mappings: vec![Mapping {
                source_field: "registers.temp".into(),
                target_field: "temp".into(),
                transform: Transform::Direct,
            }],
            include_metadata: true,
            auto_generated: false,
            generated_at: None,
        };
        let json = serde_json::to_string(&rule).unwrap();
        let back: MappingRule = serde_json::from_str(&json).unwrap();
        assert_eq!(back.mappings.len(), 1);
        assert_eq!(back.source_id, rule.source_id);
    }
}
