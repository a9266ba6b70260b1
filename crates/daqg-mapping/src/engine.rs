use chrono::Utc;
use daqg_domain::{
    CanonicalRecord, Mapping, MappingRule, MappingTarget, MappingTargetKind, Measurement,
    RawSample, RecordMetadata, SourceId, Transform,
};
use tracing::debug;

use crate::catalog::{stamp_generated_at, MappingCatalog};
use crate::error::MappingError;
use crate::{path, transform};

/// Applies `rule` to `sample`, producing a CanonicalRecord. Applying the
/// same rule to the same sample twice yields the same record modulo the
/// ingestion timestamp (§8 property 2).
pub fn apply_rule(
    source_id: &SourceId,
    source_type: &str,
    sample: &RawSample,
    rule: &MappingRule,
) -> CanonicalRecord {
    let mut target_tree = serde_json::Map::new();
    for mapping in &rule.mappings {
        let extracted = path::extract(sample, &mapping.source_field);
        if let Some(value) = transform::apply(extracted, &mapping.transform) {
            path::set(&mut target_tree, &mapping.target_field, value);
        } else {
            debug!(
                source_id = %source_id,
                field = %mapping.source_field,
                "mapping field skipped: missing or uncoercible"
            );
        }
    }

    let id = target_tree
        .remove("id")
        .and_then(|v| v.as_str().map(String::from))
        .unwrap_or_else(|| format!("{}:{}", rule.target.entity_type, source_id));

    let measurements = target_tree
        .into_iter()
        .map(|(key, value)| Measurement {
            id: key,
            kind: classify(&value),
            value,
            unit: None,
            quality: None,
        })
        .collect();

    let mut extra = serde_json::Map::new();
    if rule.include_metadata {
        extra.insert("rawSample".to_string(), sample.clone());
    }

    CanonicalRecord {
        id,
        kind: rule.target.entity_type.clone(),
        measurements,
        metadata: RecordMetadata {
            timestamp: Utc::now(),
            source_id: source_id.to_string(),
            source_type: source_type.to_string(),
            quality: "good".to_string(),
            extra,
        },
    }
}

fn classify(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Number(n) if n.is_i64() || n.is_u64() => "int".to_string(),
        serde_json::Value::Number(_) => "float".to_string(),
        serde_json::Value::Bool(_) => "bool".to_string(),
        serde_json::Value::String(_) => "string".to_string(),
        serde_json::Value::Array(_) => "array".to_string(),
        serde_json::Value::Object(_) => "object".to_string(),
        serde_json::Value::Null => "null".to_string(),
    }
}

/// Synthesizes one mapping per leaf of `sample` (§4.4 `autogenerate`).
/// Applying the synthesized rule back to `sample` reproduces every leaf
/// (§8 property 4).
pub fn autogenerate(source_id: &SourceId, sample: &RawSample, entity_type: &str) -> MappingRule {
    let mut mappings = Vec::new();
    collect_leaf_mappings(sample, String::new(), &mut mappings);

    MappingRule {
        source_id: source_id.clone(),
        target: MappingTarget {
            kind: MappingTargetKind::Canonical,
            entity_type: entity_type.to_string(),
        },
        mappings,
        include_metadata: false,
        auto_generated: true,
        generated_at: Some(Utc::now()),
    }
}

fn collect_leaf_mappings(value: &serde_json::Value, prefix: String, out: &mut Vec<Mapping>) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, inner) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                collect_leaf_mappings(inner, path, out);
            }
        }
        serde_json::Value::Number(_) => {
            out.push(Mapping {
                source_field: prefix.clone(),
                target_field: snake_case_target(&prefix),
                transform: Transform::Number,
            });
        }
        serde_json::Value::Bool(_) => out.push(Mapping {
            source_field: prefix.clone(),
            target_field: snake_case_target(&prefix),
            transform: Transform::Boolean,
        }),
        serde_json::Value::String(_) => out.push(Mapping {
            source_field: prefix.clone(),
            target_field: snake_case_target(&prefix),
            transform: Transform::String,
        }),
        serde_json::Value::Null | serde_json::Value::Array(_) => {
            // Arrays and nulls have no single-leaf coercion; not auto-mapped.
        }
    }
}

fn snake_case_target(dotted_path: &str) -> String {
    dotted_path.replace('.', "_")
}

/// `apply(sourceId, RawSample) -> CanonicalRecord | None` (§4.4 contract),
/// including auto-mapping synthesis on first sample when enabled.
pub struct MappingEngine {
    catalog: MappingCatalog,
}

impl MappingEngine {
    pub fn new(catalog: MappingCatalog) -> Self {
        MappingEngine { catalog }
    }

    pub fn catalog(&self) -> &MappingCatalog {
        &self.catalog
    }

    pub fn apply(
        &self,
        source_id: &SourceId,
        source_type: &str,
        sample: &RawSample,
        auto_mapping: bool,
    ) -> Result<Option<CanonicalRecord>, MappingError> {
        if let Some(rule) = self.catalog.get(source_id) {
            return Ok(Some(apply_rule(source_id, source_type, sample, &rule)));
        }

        if !auto_mapping {
            return Ok(None);
        }

        let mut rule = autogenerate(source_id, sample, source_type);
        stamp_generated_at(&mut rule);
        self.catalog.add_rule(rule.clone(), false)?;
        Ok(Some(apply_rule(source_id, source_type, sample, &rule)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn apply_is_idempotent_modulo_timestamp() {
        let sample = json!({"registers": {"temp": -42}});
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
            include_metadata: false,
            auto_generated: false,
            generated_at: None,
        };
        let first = apply_rule(&SourceId::new("m1"), "modbus", &sample, &rule);
        let second = apply_rule(&SourceId::new("m1"), "modbus", &sample, &rule);
        assert_eq!(first.measurements, second.measurements);
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn second_mapping_to_same_target_wins() {
        let sample = json!({"a": 1, "b": 2});
        let rule = MappingRule {
            source_id: SourceId::new("m1"),
            target: MappingTarget {
                kind: MappingTargetKind::Canonical,
                entity_type: "Sensor".into(),
            },
            mappings: vec![
                Mapping {
                    source_field: "a".into(),
                    target_field: "x".into(),
                    transform: Transform::Direct,
                },
                Mapping {
                    source_field: "b".into(),
                    target_field: "x".into(),
                    transform: Transform::Direct,
                },
            ],
            include_metadata: false,
            auto_generated: false,
            generated_at: None,
        };
        let record = apply_rule(&SourceId::new("m1"), "modbus", &sample, &rule);
        assert_eq!(record.measurements.len(), 1);
        assert_eq!(record.measurements[0].value, json!(2));
    }

    #[test]
    fn autogenerated_rule_covers_every_leaf() {
        let sample = json!({"temperature": 23.5, "status": true});
        let rule = autogenerate(&SourceId::new("a1"), &sample, "Sensor");
        let record = apply_rule(&SourceId::new("a1"), "mqtt", &sample, &rule);
        let ids: Vec<&str> = record.measurements.iter().map(|m| m.id.as_str()).collect();
        assert!(ids.contains(&"temperature"));
        assert!(ids.contains(&"status"));
    }

    #[test]
    fn modbus_register_sample_maps_to_int_measurement() {
        let sample = json!({"registers": {"temp": -42}});
        let rule = MappingRule {
            source_id: SourceId::new("m1"),
            target: MappingTarget {
                kind: MappingTargetKind::Canonical,
                entity_type: "Sensor".into(),
            },
            mappings: vec![Mapping {
                source_field: "registers.temp".into(),
                target_field: "temp".into(),
                transform: Transform::Number,
            }],
            include_metadata: false,
            auto_generated: false,
            generated_at: None,
        };
        let record = apply_rule(&SourceId::new("m1"), "modbus", &sample, &rule);
        assert_eq!(record.measurements[0].id, "temp");
        assert_eq!(record.measurements[0].kind, "int");
        assert_eq!(record.measurements[0].value, json!(-42));
    }
}
