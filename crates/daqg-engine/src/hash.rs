use serde::Serialize;
use sha2::{Digest, Sha256};

/// Serializes `value` to canonical JSON (object keys sorted) and returns its
/// SHA-256 hex digest. Used by reconciliation to detect unchanged specs
/// cheaply without a field-by-field diff (§4.7 step 1, §8 property 8).
pub fn compute_desired_hash<T: Serialize>(value: &T) -> String {
    let v = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
    let canonical = sort_json_keys(v);
    let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
    format!("{:x}", Sha256::digest(&bytes))
}

fn sort_json_keys(v: serde_json::Value) -> serde_json::Value {
    match v {
        serde_json::Value::Object(map) => {
            let sorted: std::collections::BTreeMap<String, serde_json::Value> =
                map.into_iter().map(|(k, v)| (k, sort_json_keys(v))).collect();
            serde_json::Value::Object(sorted.into_iter().collect())
        }
        serde_json::Value::Array(arr) => {
            serde_json::Value::Array(arr.into_iter().map(sort_json_keys).collect())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_under_key_reordering() {
        let a = serde_json::json!({"a": 1, "b": 2});
        let b = serde_json::json!({"b": 2, "a": 1});
        assert_eq!(compute_desired_hash(&a), compute_desired_hash(&b));
    }

    #[test]
    fn hash_changes_when_value_changes() {
        let a = serde_json::json!({"a": 1});
        let b = serde_json::json!({"a": 2});
        assert_ne!(compute_desired_hash(&a), compute_desired_hash(&b));
    }
}
