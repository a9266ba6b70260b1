use serde_json::Value;

/// Extracts the value at a dotted path. Missing intermediate keys or a
/// non-object encountered mid-path yield `None` (§4.4 "missing source
/// fields are skipped without failing the record").
pub fn extract<'a>(sample: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = sample;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Writes `value` at a dotted path inside `target`, creating intermediate
/// objects as needed. If an existing non-object is encountered mid-path it
/// is replaced with an object (§4.4 "earlier scalar is dropped").
pub fn set(target: &mut serde_json::Map<String, Value>, path: &str, value: Value) {
    let segments: Vec<&str> = path.split('.').collect();
    set_recursive(target, &segments, value);
}

fn set_recursive(target: &mut serde_json::Map<String, Value>, segments: &[&str], value: Value) {
    match segments {
        [] => {}
        [last] => {
            target.insert((*last).to_string(), value);
        }
        [head, rest @ ..] => {
            let entry = target
                .entry((*head).to_string())
                .or_insert_with(|| Value::Object(serde_json::Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(serde_json::Map::new());
            }
            let nested = entry.as_object_mut().expect("just ensured object");
            set_recursive(nested, rest, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extract_finds_nested_value() {
        let sample = json!({"registers": {"temp": -42}});
        assert_eq!(extract(&sample, "registers.temp"), Some(&json!(-42)));
    }

    #[test]
    fn extract_returns_none_for_missing_intermediate() {
        let sample = json!({"registers": {"temp": -42}});
        assert_eq!(extract(&sample, "registers.humidity.raw"), None);
    }

    #[test]
    fn set_replaces_existing_scalar_with_object() {
        let mut target = serde_json::Map::new();
        target.insert("a".to_string(), json!(1));
        set(&mut target, "a.b", json!(2));
        assert_eq!(target.get("a"), Some(&json!({"b": 2})));
    }

    #[test]
    fn set_second_write_to_same_path_overwrites_first() {
        let mut target = serde_json::Map::new();
        set(&mut target, "x", json!(1));
        set(&mut target, "x", json!(2));
        assert_eq!(target.get("x"), Some(&json!(2)));
    }
}
