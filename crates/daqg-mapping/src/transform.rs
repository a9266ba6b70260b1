use serde_json::Value;

use daqg_domain::Transform;

use crate::formula::Formula;

/// Applies one transform to an extracted value. Returns `None` when the
/// field should be skipped (missing input, coercion failure) — never an
/// error; per-field failures never take down the record (§4.4, §7).
pub fn apply(value: Option<&Value>, transform: &Transform) -> Option<Value> {
    let value = value?;
    if value.is_null() {
        return None;
    }
    match transform {
        Transform::Direct => Some(value.clone()),
        Transform::Number => coerce_number(value).map(number_to_value),
        Transform::String => Some(Value::String(coerce_string(value))),
        Transform::Boolean => coerce_bool(value).map(Value::Bool),
        Transform::Scale { factor, offset } => {
            coerce_number(value).map(|v| number_to_value(v * factor + offset))
        }
        Transform::Round { decimals } => coerce_number(value).map(|v| number_to_value(round_half_away_from_zero(v, *decimals))),
        Transform::Uppercase => Some(Value::String(coerce_string(value).to_uppercase())),
        Transform::Lowercase => Some(Value::String(coerce_string(value).to_lowercase())),
        Transform::Map { table } => {
            let key = canonical_key(value);
            Some(table.get(&key).cloned().unwrap_or_else(|| value.clone()))
        }
        Transform::Formula { expr } => {
            let formula = Formula::parse(expr, "x").ok()?;
            coerce_number(value).map(|v| number_to_value(formula.eval(v)))
        }
    }
}

fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn coerce_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn round_half_away_from_zero(v: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    let scaled = v * factor;
    let rounded = if scaled >= 0.0 {
        (scaled + 0.5).floor()
    } else {
        (scaled - 0.5).ceil()
    };
    rounded / factor
}

/// Integers serialize without a trailing decimal so e.g. Modbus register
/// reads keep their `int` shape through `number`/`scale` transforms.
fn number_to_value(v: f64) -> Value {
    if v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
        Value::Number((v as i64).into())
    } else {
        serde_json::Number::from_f64(v)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

fn canonical_key(value: &Value) -> String {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else {
                n.to_string()
            }
        }
        Value::Bool(b) => b.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn scale_matches_spec_example() {
        let value = json!(1000);
        let out = apply(Some(&value), &Transform::Scale { factor: 0.1, offset: -273.15 }).unwrap();
        let f = out.as_f64().unwrap();
        assert!((f - (-173.15)).abs() < 1e-9);
    }

    #[test]
    fn round_matches_spec_example() {
        let value = json!(3.14159);
        let out = apply(Some(&value), &Transform::Round { decimals: 2 }).unwrap();
        assert!((out.as_f64().unwrap() - 3.14).abs() < 1e-9);
    }

    #[test]
    fn map_known_key_translates_unknown_passes_through() {
        let mut table = HashMap::new();
        table.insert("0".to_string(), json!("OFF"));
        table.insert("1".to_string(), json!("ON"));
        let transform = Transform::Map { table };

        let on = apply(Some(&json!(1)), &transform).unwrap();
        assert_eq!(on, json!("ON"));

        let passthrough = apply(Some(&json!(2)), &transform).unwrap();
        assert_eq!(passthrough, json!(2));
    }

    #[test]
    fn formula_matches_spec_example() {
        let transform = Transform::Formula {
            expr: "x * 9/5 + 32".to_string(),
        };
        let out = apply(Some(&json!(100)), &transform).unwrap();
        assert!((out.as_f64().unwrap() - 212.0).abs() < 1e-9);
    }

    #[test]
    fn null_input_is_skipped_not_written_as_null() {
        assert_eq!(apply(Some(&Value::Null), &Transform::Direct), None);
        assert_eq!(apply(None, &Transform::Direct), None);
    }

    #[test]
    fn non_numeric_scale_input_is_skipped() {
        let transform = Transform::Scale { factor: 1.0, offset: 0.0 };
        assert_eq!(apply(Some(&json!("not-a-number")), &transform), None);
    }
}
