use daqg_domain::{DriverKind, SourceSpec};
use daqg_driver::DiscoveredPoint;

/// Config key each protocol's explicit point list lives under. Mirrors the
/// keys `ConnectorSupervisor::needs_discovery` checks for absence of.
fn point_list_key(kind: DriverKind) -> Option<&'static str> {
    match kind {
        DriverKind::Modbus => Some("registers"),
        DriverKind::OpcUa => Some("nodes"),
        DriverKind::Mqtt => Some("topics"),
        _ => None,
    }
}

/// Promotes a discovery catalog into a source's live config (§4.3
/// "promote into live config"), replacing whatever point list was there.
/// Returns `None` if the driver has no promotable point-list key.
pub fn promote(spec: &SourceSpec, points: &[DiscoveredPoint]) -> Option<SourceSpec> {
    let key = point_list_key(spec.kind)?;
    let mut config = spec.config.clone();
    if !config.is_object() {
        config = serde_json::Value::Object(serde_json::Map::new());
    }
    let entries: Vec<serde_json::Value> = points
        .iter()
        .map(|p| serde_json::to_value(p).unwrap_or(serde_json::Value::Null))
        .collect();
    config
        .as_object_mut()
        .expect("config coerced to object above")
        .insert(key.to_string(), serde_json::Value::Array(entries));

    let mut promoted = spec.clone();
    promoted.config = config;
    Some(promoted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use daqg_domain::{RetryPolicy, SourceId};

    #[test]
    fn promotes_discovered_points_into_config() {
        let spec = SourceSpec {
            id: SourceId::new("m1"),
            kind: DriverKind::Modbus,
            enabled: true,
            config: serde_json::json!({"host": "127.0.0.1"}),
            auto_mapping: false,
            retry_policy: RetryPolicy::default(),
        };
        let points = vec![DiscoveredPoint::new("40001")];
        let promoted = promote(&spec, &points).unwrap();
        assert!(promoted.config.get("registers").unwrap().as_array().unwrap().len() == 1);
        assert_eq!(promoted.config.get("host").unwrap(), "127.0.0.1");
    }

    #[test]
    fn unsupported_protocol_returns_none() {
        let spec = SourceSpec {
            id: SourceId::new("h1"),
            kind: DriverKind::Http,
            enabled: true,
            config: serde_json::json!({}),
            auto_mapping: false,
            retry_policy: RetryPolicy::default(),
        };
        assert!(promote(&spec, &[]).is_none());
    }
}
