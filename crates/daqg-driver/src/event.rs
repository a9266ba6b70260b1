use daqg_domain::RawSample;

/// One catalog entry surfaced by a driver's `discover()` (§4.3). The field
/// set is a union over protocols; each driver populates what applies and
/// leaves the rest `None`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DiscoveredPoint {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl DiscoveredPoint {
    pub fn new(id: impl Into<String>) -> Self {
        DiscoveredPoint {
            id: id.into(),
            name: None,
            kind: None,
            data_type: None,
            extra: serde_json::Map::new(),
        }
    }
}

/// Events emitted upward by a driver while running (§4.1). Drivers do not
/// retry themselves; the supervisor interprets `Disconnected`/`Error` and
/// decides whether to reconnect.
#[derive(Debug, Clone)]
pub enum DriverEvent {
    Sample(RawSample),
    Connected,
    Disconnected(String),
    Error { kind: DriverErrorKind, detail: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    Connect,
    Protocol,
}
