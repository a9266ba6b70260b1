use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceId(pub String);

impl SourceId {
    pub fn new(s: impl Into<String>) -> Self {
        SourceId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Closed set of protocol drivers, dispatched as a tagged variant rather than
/// a runtime class lookup (§9 "Plugin-by-tag driver dispatch"). New protocols
/// are compile-time additions here and in `daqg-driver::registry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    OpcUa,
    Modbus,
    Mqtt,
    Http,
    S7,
    Fins,
    Melsec,
    Cip,
    Bacnet,
    Profinet,
    EtherCat,
    Serial,
    Aas,
}

impl DriverKind {
    /// Folds a config-file tag (including known aliases) to the canonical variant.
    pub fn from_tag(tag: &str) -> Result<Self, DomainError> {
        let normalized = tag.to_ascii_lowercase().replace(['-', '_', ' '], "");
        let kind = match normalized.as_str() {
            "opcua" | "opc" => DriverKind::OpcUa,
            "modbus" | "modbustcp" | "modbusrtu" | "modbustcpip" => DriverKind::Modbus,
            "mqtt" => DriverKind::Mqtt,
            "http" | "https" | "rest" => DriverKind::Http,
            "s7" | "s7comm" => DriverKind::S7,
            "fins" | "omronfins" => DriverKind::Fins,
            "melsec" | "mcprotocol" => DriverKind::Melsec,
            "cip" | "ethernetip" | "enip" => DriverKind::Cip,
            "bacnet" | "bacnetip" => DriverKind::Bacnet,
            "profinet" => DriverKind::Profinet,
            "ethercat" => DriverKind::EtherCat,
            "serial" | "rtu" => DriverKind::Serial,
            "aas" | "assetadministrationshell" => DriverKind::Aas,
            other => return Err(DomainError::UnknownDriverTag(other.to_string())),
        };
        Ok(kind)
    }

    pub fn as_tag(&self) -> &'static str {
        match self {
            DriverKind::OpcUa => "opcua",
            DriverKind::Modbus => "modbus",
            DriverKind::Mqtt => "mqtt",
            DriverKind::Http => "http",
            DriverKind::S7 => "s7",
            DriverKind::Fins => "fins",
            DriverKind::Melsec => "melsec",
            DriverKind::Cip => "cip",
            DriverKind::Bacnet => "bacnet",
            DriverKind::Profinet => "profinet",
            DriverKind::EtherCat => "ethercat",
            DriverKind::Serial => "serial",
            DriverKind::Aas => "aas",
        }
    }

    /// The protocols exercised by a concrete, non-stub driver implementation.
    /// The remainder share the generic simulated stub driver.
    pub fn has_native_driver(&self) -> bool {
        matches!(
            self,
            DriverKind::Modbus | DriverKind::Mqtt | DriverKind::Http | DriverKind::OpcUa
        )
    }
}

impl std::fmt::Display for DriverKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_tag())
    }
}

impl<'de> Deserialize<'de> for DriverKind {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        use serde::de::Error;
        let raw = String::deserialize(d)?;
        DriverKind::from_tag(&raw).map_err(D::Error::custom)
    }
}

/// `delay_n = initialDelay * 2^(n-1)` for attempt `n`, capped by `maxAttempts` (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    #[serde(with = "duration_millis")]
    pub initial_delay: Duration,
}

impl RetryPolicy {
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        debug_assert!(attempt >= 1);
        let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
        self.initial_delay
            .checked_mul(factor as u32)
            .unwrap_or(Duration::from_secs(u64::MAX))
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.max_attempts == 0 {
            return Err(DomainError::InvalidRetryPolicy(
                "max_attempts must be at least 1".into(),
            ));
        }
        if self.initial_delay.is_zero() {
            return Err(DomainError::InvalidRetryPolicy(
                "initial_delay must be positive".into(),
            ));
        }
        Ok(())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(500),
        }
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Declarative description of one connector to run (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSpec {
    pub id: SourceId,
    #[serde(rename = "type")]
    pub kind: DriverKind,
    pub enabled: bool,
    pub config: serde_json::Value,
    #[serde(rename = "autoMapping", default)]
    pub auto_mapping: bool,
    #[serde(rename = "retryPolicy", default)]
    pub retry_policy: RetryPolicy,
}

impl SourceSpec {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.id.as_str().trim().is_empty() {
            return Err(DomainError::InvalidSourceId(
                "source id must not be empty".into(),
            ));
        }
        self.retry_policy.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_kind_folds_known_aliases() {
        assert_eq!(DriverKind::from_tag("modbus-tcp").unwrap(), DriverKind::Modbus);
        assert_eq!(DriverKind::from_tag("MQTT").unwrap(), DriverKind::Mqtt);
        assert_eq!(DriverKind::from_tag("opc-ua").unwrap(), DriverKind::OpcUa);
    }

    #[test]
    fn driver_kind_rejects_unknown_tag() {
        assert!(DriverKind::from_tag("fieldbus-9000").is_err());
    }

    #[test]
    fn retry_policy_backoff_matches_exponential_formula() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(800));
    }

    #[test]
    fn source_spec_round_trips_through_json() {
        let spec = SourceSpec {
            id: SourceId::new("m1"),
            kind: DriverKind::Modbus,
            enabled: true,
            config: serde_json::json!({"host": "127.0.0.1"}),
            auto_mapping: false,
            retry_policy: RetryPolicy::default(),
        };
        let json = serde_json::to_string(&spec).unwrap();
        let back: SourceSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, spec.id);
        assert_eq!(back.kind, spec.kind);
    }
}
