use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    Verbose,
    Compact,
}

impl Default for WireFormat {
    fn default() -> Self {
        WireFormat::Verbose
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "lowercase")]
pub enum HttpAuth {
    None,
    Basic { username: String, password: String },
    Bearer { token: String },
}

/// Declarative description of one transport endpoint (§3, §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SinkSpec {
    Bus {
        name: String,
        endpoint: String,
        #[serde(default)]
        namespace: Option<String>,
        #[serde(default)]
        format: WireFormat,
    },
    Broker {
        name: String,
        endpoint: String,
        #[serde(default = "default_broker_base")]
        base_topic: String,
        #[serde(default)]
        qos: u8,
        #[serde(default)]
        retain: bool,
        #[serde(default)]
        format: WireFormat,
    },
    HttpPush {
        name: String,
        endpoint: String,
        #[serde(default)]
        auth: HttpAuth,
        #[serde(default = "default_batch_size")]
        batch_size: usize,
        #[serde(default = "default_flush_interval_ms", with = "millis")]
        flush_interval: Duration,
        #[serde(default)]
        format: WireFormat,
    },
}

impl Default for HttpAuth {
    fn default() -> Self {
        HttpAuth::None
    }
}

fn default_broker_base() -> String {
    "telemetry".into()
}

fn default_batch_size() -> usize {
    50
}

fn default_flush_interval_ms() -> Duration {
    Duration::from_secs(5)
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

impl SinkSpec {
    pub fn name(&self) -> &str {
        match self {
            SinkSpec::Bus { name, .. } => name,
            SinkSpec::Broker { name, .. } => name,
            SinkSpec::HttpPush { name, .. } => name,
        }
    }

    pub fn format(&self) -> WireFormat {
        match self {
            SinkSpec::Bus { format, .. } => *format,
            SinkSpec::Broker { format, .. } => *format,
            SinkSpec::HttpPush { format, .. } => *format,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_push_sink_round_trips_with_defaults() {
        let json = serde_json::json!({
            "kind": "http-push",
            "name": "cloud",
            "endpoint": "https://example.test/ingest"
        });
        let sink: SinkSpec = serde_json::from_value(json).unwrap();
        match sink {
            SinkSpec::HttpPush {
                batch_size,
                flush_interval,
                ..
            } => {
                assert_eq!(batch_size, 50);
                assert_eq!(flush_interval, Duration::from_secs(5));
            }
            _ => panic!("expected HttpPush"),
        }
    }
}
