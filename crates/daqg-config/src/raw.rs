use serde::{Deserialize, Serialize};

use daqg_domain::{HttpAuth, SinkSpec, WireFormat};

/// Raw YAML representation of the source-list document (§6): `{ sources: [...] }`.
/// `SourceSpec` already performs field-level validation (driver tag folding,
/// retry policy shape) through its own `Deserialize` impl.
#[derive(Debug, Deserialize, Serialize)]
pub struct RawSourceDocument {
    #[serde(default)]
    pub sources: Vec<daqg_domain::SourceSpec>,
}

/// Raw YAML representation of the storage + transport document (§6):
/// `{ storage: {...}, transport: { bus?, broker?, httpPush? }, outputFormats?: {...} }`.
#[derive(Debug, Deserialize, Serialize)]
pub struct RawStorageDocument {
    #[serde(default)]
    pub storage: RawStorageSettings,
    #[serde(default)]
    pub transport: RawTransport,
    #[serde(rename = "outputFormats", default)]
    pub output_formats: Option<daqg_domain::OutputFormats>,
}

#[derive(Debug, Deserialize, Serialize, Default)]
pub struct RawStorageSettings {
    #[serde(rename = "maxDataPoints")]
    pub max_data_points: Option<usize>,
    #[serde(rename = "retentionDays")]
    pub retention_days: Option<u64>,
    pub backend: Option<RawBufferBackend>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RawBufferBackend {
    Memory,
    Redb { path: String },
    Postgres { url: String },
}

#[derive(Debug, Deserialize, Serialize, Default)]
pub struct RawTransport {
    pub bus: Option<RawBusSink>,
    pub broker: Option<RawBrokerSink>,
    #[serde(rename = "httpPush")]
    pub http_push: Option<RawHttpPushSink>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RawBusSink {
    pub name: Option<String>,
    pub endpoint: String,
    pub namespace: Option<String>,
    #[serde(default)]
    pub format: WireFormat,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RawBrokerSink {
    pub name: Option<String>,
    pub endpoint: String,
    #[serde(rename = "baseTopic")]
    pub base_topic: Option<String>,
    #[serde(default)]
    pub qos: u8,
    #[serde(default)]
    pub retain: bool,
    #[serde(default)]
    pub format: WireFormat,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RawHttpPushSink {
    pub name: Option<String>,
    pub endpoint: String,
    #[serde(default)]
    pub auth: HttpAuth,
    #[serde(rename = "batchSize")]
    pub batch_size: Option<usize>,
    #[serde(rename = "flushIntervalMs")]
    pub flush_interval_ms: Option<u64>,
    #[serde(default)]
    pub format: WireFormat,
}

pub fn sinks_from_raw(raw: RawTransport) -> Vec<SinkSpec> {
    let mut sinks = Vec::new();
    if let Some(bus) = raw.bus {
        sinks.push(SinkSpec::Bus {
            name: bus.name.unwrap_or_else(|| "bus".to_string()),
            endpoint: bus.endpoint,
            namespace: bus.namespace,
            format: bus.format,
        });
    }
    if let Some(broker) = raw.broker {
        sinks.push(SinkSpec::Broker {
            name: broker.name.unwrap_or_else(|| "broker".to_string()),
            endpoint: broker.endpoint,
            base_topic: broker.base_topic.unwrap_or_else(|| "telemetry".to_string()),
            qos: broker.qos,
            retain: broker.retain,
            format: broker.format,
        });
    }
    if let Some(http_push) = raw.http_push {
        sinks.push(SinkSpec::HttpPush {
            name: http_push.name.unwrap_or_else(|| "http-push".to_string()),
            endpoint: http_push.endpoint,
            auth: http_push.auth,
            batch_size: http_push.batch_size.unwrap_or(50),
            flush_interval: std::time::Duration::from_millis(
                http_push.flush_interval_ms.unwrap_or(5_000),
            ),
            format: http_push.format,
        });
    }
    sinks
}
