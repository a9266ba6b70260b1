use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use daqg_domain::{CanonicalRecord, CompactRecord, WireFormat};
use tracing::warn;

use crate::outcome::PublishOutcome;
use crate::sink::Sink;

/// Message-bus sink (§4.6 "Bus sink"): one publish per record, subject
/// derived as `<namespace>.telemetry.<sourceId>` unless overridden.
/// No bus wire protocol is part of the ambient stack, so publication is a
/// plain HTTP POST of `{subject, record}` to the configured endpoint —
/// the same shape any message-bus HTTP gateway exposes.
pub struct BusSink {
    name: String,
    endpoint: String,
    namespace: String,
    format: WireFormat,
    client: reqwest::Client,
    healthy: Arc<AtomicBool>,
}

impl BusSink {
    pub fn new(name: String, endpoint: String, namespace: Option<String>, format: WireFormat) -> Self {
        BusSink {
            name,
            endpoint,
            namespace: namespace.unwrap_or_else(|| "daqg".to_string()),
            format,
            client: reqwest::Client::new(),
            healthy: Arc::new(AtomicBool::new(true)),
        }
    }

    fn subject(&self, record: &CanonicalRecord) -> String {
        format!("{}.telemetry.{}", self.namespace, record.metadata.source_id)
    }
}

#[async_trait]
impl Sink for BusSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&self, record: &CanonicalRecord) -> PublishOutcome {
        let subject = self.subject(record);
        let body = match self.format {
            WireFormat::Verbose => serde_json::json!({ "subject": subject, "record": record }),
            WireFormat::Compact => {
                serde_json::json!({ "subject": subject, "record": CompactRecord::from(record) })
            }
        };

        let result = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .timeout(Duration::from_secs(30))
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {
                self.healthy.store(true, Ordering::SeqCst);
                PublishOutcome::Ok
            }
            Ok(resp) if resp.status().is_client_error() => {
                self.healthy.store(true, Ordering::SeqCst);
                PublishOutcome::Fatal(format!("status {}", resp.status()))
            }
            Ok(resp) => {
                self.healthy.store(false, Ordering::SeqCst);
                PublishOutcome::Retriable(format!("status {}", resp.status()))
            }
            Err(e) => {
                warn!(sink = %self.name, error = %e, "bus publish failed");
                self.healthy.store(false, Ordering::SeqCst);
                PublishOutcome::Retriable(e.to_string())
            }
        }
    }

    async fn healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use daqg_domain::RecordMetadata;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn record() -> CanonicalRecord {
        CanonicalRecord {
            id: "m1".into(),
            kind: "Sensor".into(),
            measurements: vec![],
            metadata: RecordMetadata {
                timestamp: Utc::now(),
                source_id: "m1".into(),
                source_type: "modbus".into(),
                quality: "good".into(),
                extra: serde_json::Map::new(),
            },
        }
    }

    #[test]
    fn subject_is_namespace_telemetry_source_id() {
        let sink = BusSink::new("bus".into(), "http://localhost".into(), Some("plant".into()), WireFormat::Verbose);
        assert_eq!(sink.subject(&record()), "plant.telemetry.m1");
    }

    #[tokio::test]
    async fn publish_marks_unhealthy_on_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let sink = BusSink::new("bus".into(), server.uri(), None, WireFormat::Verbose);
        let outcome = sink.publish(&record()).await;
        assert!(outcome.is_retriable());
        assert!(!sink.healthy().await);
    }
}
