use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use daqg_domain::{CanonicalRecord, CompactRecord, WireFormat};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tracing::warn;

use crate::outcome::PublishOutcome;
use crate::sink::Sink;

/// Broker sink (§4.6): topic derived as `<base>/<type>/<id>`, QoS and retain
/// configurable. Owns a persistent MQTT connection; `rumqttc`'s event loop is
/// drained on a background task purely to keep the connection alive and to
/// observe its health.
pub struct BrokerSink {
    name: String,
    base_topic: String,
    qos: QoS,
    retain: bool,
    format: WireFormat,
    client: AsyncClient,
    healthy: Arc<AtomicBool>,
}

fn qos_from_u8(qos: u8) -> QoS {
    match qos {
        1 => QoS::AtLeastOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtMostOnce,
    }
}

impl BrokerSink {
    pub fn connect(
        name: String,
        endpoint: &str,
        base_topic: String,
        qos: u8,
        retain: bool,
        format: WireFormat,
    ) -> Result<Self, crate::error::TransportError> {
        let trimmed = endpoint.trim_start_matches("mqtt://").trim_start_matches("tcp://");
        let (host, port) = trimmed
            .rsplit_once(':')
            .ok_or_else(|| crate::error::TransportError::Internal(format!("invalid broker endpoint: {endpoint}")))?;
        let port: u16 = port
            .parse()
            .map_err(|_| crate::error::TransportError::Internal(format!("invalid broker port: {endpoint}")))?;

        let mut opts = MqttOptions::new(format!("daqg-sink-{name}"), host, port);
        opts.set_keep_alive(Duration::from_secs(30));
        let (client, mut eventloop) = AsyncClient::new(opts, 64);

        let healthy = Arc::new(AtomicBool::new(true));
        let healthy_task = healthy.clone();
        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        healthy_task.store(true, Ordering::SeqCst);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "broker sink event loop error");
                        healthy_task.store(false, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Ok(BrokerSink {
            name,
            base_topic,
            qos: qos_from_u8(qos),
            retain,
            format,
            client,
            healthy,
        })
    }

    fn topic(&self, record: &CanonicalRecord) -> String {
        format!("{}/{}/{}", self.base_topic, record.kind, record.id)
    }
}

#[async_trait]
impl Sink for BrokerSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&self, record: &CanonicalRecord) -> PublishOutcome {
        let topic = self.topic(record);
        let payload = match self.format {
            WireFormat::Verbose => serde_json::to_vec(record),
            WireFormat::Compact => serde_json::to_vec(&CompactRecord::from(record)),
        };
        let payload = match payload {
            Ok(p) => p,
            Err(e) => return PublishOutcome::Fatal(e.to_string()),
        };

        match self.client.publish(&topic, self.qos, self.retain, payload).await {
            Ok(()) => PublishOutcome::Ok,
            Err(e) => {
                warn!(sink = %self.name, error = %e, "broker publish failed");
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
    fn topic_is_base_type_id() {
        let sink = BrokerSink::connect(
            "broker".into(),
            "mqtt://localhost:1883",
            "telemetry".into(),
            0,
            false,
            WireFormat::Verbose,
        )
        .unwrap();
        assert_eq!(sink.topic(&record()), "telemetry/Sensor/m1");
    }

    #[test]
    fn qos_from_u8_maps_known_levels() {
        assert_eq!(qos_from_u8(0), QoS::AtMostOnce);
        assert_eq!(qos_from_u8(1), QoS::AtLeastOnce);
        assert_eq!(qos_from_u8(2), QoS::ExactlyOnce);
    }
}
