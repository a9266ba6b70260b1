use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::driver::{Driver, DriverStatus};
use crate::error::DriverError;
use crate::event::{DiscoveredPoint, DriverErrorKind, DriverEvent};

#[derive(Debug, Clone, Deserialize)]
struct MqttConfig {
    #[serde(rename = "brokerUrl")]
    broker_url: String,
    #[serde(default)]
    topics: Vec<String>,
    #[serde(rename = "clientId")]
    client_id: Option<String>,
}

fn parse_broker_url(url: &str) -> Result<(String, u16), DriverError> {
    let trimmed = url
        .trim_start_matches("mqtt://")
        .trim_start_matches("tcp://");
    let (host, port) = trimmed
        .rsplit_once(':')
        .ok_or_else(|| DriverError::Config(format!("invalid broker url: {url}")))?;
    let port: u16 = port
        .parse()
        .map_err(|_| DriverError::Config(format!("invalid broker port in url: {url}")))?;
    Ok((host.to_string(), port))
}

/// Driver for `mqtt` (§4.1): subscribes to the configured topic list, or —
/// when empty — browses via a bounded `#` window (§4.3).
pub struct MqttDriver {
    config: Option<MqttConfig>,
    connected: Arc<AtomicBool>,
    stop: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

impl Default for MqttDriver {
    fn default() -> Self {
        MqttDriver {
            config: None,
            connected: Arc::new(AtomicBool::new(false)),
            stop: None,
            task: None,
        }
    }
}

impl MqttDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn config(&self) -> Result<&MqttConfig, DriverError> {
        self.config.as_ref().ok_or_else(|| DriverError::Internal("not initialized".into()))
    }

    fn client_options(config: &MqttConfig) -> Result<MqttOptions, DriverError> {
        let (host, port) = parse_broker_url(&config.broker_url)?;
        let client_id = config
            .client_id
            .clone()
            .unwrap_or_else(|| format!("daqg-{}", uuid_like()));
        let mut opts = MqttOptions::new(client_id, host, port);
        opts.set_keep_alive(Duration::from_secs(30));
        Ok(opts)
    }
}

fn uuid_like() -> String {
    format!("{:x}", std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0))
}

#[async_trait]
impl Driver for MqttDriver {
    fn name(&self) -> &'static str {
        "mqtt"
    }

    async fn validate(&self, config: &serde_json::Value) -> Result<(), DriverError> {
        let parsed: MqttConfig =
            serde_json::from_value(config.clone()).map_err(|e| DriverError::Config(e.to_string()))?;
        parse_broker_url(&parsed.broker_url)?;
        Ok(())
    }

    async fn initialize(&mut self, config: serde_json::Value) -> Result<(), DriverError> {
        let parsed: MqttConfig =
            serde_json::from_value(config).map_err(|e| DriverError::Config(e.to_string()))?;
        self.config = Some(parsed);
        Ok(())
    }

    async fn start(&mut self, events: mpsc::Sender<DriverEvent>) -> Result<(), DriverError> {
        let config = self.config()?.clone();
        let opts = Self::client_options(&config)?;
        let connected = self.connected.clone();
        let token = CancellationToken::new();
        self.stop = Some(token.clone());

        let (client, mut eventloop) = AsyncClient::new(opts, 64);
        let topics = if config.topics.is_empty() {
            vec!["#".to_string()]
        } else {
            config.topics.clone()
        };
        for topic in &topics {
            client
                .subscribe(topic, QoS::AtMostOnce)
                .await
                .map_err(|e| DriverError::Connect(e.to_string()))?;
        }

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        let _ = client.disconnect().await;
                        return;
                    }
                    notification = eventloop.poll() => {
                        match notification {
                            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                                connected.store(true, Ordering::SeqCst);
                                let _ = events.send(DriverEvent::Connected).await;
                            }
                            Ok(Event::Incoming(Packet::Publish(publish))) => {
                                let payload = parse_payload(&publish.payload);
                                let sample = serde_json::json!({
                                    "topic": publish.topic,
                                    "payload": payload,
                                });
                                if events.send(DriverEvent::Sample(sample)).await.is_err() {
                                    return;
                                }
                            }
                            Ok(_) => {}
                            Err(e) => {
                                connected.store(false, Ordering::SeqCst);
                                warn!(error = %e, "mqtt event loop error");
                                let _ = events
                                    .send(DriverEvent::Error {
                                        kind: DriverErrorKind::Connect,
                                        detail: e.to_string(),
                                    })
                                    .await;
                                let _ = events.send(DriverEvent::Disconnected(e.to_string())).await;
                                tokio::time::sleep(Duration::from_secs(1)).await;
                            }
                        }
                    }
                }
            }
        });
        self.task = Some(task);
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), DriverError> {
        if let Some(token) = self.stop.take() {
            token.cancel();
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn status(&self) -> DriverStatus {
        DriverStatus {
            connected: self.connected.load(Ordering::SeqCst),
            last_error: None,
        }
    }

    async fn discover(&self) -> Result<Vec<DiscoveredPoint>, DriverError> {
        let config = self.config()?;
        let opts = Self::client_options(config)?;
        let (client, mut eventloop) = AsyncClient::new(opts, 64);
        client
            .subscribe("#", QoS::AtMostOnce)
            .await
            .map_err(|e| DriverError::Connect(e.to_string()))?;

        let mut topics = std::collections::BTreeSet::new();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                break;
            }
            match tokio::time::timeout(remaining, eventloop.poll()).await {
                Ok(Ok(Event::Incoming(Packet::Publish(publish)))) => {
                    if !publish.topic.starts_with('$') {
                        topics.insert(publish.topic);
                    }
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => return Err(DriverError::Connect(e.to_string())),
                Err(_) => break,
            }
        }
        let _ = client.disconnect().await;
        Ok(topics.into_iter().map(DiscoveredPoint::new).collect())
    }
}

fn parse_payload(bytes: &[u8]) -> serde_json::Value {
    serde_json::from_slice(bytes).unwrap_or_else(|_| {
        serde_json::Value::String(String::from_utf8_lossy(bytes).to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_broker_url_strips_scheme_and_splits_port() {
        let (host, port) = parse_broker_url("mqtt://broker.local:1883").unwrap();
        assert_eq!(host, "broker.local");
        assert_eq!(port, 1883);
    }

    #[test]
    fn parse_payload_falls_back_to_string_for_non_json() {
        let v = parse_payload(b"not json");
        assert_eq!(v, serde_json::Value::String("not json".to_string()));
    }

    #[test]
    fn parse_payload_decodes_json_object() {
        let v = parse_payload(br#"{"temperature":23.5,"status":true}"#);
        assert_eq!(v["temperature"], serde_json::json!(23.5));
        assert_eq!(v["status"], serde_json::json!(true));
    }
}
