use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::driver::{Driver, DriverStatus};
use crate::error::DriverError;
use crate::event::{DriverErrorKind, DriverEvent};

#[derive(Debug, Clone, Deserialize)]
struct HttpConfig {
    url: String,
    #[serde(default = "default_method")]
    method: String,
    #[serde(rename = "pollingInterval", default = "default_polling_interval")]
    polling_interval_ms: u64,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_polling_interval() -> u64 {
    5000
}

/// Driver for `http` (§4.1): polls `url` at `pollingInterval` and emits the
/// parsed JSON body as a sample.
pub struct HttpDriver {
    config: Option<HttpConfig>,
    client: reqwest::Client,
    connected: Arc<AtomicBool>,
    stop: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

impl Default for HttpDriver {
    fn default() -> Self {
        HttpDriver {
            config: None,
            client: reqwest::Client::new(),
            connected: Arc::new(AtomicBool::new(false)),
            stop: None,
            task: None,
        }
    }
}

impl HttpDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn config(&self) -> Result<&HttpConfig, DriverError> {
        self.config.as_ref().ok_or_else(|| DriverError::Internal("not initialized".into()))
    }
}

#[async_trait]
impl Driver for HttpDriver {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn validate(&self, config: &serde_json::Value) -> Result<(), DriverError> {
        let parsed: HttpConfig =
            serde_json::from_value(config.clone()).map_err(|e| DriverError::Config(e.to_string()))?;
        reqwest::Url::parse(&parsed.url).map_err(|e| DriverError::Config(e.to_string()))?;
        Ok(())
    }

    async fn initialize(&mut self, config: serde_json::Value) -> Result<(), DriverError> {
        let parsed: HttpConfig =
            serde_json::from_value(config).map_err(|e| DriverError::Config(e.to_string()))?;
        self.config = Some(parsed);
        Ok(())
    }

    async fn start(&mut self, events: mpsc::Sender<DriverEvent>) -> Result<(), DriverError> {
        let config = self.config()?.clone();
        let client = self.client.clone();
        let connected = self.connected.clone();
        let token = CancellationToken::new();
        self.stop = Some(token.clone());

        let method = reqwest::Method::from_bytes(config.method.as_bytes())
            .map_err(|e| DriverError::Config(e.to_string()))?;

        let task = tokio::spawn(async move {
            loop {
                if token.is_cancelled() {
                    return;
                }
                let result = client
                    .request(method.clone(), &config.url)
                    .timeout(Duration::from_secs(5))
                    .send()
                    .await;
                match result {
                    Ok(resp) if resp.status().is_success() => {
                        if !connected.swap(true, Ordering::SeqCst) {
                            let _ = events.send(DriverEvent::Connected).await;
                        }
                        match resp.json::<serde_json::Value>().await {
                            Ok(body) => {
                                if events.send(DriverEvent::Sample(body)).await.is_err() {
                                    return;
                                }
                            }
                            Err(e) => {
                                let _ = events
                                    .send(DriverEvent::Error {
                                        kind: DriverErrorKind::Protocol,
                                        detail: e.to_string(),
                                    })
                                    .await;
                            }
                        }
                    }
                    Ok(resp) => {
                        warn!(status = %resp.status(), "http poll non-success status");
                        let _ = events
                            .send(DriverEvent::Error {
                                kind: DriverErrorKind::Protocol,
                                detail: format!("status {}", resp.status()),
                            })
                            .await;
                    }
                    Err(e) => {
                        if connected.swap(false, Ordering::SeqCst) {
                            let _ = events.send(DriverEvent::Disconnected(e.to_string())).await;
                        }
                        let _ = events
                            .send(DriverEvent::Error {
                                kind: DriverErrorKind::Connect,
                                detail: e.to_string(),
                            })
                            .await;
                    }
                }
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(config.polling_interval_ms)) => {}
                    _ = token.cancelled() => return,
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::channel;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn polls_and_emits_json_body_as_sample() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"temperature": 21.0})))
            .mount(&server)
            .await;

        let mut driver = HttpDriver::new();
        driver
            .initialize(serde_json::json!({
                "url": format!("{}/status", server.uri()),
                "pollingInterval": 50,
            }))
            .await
            .unwrap();

        let (tx, mut rx) = channel(8);
        driver.start(tx).await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, DriverEvent::Connected));
        let sample = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match sample {
            DriverEvent::Sample(v) => assert_eq!(v["temperature"], serde_json::json!(21.0)),
            other => panic!("expected sample, got {other:?}"),
        }
        driver.stop().await.unwrap();
    }
}
