use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use daqg_domain::DriverKind;

use crate::driver::{Driver, DriverStatus};
use crate::error::DriverError;
use crate::event::DriverEvent;

/// Simulated driver shared by the protocols with no dedicated implementation
/// (s7, fins, melsec, cip, bacnet, profinet, ethercat, serial, aas — §4.1).
/// Emits a single synthetic point on a fixed interval so the connector
/// lifecycle and mapping pipeline exercise real code paths end-to-end.
pub struct StubDriver {
    kind: DriverKind,
    connected: Arc<AtomicBool>,
    stop: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
    polling_interval_ms: u64,
}

impl StubDriver {
    pub fn new(kind: DriverKind) -> Self {
        StubDriver {
            kind,
            connected: Arc::new(AtomicBool::new(false)),
            stop: None,
            task: None,
            polling_interval_ms: 1000,
        }
    }
}

#[async_trait]
impl Driver for StubDriver {
    fn name(&self) -> &'static str {
        self.kind.as_tag()
    }

    async fn validate(&self, _config: &serde_json::Value) -> Result<(), DriverError> {
        Ok(())
    }

    async fn initialize(&mut self, config: serde_json::Value) -> Result<(), DriverError> {
        if let Some(interval) = config.get("pollingInterval").and_then(|v| v.as_u64()) {
            self.polling_interval_ms = interval;
        }
        Ok(())
    }

    async fn start(&mut self, events: mpsc::Sender<DriverEvent>) -> Result<(), DriverError> {
        let connected = self.connected.clone();
        let token = CancellationToken::new();
        self.stop = Some(token.clone());
        let interval = self.polling_interval_ms;
        let tag = self.kind.as_tag();

        let task = tokio::spawn(async move {
            connected.store(true, Ordering::SeqCst);
            let _ = events.send(DriverEvent::Connected).await;
            loop {
                let sample = serde_json::json!({ "protocol": tag, "point": "status", "value": 1 });
                if events.send(DriverEvent::Sample(sample)).await.is_err() {
                    return;
                }
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(interval)) => {}
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

    #[tokio::test]
    async fn emits_connected_then_sample_for_every_stubbed_protocol() {
        for kind in [
            DriverKind::S7,
            DriverKind::Fins,
            DriverKind::Melsec,
            DriverKind::Cip,
            DriverKind::Bacnet,
            DriverKind::Profinet,
            DriverKind::EtherCat,
            DriverKind::Serial,
            DriverKind::Aas,
        ] {
            let mut driver = StubDriver::new(kind);
            driver.initialize(serde_json::json!({"pollingInterval": 5})).await.unwrap();
            let (tx, mut rx) = mpsc::channel(8);
            driver.start(tx).await.unwrap();
            assert!(matches!(rx.recv().await.unwrap(), DriverEvent::Connected));
            assert!(matches!(rx.recv().await.unwrap(), DriverEvent::Sample(_)));
            driver.stop().await.unwrap();
        }
    }
}
