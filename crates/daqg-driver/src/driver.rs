use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::DriverError;
use crate::event::{DiscoveredPoint, DriverEvent};

/// Point-in-time snapshot returned by `status()` (§4.1). Transport-level
/// flags only; lifecycle state itself is owned by the supervisor, not the driver.
#[derive(Debug, Clone, Default)]
pub struct DriverStatus {
    pub connected: bool,
    pub last_error: Option<String>,
}

/// Contract every protocol driver implements (§4.1). A driver never retries
/// itself — reconnection is the supervisor's job (§4.2); a driver only
/// reports `Connected` / `Disconnected` / `Error` upward.
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Checks `config` is well-formed for this driver without opening any
    /// connection.
    async fn validate(&self, config: &serde_json::Value) -> Result<(), DriverError>;

    /// Builds any client object. No network activity yet.
    async fn initialize(&mut self, config: serde_json::Value) -> Result<(), DriverError>;

    /// Begins acquisition. Must not block: installs an internal producer
    /// that pushes events to `events` until `stop()` is called.
    async fn start(&mut self, events: mpsc::Sender<DriverEvent>) -> Result<(), DriverError>;

    /// Graceful shutdown: releases sockets, timers, subscriptions.
    async fn stop(&mut self) -> Result<(), DriverError>;

    async fn status(&self) -> DriverStatus;

    /// One-shot catalog retrieval (§4.3). Optional: the default rejects with
    /// `Unsupported` for drivers that always require an explicit point list.
    async fn discover(&self) -> Result<Vec<DiscoveredPoint>, DriverError> {
        Err(DriverError::Unsupported)
    }

    /// Publishes a value to the device (§4.8). Optional; rejected outside
    /// `Connected` by the supervisor before this is ever called.
    async fn write(&self, _target: &str, _value: serde_json::Value) -> Result<(), DriverError> {
        Err(DriverError::Unsupported)
    }
}
