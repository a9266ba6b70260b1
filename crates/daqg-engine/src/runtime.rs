use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use daqg_driver::DiscoveredPoint;
use serde::Serialize;

/// Connector lifecycle states (§4.2, §5). A supervisor task owns the
/// transitions; everything else only ever reads a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorStatus {
    Unconfigured,
    Initialized,
    Connecting,
    Connected,
    Disconnected,
    Reconnecting,
    Stopped,
    Failed,
}

struct RuntimeState {
    status: ConnectorStatus,
    last_error: Option<String>,
    last_activity: Option<DateTime<Utc>>,
    discovery: Option<Vec<DiscoveredPoint>>,
}

/// Read-mostly lifecycle state for one connector, shared between the
/// supervisor task that drives it and any control-plane query (§5: reads
/// never block on the supervisor's own loop).
pub struct ConnectorRuntime {
    state: RwLock<RuntimeState>,
    pub samples_received: AtomicU64,
    pub errors: AtomicU64,
    pub successful_connects: AtomicU64,
}

/// Point-in-time view returned to callers; cheap to clone and serialize.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectorSnapshot {
    pub status: ConnectorStatus,
    pub last_error: Option<String>,
    pub last_activity: Option<DateTime<Utc>>,
    pub samples_received: u64,
    pub errors: u64,
    pub successful_connects: u64,
}

impl Default for ConnectorRuntime {
    fn default() -> Self {
        ConnectorRuntime {
            state: RwLock::new(RuntimeState {
                status: ConnectorStatus::Unconfigured,
                last_error: None,
                last_activity: None,
                discovery: None,
            }),
            samples_received: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            successful_connects: AtomicU64::new(0),
        }
    }
}

impl ConnectorRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_status(&self, status: ConnectorStatus) {
        self.state.write().expect("runtime lock poisoned").status = status;
    }

    pub fn status(&self) -> ConnectorStatus {
        self.state.read().expect("runtime lock poisoned").status
    }

    pub fn record_error(&self, message: impl Into<String>) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let mut guard = self.state.write().expect("runtime lock poisoned");
        guard.last_error = Some(message.into());
    }

    pub fn record_sample(&self) {
        self.samples_received.fetch_add(1, Ordering::SeqCst);
        self.state.write().expect("runtime lock poisoned").last_activity = Some(Utc::now());
    }

    pub fn mark_connected(&self) {
        self.successful_connects.fetch_add(1, Ordering::SeqCst);
    }

    pub fn set_discovery(&self, points: Vec<DiscoveredPoint>) {
        self.state.write().expect("runtime lock poisoned").discovery = Some(points);
    }

    pub fn discovery(&self) -> Option<Vec<DiscoveredPoint>> {
        self.state.read().expect("runtime lock poisoned").discovery.clone()
    }

    pub fn snapshot(&self) -> ConnectorSnapshot {
        let guard = self.state.read().expect("runtime lock poisoned");
        ConnectorSnapshot {
            status: guard.status,
            last_error: guard.last_error.clone(),
            last_activity: guard.last_activity,
            samples_received: self.samples_received.load(Ordering::SeqCst),
            errors: self.errors.load(Ordering::SeqCst),
            successful_connects: self.successful_connects.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_recorded_activity() {
        let runtime = ConnectorRuntime::new();
        runtime.set_status(ConnectorStatus::Connected);
        runtime.mark_connected();
        runtime.record_sample();
        runtime.record_error("boom");

        let snapshot = runtime.snapshot();
        assert_eq!(snapshot.status, ConnectorStatus::Connected);
        assert_eq!(snapshot.samples_received, 1);
        assert_eq!(snapshot.errors, 1);
        assert_eq!(snapshot.successful_connects, 1);
        assert_eq!(snapshot.last_error.as_deref(), Some("boom"));
    }
}
