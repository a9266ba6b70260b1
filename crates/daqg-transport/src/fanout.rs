use std::collections::HashMap;
use std::sync::Arc;

use daqg_domain::CanonicalRecord;
use tokio::sync::RwLock;

use crate::outcome::PublishOutcome;
use crate::sink::Sink;

/// Publishes one record to every enabled sink (§4.6) and tracks per-sink
/// health so a down→up transition can be reported to the caller, who drives
/// the recovery flush against the buffer.
pub struct FanOut {
    sinks: Vec<Arc<dyn Sink>>,
    was_healthy: RwLock<HashMap<String, bool>>,
}

impl FanOut {
    pub fn new(sinks: Vec<Arc<dyn Sink>>) -> Self {
        let was_healthy = sinks.iter().map(|s| (s.name().to_string(), true)).collect();
        FanOut {
            sinks,
            was_healthy: RwLock::new(was_healthy),
        }
    }

    pub fn sink_names(&self) -> Vec<String> {
        self.sinks.iter().map(|s| s.name().to_string()).collect()
    }

    /// Publishes one record to a single named sink, used by recovery flush
    /// to replay a buffered entry against the sink it was originally queued
    /// for (§4.6). `None` if no sink with that name is configured.
    pub async fn publish_to(&self, name: &str, record: &CanonicalRecord) -> Option<PublishOutcome> {
        let sink = self.sinks.iter().find(|s| s.name() == name)?;
        let outcome = sink.publish(record).await;
        let now_healthy = sink.healthy().await;
        self.was_healthy.write().await.insert(name.to_string(), now_healthy);
        Some(outcome)
    }

    /// Publishes to every sink concurrently. Returns the per-sink outcome and
    /// the subset of sink names that just transitioned from down to up.
    pub async fn publish(&self, record: &CanonicalRecord) -> (HashMap<String, PublishOutcome>, Vec<String>) {
        let mut outcomes = HashMap::new();
        for sink in &self.sinks {
            let outcome = sink.publish(record).await;
            outcomes.insert(sink.name().to_string(), outcome);
        }

        let mut recovered = Vec::new();
        let mut guard = self.was_healthy.write().await;
        for sink in &self.sinks {
            let now_healthy = sink.healthy().await;
            let was = guard.get(sink.name()).copied().unwrap_or(true);
            if now_healthy && !was {
                recovered.push(sink.name().to_string());
            }
            guard.insert(sink.name().to_string(), now_healthy);
        }

        (outcomes, recovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use daqg_domain::RecordMetadata;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakeSink {
        name: String,
        healthy: AtomicBool,
    }

    #[async_trait]
    impl Sink for FakeSink {
        fn name(&self) -> &str {
            &self.name
        }
        async fn publish(&self, _record: &CanonicalRecord) -> PublishOutcome {
            if self.healthy.load(Ordering::SeqCst) {
                PublishOutcome::Ok
            } else {
                PublishOutcome::Retriable("down".into())
            }
        }
        async fn healthy(&self) -> bool {
            self.healthy.load(Ordering::SeqCst)
        }
    }

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

    #[tokio::test]
    async fn detects_down_to_up_transition() {
        let bus = Arc::new(FakeSink { name: "bus".into(), healthy: AtomicBool::new(false) });
        let fanout = FanOut::new(vec![bus.clone()]);

        let (outcomes, recovered) = fanout.publish(&record()).await;
        assert!(outcomes["bus"].is_retriable());
        assert!(recovered.is_empty());

        bus.healthy.store(true, Ordering::SeqCst);
        let (outcomes, recovered) = fanout.publish(&record()).await;
        assert!(outcomes["bus"].is_ok());
        assert_eq!(recovered, vec!["bus".to_string()]);
    }
}
