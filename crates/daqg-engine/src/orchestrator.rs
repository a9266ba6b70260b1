use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use daqg_buffer::{Buffer, BufferRecord};
use daqg_domain::{BufferConfig, BufferedEntry, SinkSpec, SourceId, SourceSpec};
use daqg_driver::DiscoveredPoint;
use daqg_mapping::MappingEngine;
use daqg_transport::FanOut;
use tokio::sync::{mpsc, RwLock as AsyncRwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditLog};
use crate::error::EngineError;
use crate::hash::compute_desired_hash;
use crate::runtime::{ConnectorRuntime, ConnectorSnapshot};
use crate::supervisor::{ConnectorSupervisor, SourceSample};

/// How long a connector gets to honor cancellation before its task is
/// force-aborted (§5 "stop completes within the grace deadline").
pub const STOP_GRACE_DEADLINE: Duration = Duration::from_secs(5);

/// Buffer eviction cadence (§4.5 "Eviction runs hourly").
const EVICTION_INTERVAL: Duration = Duration::from_secs(3600);

struct ConnectorHandle {
    spec: SourceSpec,
    hash: String,
    runtime: Arc<ConnectorRuntime>,
    token: CancellationToken,
    join: JoinHandle<()>,
}

/// Tally of what one reconciliation pass did, returned to the caller and
/// recorded in the audit log (§4.7).
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ReconcileReport {
    pub added: Vec<String>,
    pub updated: Vec<String>,
    pub removed: Vec<String>,
}

/// Owns every running connector, the mapping engine, the data buffer, and
/// the sink fan-out; routes samples end to end and reconciles the running
/// set against a desired source list (C7, §4.7). Adapted from the teacher's
/// reconcile loop, simplified: DAQ sources have no cross-source dependency
/// graph, so there is no topological ordering step.
pub struct Orchestrator {
    connectors: AsyncRwLock<HashMap<SourceId, ConnectorHandle>>,
    mapping: Arc<MappingEngine>,
    buffer: Arc<dyn Buffer>,
    fanout: AsyncRwLock<Arc<FanOut>>,
    audit: Arc<AuditLog>,
    sample_tx: mpsc::Sender<SourceSample>,
    reconciling: AtomicBool,
}

impl Orchestrator {
    pub fn new(
        mapping: Arc<MappingEngine>,
        buffer: Arc<dyn Buffer>,
        sinks: Vec<SinkSpec>,
        buffer_config: BufferConfig,
    ) -> Result<Arc<Self>, EngineError> {
        let fanout = Arc::new(build_fanout(&sinks)?);
        let (sample_tx, sample_rx) = mpsc::channel(4096);

        let orchestrator = Arc::new(Orchestrator {
            connectors: AsyncRwLock::new(HashMap::new()),
            mapping,
            buffer,
            fanout: AsyncRwLock::new(fanout),
            audit: Arc::new(AuditLog::default()),
            sample_tx,
            reconciling: AtomicBool::new(false),
        });

        let routing = orchestrator.clone();
        tokio::spawn(async move { routing.run_sample_loop(sample_rx).await });

        let evicting = orchestrator.clone();
        tokio::spawn(async move { evicting.run_eviction_loop(buffer_config).await });

        Ok(orchestrator)
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    pub fn buffer(&self) -> &Arc<dyn Buffer> {
        &self.buffer
    }

    /// Replaces the sink fan-out wholesale (§6 "POST /config/storage/reload").
    pub async fn reload_sinks(&self, sinks: Vec<SinkSpec>) -> Result<(), EngineError> {
        let fanout = Arc::new(build_fanout(&sinks)?);
        *self.fanout.write().await = fanout;
        Ok(())
    }

    /// Starts every enabled source from a cold boot.
    pub async fn start_all(&self, specs: Vec<SourceSpec>) {
        for spec in specs.into_iter().filter(|s| s.enabled) {
            self.start_connector(spec).await;
        }
    }

    /// Stops every running connector, honoring the grace deadline per
    /// connector but concurrently across connectors.
    pub async fn stop_all(&self) {
        let ids: Vec<SourceId> = self.connectors.read().await.keys().cloned().collect();
        for id in ids {
            self.stop_connector(&id).await;
        }
    }

    pub async fn start_connector(&self, spec: SourceSpec) {
        let id = spec.id.clone();
        let hash = compute_desired_hash(&spec);
        let runtime = Arc::new(ConnectorRuntime::new());
        let token = CancellationToken::new();
        let join = ConnectorSupervisor::spawn(spec.clone(), runtime.clone(), self.sample_tx.clone(), token.clone());

        self.connectors.write().await.insert(
            id.clone(),
            ConnectorHandle { spec, hash, runtime, token, join },
        );
        self.audit.push(AuditEvent::ConnectorStarted {
            id: Uuid::new_v4(),
            at: Utc::now(),
            source_id: id.to_string(),
        });
    }

    pub async fn stop_connector(&self, id: &SourceId) {
        let handle = self.connectors.write().await.remove(id);
        let Some(handle) = handle else { return };
        handle.token.cancel();
        if tokio::time::timeout(STOP_GRACE_DEADLINE, handle.join).await.is_err() {
            warn!(source = %id, "connector did not stop within grace deadline, aborting");
        }
        self.audit.push(AuditEvent::ConnectorStopped {
            id: Uuid::new_v4(),
            at: Utc::now(),
            source_id: id.to_string(),
        });
    }

    pub async fn restart_connector(&self, id: &SourceId) -> Result<(), EngineError> {
        let spec = self
            .connectors
            .read()
            .await
            .get(id)
            .map(|h| h.spec.clone())
            .ok_or_else(|| EngineError::UnknownSource(id.to_string()))?;
        self.stop_connector(id).await;
        self.start_connector(spec).await;
        Ok(())
    }

    pub async fn status_all(&self) -> Vec<(SourceId, ConnectorSnapshot)> {
        self.connectors
            .read()
            .await
            .iter()
            .map(|(id, h)| (id.clone(), h.runtime.snapshot()))
            .collect()
    }

    pub async fn status_of(&self, id: &SourceId) -> Option<ConnectorSnapshot> {
        self.connectors.read().await.get(id).map(|h| h.runtime.snapshot())
    }

    pub async fn discovery_of(&self, id: &SourceId) -> Option<Vec<DiscoveredPoint>> {
        self.connectors.read().await.get(id).and_then(|h| h.runtime.discovery())
    }

    /// Diffs `desired` against the running set by id and content hash, then
    /// starts/stops/restarts connectors to match (§4.7 steps 1-3). No two
    /// reconciliations run concurrently.
    pub async fn reconcile(&self, desired: Vec<SourceSpec>) -> Result<ReconcileReport, EngineError> {
        if self
            .reconciling
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(EngineError::ReconcileBusy);
        }
        let run_id = Uuid::new_v4();
        self.audit.push(AuditEvent::ReconcileStarted { id: run_id, at: Utc::now() });

        let report = self.reconcile_inner(desired).await;

        self.audit.push(AuditEvent::ReconcileCompleted {
            id: run_id,
            at: Utc::now(),
            added: report.added.len(),
            updated: report.updated.len(),
            removed: report.removed.len(),
        });
        self.reconciling.store(false, Ordering::SeqCst);
        Ok(report)
    }

    async fn reconcile_inner(&self, desired: Vec<SourceSpec>) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let existing: HashMap<SourceId, String> = {
            let guard = self.connectors.read().await;
            guard.iter().map(|(id, h)| (id.clone(), h.hash.clone())).collect()
        };
        let desired_ids: std::collections::HashSet<SourceId> =
            desired.iter().map(|s| s.id.clone()).collect();

        for id in existing.keys() {
            if !desired_ids.contains(id) {
                self.stop_connector(id).await;
                report.removed.push(id.to_string());
            }
        }

        for spec in desired {
            if !spec.enabled {
                if existing.contains_key(&spec.id) {
                    self.stop_connector(&spec.id).await;
                    report.removed.push(spec.id.to_string());
                }
                continue;
            }
            let new_hash = compute_desired_hash(&spec);
            match existing.get(&spec.id) {
                None => {
                    info!(source = %spec.id, "reconcile: starting new connector");
                    self.start_connector(spec.clone()).await;
                    report.added.push(spec.id.to_string());
                }
                Some(old_hash) if old_hash != &new_hash => {
                    info!(source = %spec.id, "reconcile: spec changed, restarting connector");
                    self.stop_connector(&spec.id).await;
                    self.start_connector(spec.clone()).await;
                    report.updated.push(spec.id.to_string());
                }
                Some(_) => {}
            }
        }

        report
    }

    async fn run_sample_loop(self: Arc<Self>, mut rx: mpsc::Receiver<SourceSample>) {
        while let Some((source_id, sample)) = rx.recv().await {
            let (source_type, auto_mapping) = {
                let guard = self.connectors.read().await;
                match guard.get(&source_id) {
                    Some(h) => (h.spec.kind.to_string(), h.spec.auto_mapping),
                    None => continue,
                }
            };

            let record = match self.mapping.apply(&source_id, &source_type, &sample, auto_mapping) {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(e) => {
                    warn!(source = %source_id, error = %e, "mapping failed for sample");
                    continue;
                }
            };

            if let Err(e) = self
                .buffer
                .store(BufferRecord::new(BufferedEntry::cache(record.clone(), Utc::now())))
                .await
            {
                warn!(source = %source_id, error = %e, "failed to cache record in buffer");
            }

            let fanout = self.fanout.read().await.clone();
            let (outcomes, recovered) = fanout.publish(&record).await;
            for (sink_name, outcome) in &outcomes {
                if let daqg_transport::PublishOutcome::Retriable(message) = outcome {
                    let entry = BufferedEntry::recovery(
                        record.clone(),
                        sink_name.clone(),
                        message.clone(),
                        Utc::now(),
                    );
                    if let Err(e) = self.buffer.store(BufferRecord::new(entry)).await {
                        warn!(sink = %sink_name, error = %e, "failed to queue record for recovery");
                    }
                }
            }

            for sink_name in recovered {
                self.flush_recovery(&fanout, &sink_name).await;
            }
        }
    }

    /// Drives the bounded-ring + retention eviction on an hourly tick (§4.5).
    async fn run_eviction_loop(self: Arc<Self>, config: BufferConfig) {
        let retention = Duration::from_secs(config.retention_days.saturating_mul(86_400));
        let mut ticker = tokio::time::interval(EVICTION_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.buffer.evict(config.max_entries, retention).await {
                Ok(evicted) if evicted > 0 => {
                    info!(evicted, max_entries = config.max_entries, "evicted buffer entries");
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "buffer eviction failed"),
            }
        }
    }

    /// Replays every buffered entry queued for `sink_name` once it has just
    /// come back up, deleting each on a successful republish (§4.6).
    async fn flush_recovery(&self, fanout: &FanOut, sink_name: &str) {
        let candidates = match self.buffer.recovery_candidates(sink_name).await {
            Ok(c) => c,
            Err(e) => {
                warn!(sink = %sink_name, error = %e, "failed to read recovery candidates");
                return;
            }
        };
        if candidates.is_empty() {
            return;
        }

        let mut flushed = Vec::new();
        for candidate in &candidates {
            match fanout.publish_to(sink_name, &candidate.entry.record).await {
                Some(outcome) if outcome.is_ok() => flushed.push(candidate.id),
                _ => break,
            }
        }
        if !flushed.is_empty() {
            if let Err(e) = self.buffer.delete(&flushed).await {
                warn!(sink = %sink_name, error = %e, "failed to delete flushed recovery entries");
            }
            self.audit.push(AuditEvent::RecoveryFlushed {
                id: Uuid::new_v4(),
                at: Utc::now(),
                sink_name: sink_name.to_string(),
                count: flushed.len(),
            });
        }
    }
}

fn build_fanout(sinks: &[SinkSpec]) -> Result<FanOut, EngineError> {
    let built = sinks
        .iter()
        .map(daqg_transport::build_sink)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| EngineError::Internal(e.to_string()))?;
    Ok(FanOut::new(built))
}

#[cfg(test)]
mod tests {
    use super::*;
    use daqg_buffer::InMemoryBuffer;
    use daqg_domain::{DriverKind, RetryPolicy};
    use daqg_mapping::MappingCatalog;

    fn mapping_engine() -> Arc<MappingEngine> {
        let dir = tempfile::tempdir().unwrap();
        let catalog = MappingCatalog::load(dir.path().join("catalog.yml")).unwrap();
        Arc::new(MappingEngine::new(catalog))
    }

    fn spec(id: &str) -> SourceSpec {
        SourceSpec {
            id: SourceId::new(id),
            kind: DriverKind::Http,
            enabled: true,
            config: serde_json::json!({"url": "http://127.0.0.1:0/", "pollingIntervalMs": 3_600_000}),
            auto_mapping: true,
            retry_policy: RetryPolicy { max_attempts: 1, initial_delay: Duration::from_millis(10) },
        }
    }

    #[tokio::test]
    async fn reconcile_starts_stops_and_restarts_by_hash() {
        let orchestrator = Orchestrator::new(
            mapping_engine(),
            Arc::new(InMemoryBuffer::new()),
            vec![],
            BufferConfig::default(),
        )
        .unwrap();

        let report = orchestrator.reconcile(vec![spec("a")]).await.unwrap();
        assert_eq!(report.added, vec!["a"]);
        assert_eq!(orchestrator.status_all().await.len(), 1);

        // Same spec again: no-op.
        let report = orchestrator.reconcile(vec![spec("a")]).await.unwrap();
        assert!(report.added.is_empty() && report.updated.is_empty() && report.removed.is_empty());

        // Changed spec: restart counted as an update.
        let mut changed = spec("a");
        changed.auto_mapping = false;
        let report = orchestrator.reconcile(vec![changed]).await.unwrap();
        assert_eq!(report.updated, vec!["a"]);

        // Removed entirely.
        let report = orchestrator.reconcile(vec![]).await.unwrap();
        assert_eq!(report.removed, vec!["a"]);
        assert!(orchestrator.status_all().await.is_empty());
    }
}
