use std::collections::VecDeque;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reconciliation and lifecycle events the orchestrator emits as it acts
/// (§4.7). Kept in-memory, capped, and exposed read-only through `/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum AuditEvent {
    ReconcileStarted {
        id: Uuid,
        at: DateTime<Utc>,
    },
    ReconcileCompleted {
        id: Uuid,
        at: DateTime<Utc>,
        added: usize,
        updated: usize,
        removed: usize,
    },
    ConnectorStarted {
        id: Uuid,
        at: DateTime<Utc>,
        source_id: String,
    },
    ConnectorStopped {
        id: Uuid,
        at: DateTime<Utc>,
        source_id: String,
    },
    ConnectorFailed {
        id: Uuid,
        at: DateTime<Utc>,
        source_id: String,
        message: String,
    },
    RecoveryFlushed {
        id: Uuid,
        at: DateTime<Utc>,
        sink_name: String,
        count: usize,
    },
}

/// Bounded append-only log. Oldest events are dropped once `capacity` is
/// exceeded rather than ever failing a write.
pub struct AuditLog {
    capacity: usize,
    events: RwLock<VecDeque<AuditEvent>>,
}

impl AuditLog {
    pub fn new(capacity: usize) -> Self {
        AuditLog {
            capacity: capacity.max(1),
            events: RwLock::new(VecDeque::new()),
        }
    }

    pub fn push(&self, event: AuditEvent) {
        let mut guard = self.events.write().expect("audit log lock poisoned");
        if guard.len() >= self.capacity {
            guard.pop_front();
        }
        guard.push_back(event);
    }

    pub fn recent(&self, n: usize) -> Vec<AuditEvent> {
        let guard = self.events.read().expect("audit log lock poisoned");
        guard.iter().rev().take(n).cloned().collect()
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        AuditLog::new(1_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_once_capacity_is_exceeded() {
        let log = AuditLog::new(2);
        for i in 0..3 {
            log.push(AuditEvent::ConnectorStarted {
                id: Uuid::new_v4(),
                at: Utc::now(),
                source_id: format!("s{i}"),
            });
        }
        let recent = log.recent(10);
        assert_eq!(recent.len(), 2);
    }
}
