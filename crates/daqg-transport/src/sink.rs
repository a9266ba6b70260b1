use async_trait::async_trait;
use daqg_domain::CanonicalRecord;

use crate::outcome::PublishOutcome;

/// One downstream transport endpoint (§4.6). A record is offered to every
/// enabled sink independently; failure on one does not affect the others.
#[async_trait]
pub trait Sink: Send + Sync + 'static {
    fn name(&self) -> &str;

    async fn publish(&self, record: &CanonicalRecord) -> PublishOutcome;

    /// Whether the sink is currently considered healthy. Used by the
    /// Orchestrator to detect the down→up transition that triggers recovery
    /// flush (§4.6 "Recovery flush").
    async fn healthy(&self) -> bool {
        true
    }
}
