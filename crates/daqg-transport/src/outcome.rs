/// Per-publish result reported by a sink (§4.6). `Retriable` drives buffer-on-
/// failure; `Fatal` is logged and dropped; other sinks are unaffected either way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Ok,
    Retriable(String),
    Fatal(String),
}

impl PublishOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, PublishOutcome::Ok)
    }

    pub fn is_retriable(&self) -> bool {
        matches!(self, PublishOutcome::Retriable(_))
    }
}
