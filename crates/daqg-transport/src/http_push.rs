use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use daqg_domain::{CanonicalRecord, CompactRecord, HttpAuth, WireFormat};
use tokio::sync::Mutex;
use tracing::warn;

use crate::outcome::PublishOutcome;
use crate::sink::Sink;

/// HTTP-push sink (§4.6): buffers records until `batch_size` is reached or
/// the flush timer fires, then issues one POST per batch (one publish
/// attempt per request, not per record).
pub struct HttpPushSink {
    name: String,
    endpoint: String,
    auth: HttpAuth,
    batch_size: usize,
    format: WireFormat,
    client: reqwest::Client,
    batch: Mutex<Vec<CanonicalRecord>>,
    healthy: Arc<AtomicBool>,
}

impl HttpPushSink {
    pub fn new(
        name: String,
        endpoint: String,
        auth: HttpAuth,
        batch_size: usize,
        flush_interval: Duration,
        format: WireFormat,
    ) -> Arc<Self> {
        let sink = Arc::new(HttpPushSink {
            name,
            endpoint,
            auth,
            batch_size: batch_size.max(1),
            format,
            client: reqwest::Client::new(),
            batch: Mutex::new(Vec::new()),
            healthy: Arc::new(AtomicBool::new(true)),
        });

        let flusher = sink.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(flush_interval);
            loop {
                ticker.tick().await;
                let _ = flusher.flush().await;
            }
        });

        sink
    }

    async fn flush(&self) -> PublishOutcome {
        let batch = {
            let mut guard = self.batch.lock().await;
            if guard.is_empty() {
                return PublishOutcome::Ok;
            }
            std::mem::take(&mut *guard)
        };
        self.send_batch(&batch).await
    }

    async fn send_batch(&self, batch: &[CanonicalRecord]) -> PublishOutcome {
        let body = match self.format {
            WireFormat::Verbose => serde_json::to_value(batch),
            WireFormat::Compact => {
                serde_json::to_value(batch.iter().map(CompactRecord::from).collect::<Vec<_>>())
            }
        };
        let body = match body {
            Ok(b) => b,
            Err(e) => return PublishOutcome::Fatal(e.to_string()),
        };

        let mut request = self.client.post(&self.endpoint).json(&body).timeout(Duration::from_secs(30));
        request = match &self.auth {
            HttpAuth::None => request,
            HttpAuth::Basic { username, password } => request.basic_auth(username, Some(password)),
            HttpAuth::Bearer { token } => request.bearer_auth(token),
        };

        match request.send().await {
            Ok(resp) if resp.status().is_success() => {
                self.healthy.store(true, Ordering::SeqCst);
                PublishOutcome::Ok
            }
            Ok(resp) if resp.status().as_u16() == 413 || resp.status().is_client_error() => {
                self.healthy.store(true, Ordering::SeqCst);
                PublishOutcome::Fatal(format!("status {}", resp.status()))
            }
            Ok(resp) => {
                self.healthy.store(false, Ordering::SeqCst);
                PublishOutcome::Retriable(format!("status {}", resp.status()))
            }
            Err(e) => {
                warn!(sink = %self.name, error = %e, "http-push batch failed");
                self.healthy.store(false, Ordering::SeqCst);
                PublishOutcome::Retriable(e.to_string())
            }
        }
    }
}

#[async_trait]
impl Sink for HttpPushSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&self, record: &CanonicalRecord) -> PublishOutcome {
        let full_batch = {
            let mut guard = self.batch.lock().await;
            guard.push(record.clone());
            if guard.len() >= self.batch_size {
                Some(std::mem::take(&mut *guard))
            } else {
                None
            }
        };
        match full_batch {
            Some(batch) => self.send_batch(&batch).await,
            None => PublishOutcome::Ok,
        }
    }

    async fn healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use daqg_domain::RecordMetadata;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn record(id: &str) -> CanonicalRecord {
        CanonicalRecord {
            id: id.into(),
            kind: "Sensor".into(),
            measurements: vec![],
            metadata: RecordMetadata {
                timestamp: Utc::now(),
                source_id: id.into(),
                source_type: "modbus".into(),
                quality: "good".into(),
                extra: serde_json::Map::new(),
            },
        }
    }

    #[tokio::test]
    async fn publish_does_not_flush_until_batch_is_full() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let sink = HttpPushSink::new(
            "http".into(),
            server.uri(),
            HttpAuth::None,
            2,
            Duration::from_secs(3600),
            WireFormat::Verbose,
        );
        assert_eq!(sink.publish(&record("a")).await, PublishOutcome::Ok);
        assert_eq!(sink.publish(&record("b")).await, PublishOutcome::Ok);
        server.verify().await;
    }
}
