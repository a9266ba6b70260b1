use std::sync::Arc;

use daqg_domain::SinkSpec;

use crate::broker::BrokerSink;
use crate::bus::BusSink;
use crate::error::TransportError;
use crate::http_push::HttpPushSink;
use crate::sink::Sink;

/// Constructs the concrete [`Sink`] for one [`SinkSpec`] (§3, §4.6).
pub fn build_sink(spec: &SinkSpec) -> Result<Arc<dyn Sink>, TransportError> {
    let sink: Arc<dyn Sink> = match spec {
        SinkSpec::Bus { name, endpoint, namespace, format } => Arc::new(BusSink::new(
            name.clone(),
            endpoint.clone(),
            namespace.clone(),
            *format,
        )),
        SinkSpec::Broker { name, endpoint, base_topic, qos, retain, format } => Arc::new(
            BrokerSink::connect(name.clone(), endpoint, base_topic.clone(), *qos, *retain, *format)?,
        ),
        SinkSpec::HttpPush { name, endpoint, auth, batch_size, flush_interval, format } => {
            HttpPushSink::new(
                name.clone(),
                endpoint.clone(),
                auth.clone(),
                *batch_size,
                *flush_interval,
                *format,
            )
        }
    };
    Ok(sink)
}
