mod broker;
mod builder;
mod bus;
mod error;
mod fanout;
mod http_push;
mod outcome;
mod sink;

pub use broker::BrokerSink;
pub use builder::build_sink;
pub use bus::BusSink;
pub use error::TransportError;
pub use fanout::FanOut;
pub use http_push::HttpPushSink;
pub use outcome::PublishOutcome;
pub use sink::Sink;
