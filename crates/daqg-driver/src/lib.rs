mod driver;
mod error;
mod event;
mod http;
mod modbus;
mod mqtt;
mod opcua;
mod registry;
mod stub;

pub use driver::{Driver, DriverStatus};
pub use error::DriverError;
pub use event::{DiscoveredPoint, DriverErrorKind, DriverEvent};
pub use http::HttpDriver;
pub use modbus::ModbusTcpDriver;
pub use mqtt::MqttDriver;
pub use opcua::OpcUaDriver;
pub use registry::DriverRegistry;
pub use stub::StubDriver;
