use daqg_domain::DriverKind;

use crate::driver::Driver;
use crate::http::HttpDriver;
use crate::modbus::ModbusTcpDriver;
use crate::mqtt::MqttDriver;
use crate::opcua::OpcUaDriver;
use crate::stub::StubDriver;

/// Maps a `SourceSpec.type` tag to a freshly constructed [`Driver`]
/// (§9 "Plugin-by-tag driver dispatch" — a compile-time factory table, not a
/// runtime class lookup).
pub struct DriverRegistry;

impl DriverRegistry {
    /// Builds a new driver instance for `kind`. Each connector supervisor
    /// owns one instance exclusively — drivers are not shared across sources.
    pub fn build(kind: DriverKind) -> Box<dyn Driver> {
        match kind {
            DriverKind::Modbus => Box::new(ModbusTcpDriver::new()),
            DriverKind::Mqtt => Box::new(MqttDriver::new()),
            DriverKind::Http => Box::new(HttpDriver::new()),
            DriverKind::OpcUa => Box::new(OpcUaDriver::new()),
            other => Box::new(StubDriver::new(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_dispatches_native_drivers_by_name() {
        assert_eq!(DriverRegistry::build(DriverKind::Modbus).name(), "modbus");
        assert_eq!(DriverRegistry::build(DriverKind::Mqtt).name(), "mqtt");
        assert_eq!(DriverRegistry::build(DriverKind::Http).name(), "http");
        assert_eq!(DriverRegistry::build(DriverKind::OpcUa).name(), "opcua");
    }

    #[test]
    fn build_falls_back_to_stub_for_remaining_protocols() {
        assert_eq!(DriverRegistry::build(DriverKind::Bacnet).name(), "bacnet");
        assert_eq!(DriverRegistry::build(DriverKind::Aas).name(), "aas");
    }
}
