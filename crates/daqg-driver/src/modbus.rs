use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::driver::{Driver, DriverStatus};
use crate::error::DriverError;
use crate::event::{DiscoveredPoint, DriverErrorKind, DriverEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RegisterTable {
    Holding,
    Input,
    Coil,
    Discrete,
}

impl RegisterTable {
    fn function_code(&self) -> u8 {
        match self {
            RegisterTable::Holding => 0x03,
            RegisterTable::Input => 0x04,
            RegisterTable::Coil => 0x01,
            RegisterTable::Discrete => 0x02,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum DataType {
    Int16,
    Uint16,
    Int32,
    Uint32,
    Float32,
    Bool,
}

#[derive(Debug, Clone, Deserialize)]
struct RegisterConfig {
    name: String,
    address: u16,
    #[serde(rename = "type")]
    table: RegisterTable,
    #[serde(rename = "dataType")]
    data_type: DataType,
    #[serde(default = "default_count")]
    count: u16,
}

fn default_count() -> u16 {
    1
}

#[derive(Debug, Clone, Deserialize)]
struct ModbusConfig {
    host: String,
    port: u16,
    #[serde(rename = "unitId", default = "default_unit_id")]
    unit_id: u8,
    #[serde(default)]
    registers: Vec<RegisterConfig>,
    #[serde(rename = "pollingInterval", default = "default_polling_interval")]
    polling_interval_ms: u64,
}

fn default_unit_id() -> u8 {
    1
}

fn default_polling_interval() -> u64 {
    1000
}

/// Minimal Modbus/TCP client: MBAP header + function codes 1-4 (read coil,
/// discrete input, holding register, input register). Enough to satisfy
/// polling and the discovery scan of §4.3; write support is out of scope.
async fn read_registers(
    stream: &mut TcpStream,
    unit_id: u8,
    function_code: u8,
    address: u16,
    count: u16,
) -> Result<Vec<u8>, DriverError> {
    let transaction_id: u16 = 1;
    let mut request = Vec::with_capacity(12);
    request.extend_from_slice(&transaction_id.to_be_bytes());
    request.extend_from_slice(&0u16.to_be_bytes()); // protocol id
    request.extend_from_slice(&6u16.to_be_bytes()); // length: unit+func+addr+count
    request.push(unit_id);
    request.push(function_code);
    request.extend_from_slice(&address.to_be_bytes());
    request.extend_from_slice(&count.to_be_bytes());

    stream
        .write_all(&request)
        .await
        .map_err(|e| DriverError::Connect(e.to_string()))?;

    let mut header = [0u8; 7];
    stream
        .read_exact(&mut header)
        .await
        .map_err(|e| DriverError::Connect(e.to_string()))?;
    let length = u16::from_be_bytes([header[4], header[5]]) as usize;
    if length < 2 {
        return Err(DriverError::Protocol("malformed MBAP length".into()));
    }
    let mut rest = vec![0u8; length - 1];
    stream
        .read_exact(&mut rest)
        .await
        .map_err(|e| DriverError::Connect(e.to_string()))?;

    let resp_func = rest[0];
    if resp_func & 0x80 != 0 {
        let code = rest.get(1).copied().unwrap_or(0);
        return Err(DriverError::Protocol(format!("modbus exception code {code}")));
    }
    let byte_count = rest[1] as usize;
    Ok(rest[2..2 + byte_count].to_vec())
}

fn decode(data_type: DataType, bytes: &[u8]) -> serde_json::Value {
    match data_type {
        DataType::Bool => json!(bytes.first().map(|b| *b != 0).unwrap_or(false)),
        DataType::Uint16 => json!(u16::from_be_bytes([bytes[0], bytes[1]])),
        DataType::Int16 => json!(i16::from_be_bytes([bytes[0], bytes[1]])),
        DataType::Uint32 => json!(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        DataType::Int32 => json!(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        DataType::Float32 => json!(f32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
    }
}

/// Driver for `modbus` (§4.1 "modbus/tcp, rtu"); this implementation covers
/// the TCP transport only, RTU-over-serial shares the registry tag but is
/// served by [`crate::stub::StubDriver`].
pub struct ModbusTcpDriver {
    config: Option<ModbusConfig>,
    connected: Arc<AtomicBool>,
    stop: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

impl Default for ModbusTcpDriver {
    fn default() -> Self {
        ModbusTcpDriver {
            config: None,
            connected: Arc::new(AtomicBool::new(false)),
            stop: None,
            task: None,
        }
    }
}

impl ModbusTcpDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn config(&self) -> Result<&ModbusConfig, DriverError> {
        self.config.as_ref().ok_or_else(|| DriverError::Internal("not initialized".into()))
    }
}

#[async_trait]
impl Driver for ModbusTcpDriver {
    fn name(&self) -> &'static str {
        "modbus"
    }

    async fn validate(&self, config: &serde_json::Value) -> Result<(), DriverError> {
        serde_json::from_value::<ModbusConfig>(config.clone())
            .map(|_| ())
            .map_err(|e| DriverError::Config(e.to_string()))
    }

    async fn initialize(&mut self, config: serde_json::Value) -> Result<(), DriverError> {
        let parsed: ModbusConfig =
            serde_json::from_value(config).map_err(|e| DriverError::Config(e.to_string()))?;
        self.config = Some(parsed);
        Ok(())
    }

    async fn start(&mut self, events: mpsc::Sender<DriverEvent>) -> Result<(), DriverError> {
        let config = self.config()?.clone();
        let connected = self.connected.clone();
        let token = CancellationToken::new();
        self.stop = Some(token.clone());

        let addr = format!("{}:{}", config.host, config.port);
        let task = tokio::spawn(async move {
            loop {
                if token.is_cancelled() {
                    break;
                }
                let mut stream = match TcpStream::connect(&addr).await {
                    Ok(s) => s,
                    Err(e) => {
                        let _ = events
                            .send(DriverEvent::Error {
                                kind: DriverErrorKind::Connect,
                                detail: e.to_string(),
                            })
                            .await;
                        connected.store(false, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(config.polling_interval_ms)).await;
                        continue;
                    }
                };
                connected.store(true, Ordering::SeqCst);
                let _ = events.send(DriverEvent::Connected).await;

                loop {
                    if token.is_cancelled() {
                        return;
                    }
                    let mut registers = serde_json::Map::new();
                    let mut read_failed = false;
                    for reg in &config.registers {
                        match read_registers(
                            &mut stream,
                            config.unit_id,
                            reg.table.function_code(),
                            reg.address,
                            reg.count,
                        )
                        .await
                        {
                            Ok(bytes) => {
                                registers.insert(reg.name.clone(), decode(reg.data_type, &bytes));
                            }
                            Err(e) => {
                                warn!(register = %reg.name, error = %e, "modbus read failed");
                                let _ = events
                                    .send(DriverEvent::Error {
                                        kind: DriverErrorKind::Protocol,
                                        detail: e.to_string(),
                                    })
                                    .await;
                                read_failed = true;
                                break;
                            }
                        }
                    }
                    if read_failed {
                        connected.store(false, Ordering::SeqCst);
                        let _ = events.send(DriverEvent::Disconnected("read failure".into())).await;
                        break;
                    }
                    if !registers.is_empty() {
                        let sample = serde_json::Value::Object(
                            [("registers".to_string(), serde_json::Value::Object(registers))]
                                .into_iter()
                                .collect(),
                        );
                        if events.send(DriverEvent::Sample(sample)).await.is_err() {
                            return;
                        }
                    }
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_millis(config.polling_interval_ms)) => {}
                        _ = token.cancelled() => return,
                    }
                }
            }
        });
        self.task = Some(task);
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), DriverError> {
        if let Some(token) = self.stop.take() {
            token.cancel();
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn status(&self) -> DriverStatus {
        DriverStatus {
            connected: self.connected.load(Ordering::SeqCst),
            last_error: None,
        }
    }

    async fn discover(&self) -> Result<Vec<DiscoveredPoint>, DriverError> {
        let config = self.config()?;
        let addr = format!("{}:{}", config.host, config.port);
        let mut stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| DriverError::Connect(e.to_string()))?;

        debug!(addr = %addr, "modbus discovery scan starting");
        let mut found = Vec::new();
        // Batches of 10 holding registers across a small default range, small
        // inter-batch delay (§4.3).
        for batch_start in (0..200u16).step_by(10) {
            for address in batch_start..batch_start.saturating_add(10) {
                if read_registers(&mut stream, config.unit_id, 0x03, address, 1)
                    .await
                    .is_ok()
                {
                    let mut point = DiscoveredPoint::new(format!("holding:{address}"));
                    point.kind = Some("holding".into());
                    found.push(point);
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_int16_matches_two_complement() {
        let bytes = (-42i16).to_be_bytes();
        assert_eq!(decode(DataType::Int16, &bytes), json!(-42));
    }

    #[test]
    fn decode_float32_round_trips() {
        let bytes = 23.5f32.to_be_bytes();
        assert_eq!(decode(DataType::Float32, &bytes), json!(23.5f32));
    }
}
