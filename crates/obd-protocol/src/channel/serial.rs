//! Serial port channel for USB/Bluetooth-serial ELM327 adapters

use super::Channel;
use crate::error::TransportError;
use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;
use tokio_serial::SerialPort;
use tracing::{debug, info};

/// Default timeout for a single byte read
const DEFAULT_TIMEOUT_MS: u64 = 2000;

/// Serial link settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Serial port device path (e.g., "/dev/ttyUSB0" or "COM3")
    pub device: String,
    /// Baud rate (ELM327 clones ship at 38400)
    pub baud_rate: u32,
    /// Read timeout per byte in milliseconds
    pub read_timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device: "/dev/ttyUSB0".to_string(),
            baud_rate: 38400,
            read_timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

/// Blocking serial port channel
pub struct SerialChannel {
    config: SerialConfig,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialChannel {
    pub fn new(config: SerialConfig) -> Self {
        Self { config, port: None }
    }

    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>, TransportError> {
        self.port.as_mut().ok_or(TransportError::NotConnected)
    }
}

impl Channel for SerialChannel {
    fn connect(&mut self) -> Result<(), TransportError> {
        info!(
            "Opening serial port {} at {} baud",
            self.config.device, self.config.baud_rate
        );
        let port = tokio_serial::new(&self.config.device, self.config.baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .timeout(Duration::from_millis(self.config.read_timeout_ms))
            .open()
            .map_err(|e| TransportError::Open {
                device: self.config.device.clone(),
                reason: e.to_string(),
            })?;

        // Discard anything the adapter printed before we attached
        if let Err(e) = port.clear(tokio_serial::ClearBuffer::All) {
            debug!("Could not clear serial buffers: {}", e);
        }

        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            info!("Serial port {} closed", self.config.device);
        }
    }

    fn read_byte(&mut self) -> Result<u8, TransportError> {
        let timeout_ms = self.config.read_timeout_ms;
        let port = self.port()?;
        let mut byte = [0u8; 1];
        loop {
            match port.read(&mut byte) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(_) => return Ok(byte[0]),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == ErrorKind::TimedOut => {
                    return Err(TransportError::Timeout(timeout_ms))
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let port = self.port()?;
        port.write_all(bytes)?;
        port.flush()?;
        Ok(())
    }

    fn discard_input(&mut self) -> Result<(), TransportError> {
        self.port()?
            .clear(tokio_serial::ClearBuffer::Input)
            .map_err(|e| TransportError::Io(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_config_default() {
        let config = SerialConfig::default();
        assert_eq!(config.device, "/dev/ttyUSB0");
        assert_eq!(config.baud_rate, 38400);
        assert_eq!(config.read_timeout_ms, 2000);
    }

    #[test]
    fn test_io_before_connect() {
        let mut channel = SerialChannel::new(SerialConfig::default());
        assert_eq!(channel.read_byte(), Err(TransportError::NotConnected));
        assert_eq!(channel.write(b"ATZ\r"), Err(TransportError::NotConnected));
        assert_eq!(channel.discard_input(), Err(TransportError::NotConnected));
    }

    #[test]
    fn test_connect_missing_device() {
        let mut channel = SerialChannel::new(SerialConfig {
            device: "/dev/does-not-exist-obd".to_string(),
            ..Default::default()
        });
        assert!(matches!(
            channel.connect(),
            Err(TransportError::Open { .. })
        ));
    }
}
