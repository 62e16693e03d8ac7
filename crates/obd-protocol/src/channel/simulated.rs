//! In-process ELM327 emulator
//!
//! Answers AT commands and mode 01/03/04/09 queries with plausible values so
//! the interpreter can run without hardware.

use super::{Channel, PROMPT};
use crate::codec::RESPONSE_OFFSET;
use crate::error::TransportError;
use crate::mode;
use crate::pid::Pid;
use crate::protocol::ObdProtocol;
use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use tracing::debug;

const VERSION: &str = "ELM327 v1.5";
const SIMULATED_VIN: &[u8] = b"1G1JC5444R7252367";

/// Emulated adapter with default ELM327 settings (echo and spaces on)
#[derive(Debug)]
pub struct SimulatedAdapter {
    connected: bool,
    refuse_connect: bool,
    echo: bool,
    spaces: bool,
    protocol: ObdProtocol,
    input: Vec<u8>,
    output: VecDeque<u8>,
    queries: u64,
}

impl SimulatedAdapter {
    pub fn new() -> Self {
        Self {
            connected: false,
            refuse_connect: false,
            echo: true,
            spaces: true,
            protocol: ObdProtocol::Auto,
            input: Vec::new(),
            output: VecDeque::new(),
            queries: 0,
        }
    }

    /// An adapter whose `connect()` always fails
    pub fn unreachable() -> Self {
        Self {
            refuse_connect: true,
            ..Self::new()
        }
    }

    pub fn protocol(&self) -> ObdProtocol {
        self.protocol
    }

    fn respond(&mut self, command: &str) -> String {
        let command: String = command
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_uppercase();

        if let Some(at) = command.strip_prefix("AT") {
            return self.respond_at(at);
        }

        if command.is_empty()
            || command.len() % 2 == 1
            || !command.chars().all(|c| c.is_ascii_hexdigit())
        {
            return "?".to_string();
        }

        let bytes: Vec<u8> = (0..command.len())
            .step_by(2)
            .filter_map(|i| u8::from_str_radix(&command[i..i + 2], 16).ok())
            .collect();
        self.respond_service(bytes[0], bytes.get(1).copied())
    }

    fn respond_at(&mut self, at: &str) -> String {
        let reply = match at {
            "Z" | "WS" => {
                self.echo = true;
                self.spaces = true;
                self.protocol = ObdProtocol::Auto;
                return VERSION.to_string();
            }
            "I" => return VERSION.to_string(),
            "E0" => {
                self.echo = false;
                "OK"
            }
            "E1" => {
                self.echo = true;
                "OK"
            }
            "S0" => {
                self.spaces = false;
                "OK"
            }
            "S1" => {
                self.spaces = true;
                "OK"
            }
            "DP" => return self.protocol.description().to_string(),
            "DPN" => return format!("A{:X}", self.protocol.code()),
            "RV" => "12.6V",
            "D" | "L0" | "L1" | "H0" | "H1" | "M0" | "AL" | "PC" => "OK",
            other => {
                if let Some(code) = other
                    .strip_prefix("SP")
                    .or_else(|| other.strip_prefix("TP"))
                {
                    match u8::from_str_radix(code, 16).ok().and_then(ObdProtocol::from_code) {
                        Some(protocol) => {
                            self.protocol = protocol;
                            "OK"
                        }
                        None => "?",
                    }
                } else if other.starts_with("ST")
                    || other.starts_with("AT")
                    || other.starts_with("SH")
                {
                    "OK"
                } else {
                    "?"
                }
            }
        };
        reply.to_string()
    }

    fn respond_service(&mut self, service: u8, pid: Option<u8>) -> String {
        self.queries += 1;
        let header = service.wrapping_add(RESPONSE_OFFSET);
        let payload = match (service, pid) {
            (mode::CURRENT_DATA, Some(0x00)) => Some(supported_pids()),
            (mode::CURRENT_DATA, Some(pid)) => Pid::from_hex(pid).map(|p| self.sample(p)),
            (mode::READ_DTC, None) => Some(vec![0x01, 0x33, 0x00, 0x00, 0x00, 0x00]),
            (mode::CLEAR_DTC, None) => return self.format_bytes(&[header]),
            (mode::VEHICLE_INFO, Some(0x02)) => {
                let mut vin = vec![0x01];
                vin.extend_from_slice(SIMULATED_VIN);
                Some(vin)
            }
            _ => None,
        };

        match payload {
            Some(payload) => {
                let mut bytes = vec![header];
                bytes.extend(pid);
                bytes.extend(payload);
                self.format_bytes(&bytes)
            }
            None => "NO DATA".to_string(),
        }
    }

    /// Pseudo-random but deterministic sensor values
    fn sample(&self, pid: Pid) -> Vec<u8> {
        let mut hasher = DefaultHasher::new();
        self.queries.hash(&mut hasher);
        pid.hash(&mut hasher);
        let hash = hasher.finish();

        match pid {
            // RPM: 800-3500 RPM range
            Pid::Rpm => {
                let rpm = 800 + (hash % 2700) as u16;
                let encoded = rpm * 4;
                vec![(encoded >> 8) as u8, (encoded & 0xFF) as u8]
            }
            // Speed: 0-120 km/h
            Pid::Speed => vec![(hash % 120) as u8],
            // Coolant temp: 70-105°C (stored as value + 40)
            Pid::CoolantTemp => vec![(110 + (hash % 35)) as u8],
            // Engine load: 20-80%
            Pid::EngineLoad => vec![(51 + (hash % 153)) as u8],
            // MAF: 5-50 g/s
            Pid::Maf => {
                let maf = 500 + (hash % 4500) as u16;
                vec![(maf >> 8) as u8, (maf & 0xFF) as u8]
            }
            // Fuel trims: -10% to +10%
            Pid::ShortFuelTrim | Pid::LongFuelTrim => vec![(115 + (hash % 26)) as u8],
            // O2 voltage: 0.1-0.9V, trim byte unused
            Pid::O2Voltage => vec![(20 + (hash % 160)) as u8, 0xFF],
            Pid::IntakeManifoldPressure => vec![(30 + (hash % 70)) as u8],
            Pid::ThrottlePosition => vec![(hash % 200) as u8],
            Pid::RunTime => {
                let secs = (self.queries % 0xFFFF) as u16;
                vec![(secs >> 8) as u8, (secs & 0xFF) as u8]
            }
            Pid::FuelLevel => vec![(64 + (hash % 160)) as u8],
        }
    }

    fn format_bytes(&self, bytes: &[u8]) -> String {
        let separator = if self.spaces { " " } else { "" };
        bytes
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(separator)
    }
}

/// Bitmap for PIDs 0x01-0x20 covering the standard catalog
fn supported_pids() -> Vec<u8> {
    let mut bitmap = 0u32;
    for pid in Pid::ALL {
        let offset = pid.as_hex() as u32 - 1;
        if offset < 32 {
            bitmap |= 1 << (31 - offset);
        }
    }
    bitmap.to_be_bytes().to_vec()
}

impl Default for SimulatedAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl Channel for SimulatedAdapter {
    fn connect(&mut self) -> Result<(), TransportError> {
        if self.refuse_connect {
            return Err(TransportError::Open {
                device: "simulated".to_string(),
                reason: "adapter unreachable".to_string(),
            });
        }
        self.connected = true;
        Ok(())
    }

    fn close(&mut self) {
        self.connected = false;
        self.input.clear();
        self.output.clear();
    }

    fn read_byte(&mut self) -> Result<u8, TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        self.output.pop_front().ok_or(TransportError::Timeout(0))
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        for &byte in bytes {
            if byte != b'\r' {
                self.input.push(byte);
                continue;
            }
            let command = String::from_utf8_lossy(&self.input).into_owned();
            self.input.clear();
            debug!("Simulated adapter received {:?}", command);

            let echo = self.echo;
            let reply = self.respond(&command);
            if echo {
                self.output.extend(command.bytes());
                self.output.push_back(b'\r');
            }
            self.output.extend(reply.bytes());
            self.output.extend([b'\r', b'\r', PROMPT]);
        }
        Ok(())
    }

    fn discard_input(&mut self) -> Result<(), TransportError> {
        self.output.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::exchange;

    fn connected() -> SimulatedAdapter {
        let mut adapter = SimulatedAdapter::new();
        adapter.connect().unwrap();
        adapter
    }

    #[test]
    fn test_echo_and_reset() {
        let mut adapter = connected();
        assert_eq!(exchange(&mut adapter, b"ATZ\r").unwrap(), "ATZ\rELM327v1.5");
        assert_eq!(exchange(&mut adapter, b"ATE0\r").unwrap(), "ATE0\rOK");
        assert_eq!(exchange(&mut adapter, b"ATI\r").unwrap(), "ELM327v1.5");
    }

    #[test]
    fn test_set_protocol() {
        let mut adapter = connected();
        exchange(&mut adapter, b"ATE0\r").unwrap();
        assert_eq!(exchange(&mut adapter, b"ATSP6\r").unwrap(), "OK");
        assert_eq!(adapter.protocol(), ObdProtocol::Iso15765_4Can11bit500);
        assert_eq!(exchange(&mut adapter, b"ATDPN\r").unwrap(), "A6");
        assert_eq!(exchange(&mut adapter, b"ATSPZ\r").unwrap(), "?");
    }

    #[test]
    fn test_rpm_in_range() {
        let mut adapter = connected();
        exchange(&mut adapter, b"ATE0\r").unwrap();
        let reply = exchange(&mut adapter, b"010C\r").unwrap();
        assert!(reply.starts_with("410C"));
        let raw = u16::from_str_radix(&reply[4..8], 16).unwrap();
        let rpm = raw / 4;
        assert!((800..3500).contains(&rpm), "rpm {}", rpm);
    }

    #[test]
    fn test_unsupported_and_unknown() {
        let mut adapter = connected();
        exchange(&mut adapter, b"ATE0\r").unwrap();
        assert_eq!(exchange(&mut adapter, b"0151\r").unwrap(), "NODATA");
        assert_eq!(exchange(&mut adapter, b"HELLO\r").unwrap(), "?");
        assert_eq!(exchange(&mut adapter, b"04\r").unwrap(), "44");
    }

    #[test]
    fn test_discard_pending_reply() {
        let mut adapter = connected();
        adapter.write(b"ATE0\r").unwrap();
        adapter.discard_input().unwrap();
        assert_eq!(adapter.read_byte(), Err(TransportError::Timeout(0)));
        assert_eq!(exchange(&mut adapter, b"0100\r").unwrap().get(..4), Some("4100"));
    }

    #[test]
    fn test_unreachable() {
        let mut adapter = SimulatedAdapter::unreachable();
        assert!(adapter.connect().is_err());
        assert_eq!(adapter.write(b"ATZ\r"), Err(TransportError::NotConnected));
    }

    #[test]
    fn test_supported_pid_bitmap() {
        let bitmap = supported_pids();
        // PID 0x0C is bit 20 from the top: byte 1, mask 0x10
        assert_eq!(bitmap[1] & 0x10, 0x10);
        // PID 0x01 (monitor status) is not emulated
        assert_eq!(bitmap[0] & 0x80, 0);
    }
}
