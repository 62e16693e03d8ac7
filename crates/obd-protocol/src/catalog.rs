//! Parameter Catalog
//!
//! The catalog maps a (service, PID, unit) triple to a pure decode function.
//! `StandardCatalog` covers the common SAE J1979 parameters.

use crate::mode;
use crate::pid::Pid;
use crate::request::Unit;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A decoded, typed reply value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// Scalar measurement in the requested unit
    Number(f64),
    /// Text such as a VIN or a configuration reply
    Text(String),
    /// Bytes for parameters the catalog has no decoder for
    Raw(Vec<u8>),
    /// Diagnostic trouble codes
    TroubleCodes(Vec<Dtc>),
    /// Adapter acknowledged a command with no payload (e.g. clear DTCs)
    Acknowledged,
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }
}

const DTC_SYSTEMS: [char; 4] = ['P', 'C', 'B', 'U'];

/// Diagnostic trouble code, two raw bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dtc(pub [u8; 2]);

impl fmt::Display for Dtc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b] = self.0;
        write!(
            f,
            "{}{}{:X}{:02X}",
            DTC_SYSTEMS[(a >> 6) as usize],
            (a >> 4) & 0x3,
            a & 0xF,
            b
        )
    }
}

/// Pure decode function from reply bytes to a value.
/// Returns `None` when the payload is too short.
pub type Unmarshaller = fn(&[u8]) -> Option<Value>;

/// Source of parameter decoders
pub trait ParameterCatalog: Send + Sync {
    /// Decoder for `pid` within `service` in the given unit
    fn unmarshaller_for(&self, service: u8, pid: Option<u8>, unit: Unit) -> Option<Unmarshaller>;
}

/// Catalog of the standard mode 01/03/07/09 parameters
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardCatalog;

impl ParameterCatalog for StandardCatalog {
    fn unmarshaller_for(&self, service: u8, pid: Option<u8>, unit: Unit) -> Option<Unmarshaller> {
        match (service, pid) {
            (mode::CURRENT_DATA, Some(pid)) => current_data(Pid::from_hex(pid)?, unit),
            (mode::READ_DTC | mode::PENDING_DTC | mode::PERMANENT_DTC, None) => {
                Some(trouble_codes)
            }
            (mode::VEHICLE_INFO, Some(0x02)) => Some(vin),
            _ => None,
        }
    }
}

fn current_data(pid: Pid, unit: Unit) -> Option<Unmarshaller> {
    let decoder: Unmarshaller = match (pid, unit) {
        (Pid::EngineLoad | Pid::ThrottlePosition | Pid::FuelLevel, _) => percent,
        (Pid::CoolantTemp, Unit::Metric) => celsius,
        (Pid::CoolantTemp, Unit::Imperial) => fahrenheit,
        (Pid::ShortFuelTrim | Pid::LongFuelTrim, _) => fuel_trim,
        (Pid::IntakeManifoldPressure, Unit::Metric) => kilopascal,
        (Pid::IntakeManifoldPressure, Unit::Imperial) => psi,
        (Pid::Rpm, _) => rpm,
        (Pid::Speed, Unit::Metric) => kmh,
        (Pid::Speed, Unit::Imperial) => mph,
        (Pid::Maf, Unit::Metric) => maf_grams,
        (Pid::Maf, Unit::Imperial) => maf_pounds,
        (Pid::O2Voltage, _) => o2_voltage,
        (Pid::RunTime, _) => run_time,
    };
    Some(decoder)
}

fn byte_a(bytes: &[u8]) -> Option<f64> {
    bytes.first().map(|a| *a as f64)
}

fn word_ab(bytes: &[u8]) -> Option<f64> {
    match bytes {
        [a, b, ..] => Some((*a as f64 * 256.0) + *b as f64),
        _ => None,
    }
}

// A * 100 / 255 (%)
fn percent(bytes: &[u8]) -> Option<Value> {
    byte_a(bytes).map(|a| Value::Number(a * 100.0 / 255.0))
}

// A - 40 (°C)
fn celsius(bytes: &[u8]) -> Option<Value> {
    byte_a(bytes).map(|a| Value::Number(a - 40.0))
}

fn fahrenheit(bytes: &[u8]) -> Option<Value> {
    byte_a(bytes).map(|a| Value::Number((a - 40.0) * 9.0 / 5.0 + 32.0))
}

// (A - 128) * 100 / 128 (%)
fn fuel_trim(bytes: &[u8]) -> Option<Value> {
    byte_a(bytes).map(|a| Value::Number((a - 128.0) * 100.0 / 128.0))
}

fn kilopascal(bytes: &[u8]) -> Option<Value> {
    byte_a(bytes).map(Value::Number)
}

fn psi(bytes: &[u8]) -> Option<Value> {
    byte_a(bytes).map(|a| Value::Number(a * 0.145_037_738))
}

// ((A*256)+B)/4
fn rpm(bytes: &[u8]) -> Option<Value> {
    word_ab(bytes).map(|ab| Value::Number(ab / 4.0))
}

fn kmh(bytes: &[u8]) -> Option<Value> {
    byte_a(bytes).map(Value::Number)
}

fn mph(bytes: &[u8]) -> Option<Value> {
    byte_a(bytes).map(|a| Value::Number(a * 0.621_371))
}

// ((A*256)+B) / 100 (g/s)
fn maf_grams(bytes: &[u8]) -> Option<Value> {
    word_ab(bytes).map(|ab| Value::Number(ab / 100.0))
}

fn maf_pounds(bytes: &[u8]) -> Option<Value> {
    word_ab(bytes).map(|ab| Value::Number(ab / 100.0 * 0.132_277))
}

// A / 200 (V)
fn o2_voltage(bytes: &[u8]) -> Option<Value> {
    byte_a(bytes).map(|a| Value::Number(a / 200.0))
}

fn run_time(bytes: &[u8]) -> Option<Value> {
    word_ab(bytes).map(Value::Number)
}

/// Pairs of bytes, `00 00` is padding. An odd length means CAN framing
/// put a count byte in front.
fn trouble_codes(bytes: &[u8]) -> Option<Value> {
    let body = if bytes.len() % 2 == 1 { &bytes[1..] } else { bytes };
    let codes = body
        .chunks_exact(2)
        .filter(|pair| pair[0] != 0 || pair[1] != 0)
        .map(|pair| Dtc([pair[0], pair[1]]))
        .collect();
    Some(Value::TroubleCodes(codes))
}

/// Leading message-count and padding bytes are skipped
fn vin(bytes: &[u8]) -> Option<Value> {
    let start = bytes.iter().position(|b| b.is_ascii_alphanumeric())?;
    let text = bytes[start..]
        .iter()
        .filter(|b| b.is_ascii_alphanumeric())
        .map(|b| *b as char)
        .collect();
    Some(Value::Text(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(pid: Pid, unit: Unit, bytes: &[u8]) -> f64 {
        let decoder = StandardCatalog
            .unmarshaller_for(mode::CURRENT_DATA, Some(pid.as_hex()), unit)
            .unwrap();
        decoder(bytes).and_then(|v| v.as_f64()).unwrap()
    }

    #[test]
    fn test_rpm_decode() {
        // 1A F8 => ((0x1A * 256) + 0xF8) / 4 = 6904 / 4 = 1726
        assert!((decode(Pid::Rpm, Unit::Metric, &[0x1A, 0xF8]) - 1726.0).abs() < 0.01);
    }

    #[test]
    fn test_coolant_temp_decode() {
        // 0x73 = 115, so temp = 115 - 40 = 75°C = 167°F
        assert!((decode(Pid::CoolantTemp, Unit::Metric, &[0x73]) - 75.0).abs() < 0.01);
        assert!((decode(Pid::CoolantTemp, Unit::Imperial, &[0x73]) - 167.0).abs() < 0.01);
    }

    #[test]
    fn test_fuel_trim_decode() {
        // 0x90 = 144, so trim = (144-128)*100/128 = 12.5%
        assert!((decode(Pid::ShortFuelTrim, Unit::Metric, &[0x90]) - 12.5).abs() < 0.01);
    }

    #[test]
    fn test_short_payload_is_none() {
        let decoder = StandardCatalog
            .unmarshaller_for(mode::CURRENT_DATA, Some(0x0C), Unit::Metric)
            .unwrap();
        assert_eq!(decoder(&[0x1A]), None);
    }

    #[test]
    fn test_unknown_pid_has_no_decoder() {
        assert!(StandardCatalog
            .unmarshaller_for(mode::CURRENT_DATA, Some(0x5C), Unit::Metric)
            .is_none());
    }

    #[test]
    fn test_trouble_codes() {
        let decoder = StandardCatalog
            .unmarshaller_for(mode::READ_DTC, None, Unit::Metric)
            .unwrap();
        let value = decoder(&[0x01, 0x33, 0x00, 0x00, 0xC1, 0x00]).unwrap();
        match value {
            Value::TroubleCodes(codes) => {
                let codes: Vec<String> = codes.iter().map(|c| c.to_string()).collect();
                assert_eq!(codes, vec!["P0133", "U0100"]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_vin() {
        let decoder = StandardCatalog
            .unmarshaller_for(mode::VEHICLE_INFO, Some(0x02), Unit::Metric)
            .unwrap();
        let mut bytes = vec![0x01];
        bytes.extend_from_slice(b"1G1JC5444R7252367");
        assert_eq!(
            decoder(&bytes),
            Some(Value::Text("1G1JC5444R7252367".to_string()))
        );
    }
}
