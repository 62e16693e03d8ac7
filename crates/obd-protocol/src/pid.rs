//! OBD-II PID Definitions
//!
//! Defines the standard OBD-II Parameter IDs (PIDs) known to the standard
//! catalog, and the sensor frame the poller assembles from them.

use serde::{Deserialize, Serialize};

/// Standard OBD-II PIDs for Mode 01 (current data)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Pid {
    /// Calculated engine load (0x04)
    EngineLoad = 0x04,
    /// Engine coolant temperature (0x05)
    CoolantTemp = 0x05,
    /// Short-term fuel trim bank 1 (0x06)
    ShortFuelTrim = 0x06,
    /// Long-term fuel trim bank 1 (0x07)
    LongFuelTrim = 0x07,
    /// Intake manifold absolute pressure (0x0B)
    IntakeManifoldPressure = 0x0B,
    /// Engine RPM (0x0C)
    Rpm = 0x0C,
    /// Vehicle speed (0x0D)
    Speed = 0x0D,
    /// Mass air flow rate (0x10)
    Maf = 0x10,
    /// Throttle position (0x11)
    ThrottlePosition = 0x11,
    /// Oxygen sensor voltage bank 1, sensor 1 (0x14)
    O2Voltage = 0x14,
    /// Run time since engine start (0x1F)
    RunTime = 0x1F,
    /// Fuel tank level input (0x2F)
    FuelLevel = 0x2F,
}

impl Pid {
    pub const ALL: [Pid; 12] = [
        Pid::EngineLoad,
        Pid::CoolantTemp,
        Pid::ShortFuelTrim,
        Pid::LongFuelTrim,
        Pid::IntakeManifoldPressure,
        Pid::Rpm,
        Pid::Speed,
        Pid::Maf,
        Pid::ThrottlePosition,
        Pid::O2Voltage,
        Pid::RunTime,
        Pid::FuelLevel,
    ];

    /// Get the PID hex value
    pub fn as_hex(&self) -> u8 {
        *self as u8
    }

    /// Look up a PID by its hex value
    pub fn from_hex(value: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|pid| pid.as_hex() == value)
    }

    /// Get the sampling priority (higher = more frequent)
    pub fn sampling_priority(&self) -> u8 {
        match self {
            Pid::Rpm | Pid::Speed | Pid::CoolantTemp | Pid::EngineLoad => 10, // 5Hz
            Pid::Maf | Pid::ThrottlePosition => 5,                            // 1Hz
            _ => 2,                                                           // 0.5Hz
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Pid::EngineLoad => "Calculated engine load",
            Pid::CoolantTemp => "Engine coolant temperature",
            Pid::ShortFuelTrim => "Short term fuel trim (bank 1)",
            Pid::LongFuelTrim => "Long term fuel trim (bank 1)",
            Pid::IntakeManifoldPressure => "Intake manifold absolute pressure",
            Pid::Rpm => "Engine speed",
            Pid::Speed => "Vehicle speed",
            Pid::Maf => "Mass air flow rate",
            Pid::ThrottlePosition => "Throttle position",
            Pid::O2Voltage => "Oxygen sensor voltage (bank 1, sensor 1)",
            Pid::RunTime => "Run time since engine start",
            Pid::FuelLevel => "Fuel tank level",
        }
    }
}

/// A complete sensor frame containing all collected PIDs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorFrame {
    /// Timestamp (Unix ms)
    pub timestamp_ms: u64,
    /// Engine RPM
    pub rpm: u16,
    /// Vehicle speed (km/h)
    pub speed: u8,
    /// Coolant temperature (°C)
    pub coolant_temp: i16,
    /// Engine load (0-100%)
    pub engine_load: u8,
    /// Mass air flow rate (g/s * 100 for precision)
    pub maf: u16,
    /// Short-term fuel trim (% * 100, signed)
    pub fuel_trim_short: i16,
    /// Long-term fuel trim (% * 100, signed)
    pub fuel_trim_long: i16,
    /// O2 sensor voltage (V * 1000)
    pub o2_voltage: u16,
    /// Throttle position (0-100%)
    pub throttle_position: u8,
    /// Fuel level (0-100%)
    pub fuel_level: u8,
}

impl SensorFrame {
    /// Create a new empty frame with the given timestamp
    pub fn new(timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms,
            ..Default::default()
        }
    }

    /// Update a field from a metric value decoded for `pid`
    pub fn update(&mut self, pid: Pid, value: f64) {
        match pid {
            Pid::Rpm => self.rpm = value as u16,
            Pid::Speed => self.speed = value as u8,
            Pid::CoolantTemp => self.coolant_temp = value as i16,
            Pid::EngineLoad => self.engine_load = value as u8,
            Pid::Maf => self.maf = (value * 100.0) as u16,
            Pid::ShortFuelTrim => self.fuel_trim_short = (value * 100.0) as i16,
            Pid::LongFuelTrim => self.fuel_trim_long = (value * 100.0) as i16,
            Pid::O2Voltage => self.o2_voltage = (value * 1000.0) as u16,
            Pid::ThrottlePosition => self.throttle_position = value as u8,
            Pid::FuelLevel => self.fuel_level = value as u8,
            Pid::IntakeManifoldPressure | Pid::RunTime => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_hex() {
        assert_eq!(Pid::from_hex(0x0C), Some(Pid::Rpm));
        assert_eq!(Pid::from_hex(0x2F), Some(Pid::FuelLevel));
        assert_eq!(Pid::from_hex(0xFF), None);
    }

    #[test]
    fn test_frame_update() {
        let mut frame = SensorFrame::new(42);
        frame.update(Pid::Rpm, 1726.0);
        frame.update(Pid::ShortFuelTrim, 12.5);
        frame.update(Pid::O2Voltage, 0.45);
        assert_eq!(frame.timestamp_ms, 42);
        assert_eq!(frame.rpm, 1726);
        assert_eq!(frame.fuel_trim_short, 1250);
        assert_eq!(frame.o2_voltage, 450);
    }
}
