//! OBD-II Protocol Definitions

use serde::{Deserialize, Serialize};

/// Bus protocols selectable on an ELM327 adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObdProtocol {
    /// Automatic protocol detection
    Auto,
    /// SAE J1850 PWM (41.6 kbaud)
    J1850Pwm,
    /// SAE J1850 VPW (10.4 kbaud)
    J1850Vpw,
    /// ISO 9141-2 (10.4 kbaud, 5 baud init)
    Iso9141_2,
    /// ISO 14230-4 KWP (slow init, 10.4 kbaud)
    Iso14230_4Kwp,
    /// ISO 14230-4 KWP (fast init, 10.4 kbaud)
    Iso14230_4KwpFast,
    /// ISO 15765-4 CAN (11 bit ID, 500 kbaud)
    Iso15765_4Can11bit500,
    /// ISO 15765-4 CAN (29 bit ID, 500 kbaud)
    Iso15765_4Can29bit500,
    /// ISO 15765-4 CAN (11 bit ID, 250 kbaud)
    Iso15765_4Can11bit250,
    /// ISO 15765-4 CAN (29 bit ID, 250 kbaud)
    Iso15765_4Can29bit250,
}

impl ObdProtocol {
    /// Protocol number used as the `ATSP`/`ATTP` argument
    pub fn code(&self) -> u8 {
        match self {
            ObdProtocol::Auto => 0x0,
            ObdProtocol::J1850Pwm => 0x1,
            ObdProtocol::J1850Vpw => 0x2,
            ObdProtocol::Iso9141_2 => 0x3,
            ObdProtocol::Iso14230_4Kwp => 0x4,
            ObdProtocol::Iso14230_4KwpFast => 0x5,
            ObdProtocol::Iso15765_4Can11bit500 => 0x6,
            ObdProtocol::Iso15765_4Can29bit500 => 0x7,
            ObdProtocol::Iso15765_4Can11bit250 => 0x8,
            ObdProtocol::Iso15765_4Can29bit250 => 0x9,
        }
    }

    /// Look up a protocol by its adapter number
    pub fn from_code(code: u8) -> Option<Self> {
        let protocol = match code {
            0x0 => ObdProtocol::Auto,
            0x1 => ObdProtocol::J1850Pwm,
            0x2 => ObdProtocol::J1850Vpw,
            0x3 => ObdProtocol::Iso9141_2,
            0x4 => ObdProtocol::Iso14230_4Kwp,
            0x5 => ObdProtocol::Iso14230_4KwpFast,
            0x6 => ObdProtocol::Iso15765_4Can11bit500,
            0x7 => ObdProtocol::Iso15765_4Can29bit500,
            0x8 => ObdProtocol::Iso15765_4Can11bit250,
            0x9 => ObdProtocol::Iso15765_4Can29bit250,
            _ => return None,
        };
        Some(protocol)
    }

    /// Human-readable name as reported by `ATDP`
    pub fn description(&self) -> &'static str {
        match self {
            ObdProtocol::Auto => "AUTO",
            ObdProtocol::J1850Pwm => "SAE J1850 PWM",
            ObdProtocol::J1850Vpw => "SAE J1850 VPW",
            ObdProtocol::Iso9141_2 => "ISO 9141-2",
            ObdProtocol::Iso14230_4Kwp => "ISO 14230-4 (KWP 5BAUD)",
            ObdProtocol::Iso14230_4KwpFast => "ISO 14230-4 (KWP FAST)",
            ObdProtocol::Iso15765_4Can11bit500 => "ISO 15765-4 (CAN 11/500)",
            ObdProtocol::Iso15765_4Can29bit500 => "ISO 15765-4 (CAN 29/500)",
            ObdProtocol::Iso15765_4Can11bit250 => "ISO 15765-4 (CAN 11/250)",
            ObdProtocol::Iso15765_4Can29bit250 => "ISO 15765-4 (CAN 29/250)",
        }
    }
}

impl Default for ObdProtocol {
    fn default() -> Self {
        ObdProtocol::Auto
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_round_trip() {
        for code in 0..=9 {
            let protocol = ObdProtocol::from_code(code).unwrap();
            assert_eq!(protocol.code(), code);
        }
        assert_eq!(ObdProtocol::from_code(0xA), None);
    }
}
