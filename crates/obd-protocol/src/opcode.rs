//! ELM327 Configuration Op-codes
//!
//! Static table mapping each adapter configuration operation to its
//! command template. Templates use `%x`, `%X` and `%d` conversions with an
//! optional zero-padded width (`%02X`).

use crate::error::EncodeError;
use serde::{Deserialize, Serialize};
use std::iter::Peekable;
use std::str::Chars;

/// Adapter configuration operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpCode {
    /// Full adapter reset
    Reset,
    /// Soft reset, keeps the baud rate
    WarmStart,
    /// Restore all settings to defaults
    SetDefaults,
    /// Print the adapter version string
    Identify,
    /// Describe the active protocol
    DescribeProtocol,
    /// Describe the active protocol by number
    DescribeProtocolNumber,
    EchoOff,
    EchoOn,
    LinefeedsOff,
    LinefeedsOn,
    SpacesOff,
    SpacesOn,
    HeadersOff,
    HeadersOn,
    /// Do not store the protocol in non-volatile memory
    MemoryOff,
    /// Allow messages longer than 7 bytes
    AllowLongMessages,
    /// Read the supply voltage
    ReadVoltage,
    /// Close the current protocol session
    ProtocolClose,
    /// Set protocol `h` and save it
    SetProtocol,
    /// Try protocol `h`, falling back to auto search
    TryProtocol,
    /// Response timeout in units of 4ms
    SetTimeout,
    /// Adaptive timing mode 0, 1 or 2
    AdaptiveTiming,
    /// Set the 11-bit request header
    SetHeader,
}

impl OpCode {
    /// Every op-code in the table
    pub const ALL: [OpCode; 23] = [
        OpCode::Reset,
        OpCode::WarmStart,
        OpCode::SetDefaults,
        OpCode::Identify,
        OpCode::DescribeProtocol,
        OpCode::DescribeProtocolNumber,
        OpCode::EchoOff,
        OpCode::EchoOn,
        OpCode::LinefeedsOff,
        OpCode::LinefeedsOn,
        OpCode::SpacesOff,
        OpCode::SpacesOn,
        OpCode::HeadersOff,
        OpCode::HeadersOn,
        OpCode::MemoryOff,
        OpCode::AllowLongMessages,
        OpCode::ReadVoltage,
        OpCode::ProtocolClose,
        OpCode::SetProtocol,
        OpCode::TryProtocol,
        OpCode::SetTimeout,
        OpCode::AdaptiveTiming,
        OpCode::SetHeader,
    ];

    /// The command template sent to the adapter
    pub fn template(&self) -> &'static str {
        match self {
            OpCode::Reset => "ATZ",
            OpCode::WarmStart => "ATWS",
            OpCode::SetDefaults => "ATD",
            OpCode::Identify => "ATI",
            OpCode::DescribeProtocol => "ATDP",
            OpCode::DescribeProtocolNumber => "ATDPN",
            OpCode::EchoOff => "ATE0",
            OpCode::EchoOn => "ATE1",
            OpCode::LinefeedsOff => "ATL0",
            OpCode::LinefeedsOn => "ATL1",
            OpCode::SpacesOff => "ATS0",
            OpCode::SpacesOn => "ATS1",
            OpCode::HeadersOff => "ATH0",
            OpCode::HeadersOn => "ATH1",
            OpCode::MemoryOff => "ATM0",
            OpCode::AllowLongMessages => "ATAL",
            OpCode::ReadVoltage => "ATRV",
            OpCode::ProtocolClose => "ATPC",
            OpCode::SetProtocol => "ATSP%x",
            OpCode::TryProtocol => "ATTP%x",
            OpCode::SetTimeout => "ATST%02X",
            OpCode::AdaptiveTiming => "ATAT%d",
            OpCode::SetHeader => "ATSH%03X",
        }
    }

    /// Number of arguments the template consumes
    pub fn arity(&self) -> usize {
        let mut chars = self.template().chars().peekable();
        let mut count = 0;
        while let Some(c) = chars.next() {
            if c == '%' && !matches!(next_spec(&mut chars), Spec::Literal) {
                count += 1;
            }
        }
        count
    }

    /// Render the command with its arguments, without terminator
    pub fn format(&self, args: &[u32]) -> Result<String, EncodeError> {
        let expected = self.arity();
        if args.len() != expected {
            return Err(EncodeError::ArgumentCount {
                op: *self,
                expected,
                actual: args.len(),
            });
        }

        let template = self.template();
        let mut out = String::with_capacity(template.len() + 4);
        let mut args = args.iter().copied();
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '%' {
                out.push(c);
                continue;
            }
            match next_spec(&mut chars) {
                Spec::Literal => out.push('%'),
                Spec::Conversion { zero_pad, width, kind } => {
                    let value = args.next().unwrap_or(0);
                    let digits = match kind {
                        'x' => format!("{:x}", value),
                        'X' => format!("{:X}", value),
                        _ => value.to_string(),
                    };
                    let pad = if zero_pad { '0' } else { ' ' };
                    for _ in digits.len()..width {
                        out.push(pad);
                    }
                    out.push_str(&digits);
                }
            }
        }

        Ok(out)
    }
}

enum Spec {
    Literal,
    Conversion {
        zero_pad: bool,
        width: usize,
        kind: char,
    },
}

/// Parse the conversion following a `%`
fn next_spec(chars: &mut Peekable<Chars<'_>>) -> Spec {
    if chars.next_if_eq(&'%').is_some() {
        return Spec::Literal;
    }
    let zero_pad = chars.next_if_eq(&'0').is_some();
    let mut width = 0usize;
    while let Some(d) = chars.next_if(char::is_ascii_digit) {
        width = width * 10 + d.to_digit(10).unwrap_or(0) as usize;
    }
    match chars.next() {
        Some(kind @ ('x' | 'X' | 'd')) => Spec::Conversion {
            zero_pad,
            width,
            kind,
        },
        _ => Spec::Literal,
    }
}
