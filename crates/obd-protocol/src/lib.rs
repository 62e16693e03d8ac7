//! OBD-II Protocol Implementation
//!
//! This crate provides the ELM327 wire codec, the adapter configuration
//! op-code table, the parameter catalog interface and the byte-level
//! channel abstraction used by the interpreter engine. It performs no
//! threading of its own.

pub mod catalog;
pub mod channel;
pub mod codec;
mod error;
pub mod opcode;
mod pid;
mod protocol;
mod reply;
mod request;

pub use catalog::{Dtc, ParameterCatalog, StandardCatalog, Unmarshaller, Value};
pub use channel::{Channel, SerialChannel, SerialConfig, SimulatedAdapter};
pub use error::{DecodeError, EncodeError, FailureCode, ProtocolViolation, TransportError};
pub use opcode::OpCode;
pub use pid::{Pid, SensorFrame};
pub use protocol::ObdProtocol;
pub use reply::{Reply, Sentinel};
pub use request::{ConfigurationRequest, Request, RequestKind, ServiceRequest, Unit};

/// OBD-II mode constants
pub mod mode {
    /// Current data
    pub const CURRENT_DATA: u8 = 0x01;
    /// Freeze frame data
    pub const FREEZE_FRAME: u8 = 0x02;
    /// Diagnostic trouble codes
    pub const READ_DTC: u8 = 0x03;
    /// Clear trouble codes
    pub const CLEAR_DTC: u8 = 0x04;
    /// Pending trouble codes
    pub const PENDING_DTC: u8 = 0x07;
    /// Vehicle information
    pub const VEHICLE_INFO: u8 = 0x09;
    /// Permanent trouble codes
    pub const PERMANENT_DTC: u8 = 0x0A;
}
