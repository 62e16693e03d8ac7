//! OBD-II Error Types

use crate::opcode::OpCode;
use crate::reply::Sentinel;
use thiserror::Error;

/// Errors raised by a communication channel
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The device could not be opened
    #[error("Failed to open {device}: {reason}")]
    Open { device: String, reason: String },

    /// Read or write attempted before `connect()`
    #[error("Channel is not connected")]
    NotConnected,

    /// No prompt byte arrived in time
    #[error("Timeout waiting for adapter prompt after {0}ms")]
    Timeout(u64),

    /// Underlying serial port error
    #[error("Serial port error: {0}")]
    Io(String),

    /// The peer closed the stream
    #[error("Channel closed by peer")]
    Closed,

    /// Reply grew past the framing limit without a prompt byte
    #[error("Reply exceeded {0} bytes without a prompt")]
    Overflow(usize),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io(err.to_string())
    }
}

/// Errors while turning a request into wire bytes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// Argument list does not fit the op-code template
    #[error("{op:?} takes {expected} argument(s), got {actual}")]
    ArgumentCount {
        op: OpCode,
        expected: usize,
        actual: usize,
    },
}

/// A reply that does not belong to the request that was sent
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    /// Service response header differs from `0x40 + service`
    #[error("Response header mismatch: expected {expected:02X}, got {actual}")]
    HeaderMismatch { expected: u8, actual: String },

    /// Echoed parameter identifier differs from the requested one
    #[error("Parameter mismatch: expected {expected:02X}, got {actual}")]
    ParameterMismatch { expected: u8, actual: String },

    /// Reply ended inside the header
    #[error("Truncated reply: {0:?}")]
    Truncated(String),
}

/// Per-request failure delivered to the request's callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FailureCode {
    /// Adapter answered `NO DATA`
    #[error("Request not supported by vehicle")]
    RequestNotSupported,

    /// Adapter answered `?` to a configuration command
    #[error("Configuration command not recognized by adapter")]
    ConfigurationCommandNotRecognized,

    /// Channel write or read failed for this request
    #[error("I/O link error")]
    IoLinkError,

    /// Adapter reported a bus or buffer condition
    #[error("Adapter error: {0}")]
    AdapterError(Sentinel),

    /// Reply text could not be interpreted as data
    #[error("Malformed reply")]
    MalformedReply,

    /// Reply header did not match the request
    #[error("Protocol violation")]
    ProtocolViolation,

    /// Request could not be encoded
    #[error("Invalid request")]
    InvalidRequest,

    /// Bounded ledger is at capacity
    #[error("Request ledger is full")]
    LedgerFull,

    /// Interpreter stopped before the request was serviced
    #[error("Interpreter stopped")]
    InterpreterStopped,
}

/// Outcome of decoding one reply that did not yield a value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Recoverable, reported to the request's callback
    #[error(transparent)]
    Failure(#[from] FailureCode),

    /// Reply belongs to a different request
    #[error(transparent)]
    Violation(#[from] ProtocolViolation),
}
