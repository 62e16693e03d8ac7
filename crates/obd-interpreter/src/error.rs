//! Interpreter Error Types

use obd_protocol::{ProtocolViolation, TransportError};
use thiserror::Error;

/// Engine-level errors, also passed to error listeners
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterpreterError {
    /// `start()` or a listener registration after the worker was spawned
    #[error("Interpreter already started")]
    AlreadyStarted,

    /// Operation needs a running worker
    #[error("Interpreter not started")]
    NotStarted,

    /// Channel connect, read or write failed
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Reply did not belong to the request in flight
    #[error("Protocol violation: {0}")]
    Violation(#[from] ProtocolViolation),

    /// Worker thread could not be spawned
    #[error("Failed to spawn worker: {0}")]
    Spawn(String),

    /// Worker thread ended by panicking
    #[error("Worker thread panicked")]
    WorkerPanicked,

    /// Invalid engine configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}
