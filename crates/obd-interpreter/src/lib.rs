//! ELM327 Interpreter Engine
//!
//! Serializes diagnostic and configuration requests over a single
//! half-duplex adapter link. Callers enqueue from any thread; one
//! dedicated worker thread owns the channel, performs all I/O and
//! decoding, and routes each outcome to the request's callback.
//! An async poller drives the engine at per-PID rates.

mod callback;
mod config;
mod engine;
mod error;
mod ledger;
mod listeners;
mod poller;
mod stats;
mod status;

pub use callback::{Outcome, ResponseCallback};
pub use config::{InterpreterConfig, ViolationPolicy};
pub use engine::{Interpreter, InterpreterHandle, TeardownHook};
pub use error::InterpreterError;
pub use ledger::{ledger, Dequeued, EnqueueError, Ledger, LedgerReceiver, PendingEntry};
pub use listeners::{ErrorListener, EventListener, ListenerRegistry};
pub use poller::{PidPoller, PollExit, PollTarget, PollerConfig, ScheduledPid};
pub use stats::{Statistics, StatsSnapshot};
pub use status::{EngineState, LinkStatus};
