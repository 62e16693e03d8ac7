//! Completion callbacks

use obd_protocol::{FailureCode, Value};

/// Result delivered for one request
pub type Outcome = Result<Value, FailureCode>;

/// Receives exactly one outcome for a request.
///
/// Implemented for any `FnOnce(Outcome) + Send` closure.
pub trait ResponseCallback: Send {
    fn on_success(self: Box<Self>, value: Value);

    fn on_failure(self: Box<Self>, failure: FailureCode);

    fn complete(self: Box<Self>, outcome: Outcome) {
        match outcome {
            Ok(value) => self.on_success(value),
            Err(failure) => self.on_failure(failure),
        }
    }
}

impl<F> ResponseCallback for F
where
    F: FnOnce(Outcome) + Send,
{
    fn on_success(self: Box<Self>, value: Value) {
        (*self)(Ok(value))
    }

    fn on_failure(self: Box<Self>, failure: FailureCode) {
        (*self)(Err(failure))
    }
}
