//! Listener Registry
//!
//! Append-only observer lists for link errors, connection and shutdown.
//! Registration happens before the worker starts; the worker owns the
//! registry afterwards, so no locking is needed while notifying.

use crate::error::InterpreterError;
use std::panic::{self, AssertUnwindSafe};
use tracing::debug;

pub type ErrorListener = Box<dyn Fn(&InterpreterError) + Send + Sync>;
pub type EventListener = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
pub struct ListenerRegistry {
    error: Vec<ErrorListener>,
    connection: Vec<EventListener>,
    shutdown: Vec<EventListener>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error_listener(&mut self, listener: ErrorListener) {
        self.error.push(listener);
    }

    pub fn add_connection_listener(&mut self, listener: EventListener) {
        self.connection.push(listener);
    }

    pub fn add_shutdown_listener(&mut self, listener: EventListener) {
        self.shutdown.push(listener);
    }

    /// Notify every error listener, returns how many completed normally
    pub fn notify_error(&self, error: &InterpreterError) -> usize {
        self.error
            .iter()
            .filter(|listener| guarded("error", || listener(error)))
            .count()
    }

    pub fn notify_connected(&self) -> usize {
        self.connection
            .iter()
            .filter(|listener| guarded("connection", || listener()))
            .count()
    }

    pub fn notify_shutdown(&self) -> usize {
        self.shutdown
            .iter()
            .filter(|listener| guarded("shutdown", || listener()))
            .count()
    }

    pub fn len(&self) -> usize {
        self.error.len() + self.connection.len() + self.shutdown.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Run one listener, swallowing a panic
fn guarded(kind: &str, call: impl FnOnce()) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(()) => true,
        Err(_) => {
            if cfg!(debug_assertions) {
                debug!("{} listener panicked, continuing", kind);
            }
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obd_protocol::TransportError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counter() -> (Arc<AtomicUsize>, EventListener) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = count.clone();
        (
            count,
            Box::new(move || {
                inner.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    #[test]
    fn test_fan_out() {
        let mut registry = ListenerRegistry::new();
        let (a, listener_a) = counter();
        let (b, listener_b) = counter();
        registry.add_connection_listener(listener_a);
        registry.add_connection_listener(listener_b);

        assert_eq!(registry.notify_connected(), 2);
        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
        assert_eq!(registry.notify_shutdown(), 0);
    }

    #[test]
    fn test_panicking_listener_does_not_block_others() {
        let mut registry = ListenerRegistry::new();
        let (count, listener) = counter();
        registry.add_error_listener(Box::new(|_| panic!("listener failure")));
        let inner = count.clone();
        registry.add_error_listener(Box::new(move |err| {
            assert!(matches!(err, InterpreterError::Transport(_)));
            inner.fetch_add(1, Ordering::SeqCst);
        }));
        registry.add_shutdown_listener(listener);

        let err = InterpreterError::Transport(TransportError::Closed);
        assert_eq!(registry.notify_error(&err), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 3);
    }
}
