//! Pending-Request Ledger
//!
//! FIFO queue of requests waiting for the worker, each paired with the
//! callback that receives its outcome. Callers enqueue from any thread
//! without blocking; the single worker blocks on `dequeue`.

use crate::callback::{Outcome, ResponseCallback};
use obd_protocol::{FailureCode, Request};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// A request and the callback owed its outcome.
///
/// Dropping an entry that was never completed reports
/// `InterpreterStopped` to the callback.
pub struct PendingEntry {
    request: Request,
    callback: Option<Box<dyn ResponseCallback>>,
}

impl PendingEntry {
    pub fn new(request: Request, callback: Box<dyn ResponseCallback>) -> Self {
        Self {
            request,
            callback: Some(callback),
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Deliver the outcome; a panicking callback does not unwind into the worker
    pub fn complete(mut self, outcome: Outcome) {
        if let Some(callback) = self.callback.take() {
            let result = panic::catch_unwind(AssertUnwindSafe(move || callback.complete(outcome)));
            if result.is_err() && cfg!(debug_assertions) {
                debug!("Response callback panicked");
            }
        }
    }

    pub fn fail(self, failure: FailureCode) {
        self.complete(Err(failure));
    }
}

impl Drop for PendingEntry {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            let _ = panic::catch_unwind(AssertUnwindSafe(move || {
                callback.on_failure(FailureCode::InterpreterStopped)
            }));
        }
    }
}

impl std::fmt::Debug for PendingEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingEntry")
            .field("request", &self.request)
            .field("completed", &self.callback.is_none())
            .finish()
    }
}

enum Slot {
    Entry(PendingEntry),
    /// Unblocks a waiting `dequeue` without carrying work
    Wake,
}

/// Why an entry was not accepted
#[derive(Debug)]
pub enum EnqueueError {
    /// Bounded ledger at capacity
    Full(PendingEntry),
    /// Worker side has gone away
    Closed(PendingEntry),
}

impl EnqueueError {
    pub fn failure(&self) -> FailureCode {
        match self {
            EnqueueError::Full(_) => FailureCode::LedgerFull,
            EnqueueError::Closed(_) => FailureCode::InterpreterStopped,
        }
    }

    pub fn into_entry(self) -> PendingEntry {
        match self {
            EnqueueError::Full(entry) | EnqueueError::Closed(entry) => entry,
        }
    }
}

/// Result of a blocking dequeue
#[derive(Debug)]
pub enum Dequeued {
    Entry(PendingEntry),
    /// Woken without work, re-check cancellation
    Woken,
    /// Every sender is gone
    Closed,
}

/// Producer side, cloned into every handle
#[derive(Clone)]
pub struct Ledger {
    tx: mpsc::UnboundedSender<Slot>,
    depth: Arc<AtomicUsize>,
    capacity: Option<usize>,
}

/// Consumer side, owned by the worker
pub struct LedgerReceiver {
    rx: mpsc::UnboundedReceiver<Slot>,
    depth: Arc<AtomicUsize>,
}

/// Create a ledger; `None` capacity means unbounded
pub fn ledger(capacity: Option<usize>) -> (Ledger, LedgerReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let depth = Arc::new(AtomicUsize::new(0));
    (
        Ledger {
            tx,
            depth: depth.clone(),
            capacity,
        },
        LedgerReceiver { rx, depth },
    )
}

impl Ledger {
    /// Append an entry. Never blocks.
    pub fn enqueue(&self, entry: PendingEntry) -> Result<(), EnqueueError> {
        if let Some(capacity) = self.capacity {
            let reserved = self
                .depth
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |depth| {
                    (depth < capacity).then_some(depth + 1)
                });
            if reserved.is_err() {
                return Err(EnqueueError::Full(entry));
            }
        } else {
            self.depth.fetch_add(1, Ordering::AcqRel);
        }

        self.tx.send(Slot::Entry(entry)).map_err(|err| {
            self.depth.fetch_sub(1, Ordering::AcqRel);
            match err.0 {
                Slot::Entry(entry) => EnqueueError::Closed(entry),
                Slot::Wake => unreachable!("sent an entry"),
            }
        })
    }

    /// Unblock the worker if it is waiting
    pub fn wake(&self) {
        let _ = self.tx.send(Slot::Wake);
    }

    /// Entries waiting to be serviced
    pub fn len(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}

impl LedgerReceiver {
    /// Block until an entry arrives, the ledger is woken, or all senders drop.
    ///
    /// Must not be called from inside an async runtime.
    pub fn dequeue(&mut self) -> Dequeued {
        match self.rx.blocking_recv() {
            Some(Slot::Entry(entry)) => {
                self.depth.fetch_sub(1, Ordering::AcqRel);
                Dequeued::Entry(entry)
            }
            Some(Slot::Wake) => Dequeued::Woken,
            None => Dequeued::Closed,
        }
    }

    /// Refuse further entries and return everything still queued
    pub fn close(&mut self) -> Vec<PendingEntry> {
        self.rx.close();
        let mut remaining = Vec::new();
        while let Ok(slot) = self.rx.try_recv() {
            if let Slot::Entry(entry) = slot {
                self.depth.fetch_sub(1, Ordering::AcqRel);
                remaining.push(entry);
            }
        }
        remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recorder() -> (Arc<Mutex<Vec<Outcome>>>, impl Fn() -> Box<dyn ResponseCallback>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        let make = move || -> Box<dyn ResponseCallback> {
            let sink = sink.clone();
            Box::new(move |outcome: Outcome| sink.lock().unwrap().push(outcome))
        };
        (log, make)
    }

    #[test]
    fn test_fifo_order() {
        let (ledger, mut receiver) = ledger(None);
        let (_, make) = recorder();
        for pid in [0x0C, 0x0D, 0x05] {
            ledger
                .enqueue(PendingEntry::new(Request::current_data(pid), make()))
                .unwrap();
        }
        assert_eq!(ledger.len(), 3);

        let mut seen = Vec::new();
        for _ in 0..3 {
            match receiver.dequeue() {
                Dequeued::Entry(entry) => {
                    seen.push(obd_protocol::codec::command_text(entry.request()).unwrap());
                    entry.complete(Ok(obd_protocol::Value::Acknowledged));
                }
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(seen, vec!["010C", "010D", "0105"]);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_bounded_capacity() {
        let (ledger, mut receiver) = ledger(Some(2));
        let (log, make) = recorder();
        ledger.enqueue(PendingEntry::new(Request::current_data(1), make())).unwrap();
        ledger.enqueue(PendingEntry::new(Request::current_data(2), make())).unwrap();

        let err = ledger
            .enqueue(PendingEntry::new(Request::current_data(3), make()))
            .unwrap_err();
        assert_eq!(err.failure(), FailureCode::LedgerFull);
        err.into_entry().fail(FailureCode::LedgerFull);
        assert_eq!(*log.lock().unwrap(), vec![Err(FailureCode::LedgerFull)]);

        assert!(matches!(receiver.dequeue(), Dequeued::Entry(_)));
        ledger.enqueue(PendingEntry::new(Request::current_data(4), make())).unwrap();
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_wake_unblocks() {
        let (ledger, mut receiver) = ledger(None);
        let waker = ledger.clone();
        let handle = std::thread::spawn(move || receiver.dequeue());
        waker.wake();
        assert!(matches!(handle.join().unwrap(), Dequeued::Woken));
    }

    #[test]
    fn test_closed_when_senders_drop() {
        let (ledger, mut receiver) = ledger(None);
        drop(ledger);
        assert!(matches!(receiver.dequeue(), Dequeued::Closed));
    }

    #[test]
    fn test_dropped_entry_reports_stopped() {
        let (log, make) = recorder();
        let (ledger, mut receiver) = ledger(None);
        ledger.enqueue(PendingEntry::new(Request::current_data(1), make())).unwrap();
        let remaining = receiver.close();
        assert_eq!(remaining.len(), 1);
        drop(remaining);
        assert_eq!(*log.lock().unwrap(), vec![Err(FailureCode::InterpreterStopped)]);

        let err = ledger
            .enqueue(PendingEntry::new(Request::current_data(2), make()))
            .unwrap_err();
        assert!(matches!(err, EnqueueError::Closed(_)));
    }
}
