//! Interpreter Engine
//!
//! Owns the single background worker that drains the ledger, writes each
//! request to the channel, waits for the adapter prompt, decodes the reply
//! and routes the outcome to the request's callback. The channel is only
//! ever touched by the worker thread.

use crate::callback::{Outcome, ResponseCallback};
use crate::config::{InterpreterConfig, ViolationPolicy};
use crate::error::InterpreterError;
use crate::ledger::{ledger, Dequeued, Ledger, LedgerReceiver, PendingEntry};
use crate::listeners::ListenerRegistry;
use crate::stats::{Statistics, StatsSnapshot};
use crate::status::{AtomicEngineState, AtomicLinkStatus, EngineState, LinkStatus};
use obd_protocol::channel::{exchange, resync};
use obd_protocol::{
    codec, Channel, DecodeError, FailureCode, ParameterCatalog, Request, StandardCatalog, Unit,
};
use std::ops::ControlFlow;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Runs once on the worker after the channel is closed
pub type TeardownHook = Box<dyn FnOnce() + Send>;

/// State visible to every handle
#[derive(Debug)]
struct Shared {
    link: AtomicLinkStatus,
    state: AtomicEngineState,
    cancel: AtomicBool,
    stats: Statistics,
}

/// Everything the worker takes ownership of at `start()`
struct WorkerSetup {
    channel: Box<dyn Channel>,
    catalog: Arc<dyn ParameterCatalog>,
    receiver: LedgerReceiver,
    listeners: ListenerRegistry,
    teardown: Option<TeardownHook>,
}

/// ELM327 interpreter engine.
///
/// Listeners and the teardown hook must be registered before `start()`.
/// Dropping a started interpreter stops the worker and waits for it.
pub struct Interpreter {
    config: InterpreterConfig,
    shared: Arc<Shared>,
    ledger: Ledger,
    setup: Option<WorkerSetup>,
    worker: Option<JoinHandle<()>>,
}

impl Interpreter {
    pub fn new<C>(
        channel: C,
        catalog: Arc<dyn ParameterCatalog>,
        config: InterpreterConfig,
    ) -> Result<Self, InterpreterError>
    where
        C: Channel + 'static,
    {
        config.validate()?;
        let (ledger, receiver) = ledger(config.ledger_capacity);

        Ok(Self {
            config,
            shared: Arc::new(Shared {
                link: AtomicLinkStatus::new(LinkStatus::Disconnected),
                state: AtomicEngineState::new(EngineState::Idle),
                cancel: AtomicBool::new(false),
                stats: Statistics::new(),
            }),
            ledger,
            setup: Some(WorkerSetup {
                channel: Box::new(channel),
                catalog,
                receiver,
                listeners: ListenerRegistry::new(),
                teardown: None,
            }),
            worker: None,
        })
    }

    /// Interpreter decoding through the standard parameter catalog
    pub fn with_standard_catalog<C>(
        channel: C,
        config: InterpreterConfig,
    ) -> Result<Self, InterpreterError>
    where
        C: Channel + 'static,
    {
        Self::new(channel, Arc::new(StandardCatalog), config)
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    fn setup_mut(&mut self) -> Result<&mut WorkerSetup, InterpreterError> {
        self.setup.as_mut().ok_or(InterpreterError::AlreadyStarted)
    }

    pub fn add_error_listener<F>(&mut self, listener: F) -> Result<(), InterpreterError>
    where
        F: Fn(&InterpreterError) + Send + Sync + 'static,
    {
        self.setup_mut()?.listeners.add_error_listener(Box::new(listener));
        Ok(())
    }

    pub fn add_connection_listener<F>(&mut self, listener: F) -> Result<(), InterpreterError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.setup_mut()?
            .listeners
            .add_connection_listener(Box::new(listener));
        Ok(())
    }

    pub fn add_shutdown_listener<F>(&mut self, listener: F) -> Result<(), InterpreterError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.setup_mut()?
            .listeners
            .add_shutdown_listener(Box::new(listener));
        Ok(())
    }

    /// Run `hook` on the worker after the channel has been closed
    pub fn set_teardown_hook<F>(&mut self, hook: F) -> Result<(), InterpreterError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.setup_mut()?.teardown = Some(Box::new(hook));
        Ok(())
    }

    /// Spawn the worker thread. Idle -> Connecting.
    pub fn start(&mut self) -> Result<InterpreterHandle, InterpreterError> {
        if !self
            .shared
            .state
            .transition(EngineState::Idle, EngineState::Connecting)
        {
            return Err(InterpreterError::AlreadyStarted);
        }
        let setup = self.setup.take().ok_or(InterpreterError::AlreadyStarted)?;

        let worker = Worker {
            shared: self.shared.clone(),
            channel: setup.channel,
            catalog: setup.catalog,
            receiver: setup.receiver,
            listeners: setup.listeners,
            teardown: setup.teardown,
            policy: self.config.violation_policy,
        };

        let thread = std::thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || worker.run())
            .map_err(|e| {
                self.shared.state.store(EngineState::Terminated);
                InterpreterError::Spawn(e.to_string())
            })?;

        info!("Interpreter started on thread {}", self.config.thread_name);
        self.worker = Some(thread);
        Ok(self.handle())
    }

    /// A cloneable handle for submitting work from other threads or tasks
    pub fn handle(&self) -> InterpreterHandle {
        InterpreterHandle {
            shared: self.shared.clone(),
            ledger: self.ledger.clone(),
            unit: self.config.unit,
        }
    }

    pub fn send_request<C>(&self, request: Request, callback: C)
    where
        C: ResponseCallback + 'static,
    {
        self.handle().send_request(request, callback)
    }

    pub fn stop(&self) -> bool {
        self.handle().stop()
    }

    pub fn link_status(&self) -> LinkStatus {
        self.shared.link.load()
    }

    pub fn state(&self) -> EngineState {
        self.shared.state.load()
    }

    pub fn average_latency(&self) -> Duration {
        self.shared.stats.average_latency()
    }

    /// Wait for the worker thread to exit
    pub fn join(&mut self) -> Result<(), InterpreterError> {
        match self.worker.take() {
            Some(thread) => thread.join().map_err(|_| InterpreterError::WorkerPanicked),
            None if self.state() == EngineState::Idle => Err(InterpreterError::NotStarted),
            None => Ok(()),
        }
    }
}

impl Drop for Interpreter {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.stop();
            if let Err(e) = self.join() {
                error!("Interpreter worker did not exit cleanly: {}", e);
            }
        }
    }
}

/// Cloneable submission handle
#[derive(Clone)]
pub struct InterpreterHandle {
    shared: Arc<Shared>,
    ledger: Ledger,
    unit: Unit,
}

impl InterpreterHandle {
    /// Queue `request`. Never blocks; refusals reach `callback` immediately.
    pub fn send_request<C>(&self, request: Request, callback: C)
    where
        C: ResponseCallback + 'static,
    {
        let entry = PendingEntry::new(request, Box::new(callback));

        if matches!(
            self.shared.state.load(),
            EngineState::Stopping | EngineState::Terminated
        ) {
            record_failure(FailureCode::InterpreterStopped);
            entry.fail(FailureCode::InterpreterStopped);
            return;
        }

        match self.ledger.enqueue(entry) {
            Ok(()) => {
                self.shared.stats.record_enqueue();
                metrics::counter!("obd_requests_total").increment(1);
            }
            Err(rejected) => {
                let failure = rejected.failure();
                debug!("Request refused: {}", failure);
                record_failure(failure);
                rejected.into_entry().fail(failure);
            }
        }
    }

    /// Queue `request` and receive its outcome on a oneshot channel
    pub fn submit(&self, request: Request) -> oneshot::Receiver<Outcome> {
        let (tx, rx) = oneshot::channel();
        self.send_request(request, move |outcome: Outcome| {
            let _ = tx.send(outcome);
        });
        rx
    }

    /// Submit and wait for the outcome
    pub async fn query(&self, request: Request) -> Outcome {
        self.submit(request)
            .await
            .unwrap_or(Err(FailureCode::InterpreterStopped))
    }

    /// Query a mode 01 PID in the configured unit
    pub async fn query_pid(&self, pid: u8) -> Outcome {
        self.query(Request::current_data(pid).with_unit(self.unit))
            .await
    }

    /// Request cooperative cancellation.
    ///
    /// Returns `false` if the worker was never started or is already
    /// stopping. A reply being read is finished first.
    pub fn stop(&self) -> bool {
        let accepted = self
            .shared
            .state
            .transition(EngineState::Connecting, EngineState::Stopping)
            || self
                .shared
                .state
                .transition(EngineState::Running, EngineState::Stopping);

        if accepted {
            info!("Interpreter stop requested");
            self.shared.cancel.store(true, Ordering::SeqCst);
            self.ledger.wake();
        }
        accepted
    }

    pub fn link_status(&self) -> LinkStatus {
        self.shared.link.load()
    }

    pub fn state(&self) -> EngineState {
        self.shared.state.load()
    }

    /// Zero until a request has been submitted
    pub fn average_latency(&self) -> Duration {
        self.shared.stats.average_latency()
    }

    pub fn request_count(&self) -> u64 {
        self.shared.stats.request_count()
    }

    pub fn completed_count(&self) -> u64 {
        self.shared.stats.completed_count()
    }

    /// Requests waiting for the worker
    pub fn pending(&self) -> usize {
        self.ledger.len()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }
}

struct Worker {
    shared: Arc<Shared>,
    channel: Box<dyn Channel>,
    catalog: Arc<dyn ParameterCatalog>,
    receiver: LedgerReceiver,
    listeners: ListenerRegistry,
    teardown: Option<TeardownHook>,
    policy: ViolationPolicy,
}

impl Worker {
    fn run(mut self) {
        debug!("Interpreter worker connecting");
        if let Err(e) = self.channel.connect() {
            error!("Adapter connect failed: {}", e);
            self.shared.link.store(LinkStatus::Error);
            self.listeners.notify_error(&InterpreterError::Transport(e));
            self.shutdown();
            return;
        }

        self.shared.link.store(LinkStatus::Connected);
        self.shared
            .state
            .transition(EngineState::Connecting, EngineState::Running);
        info!("Adapter link connected");
        self.listeners.notify_connected();

        self.serve();
        self.shutdown();
    }

    fn cancelled(&self) -> bool {
        self.shared.cancel.load(Ordering::SeqCst)
    }

    fn serve(&mut self) {
        loop {
            if self.cancelled() {
                break;
            }
            let entry = match self.receiver.dequeue() {
                Dequeued::Entry(entry) => entry,
                Dequeued::Woken => continue,
                Dequeued::Closed => break,
            };
            if self.cancelled() {
                entry.fail(FailureCode::InterpreterStopped);
                break;
            }
            if self.service(entry).is_break() {
                break;
            }
        }
    }

    /// One request/reply cycle
    fn service(&mut self, entry: PendingEntry) -> ControlFlow<()> {
        let command = match codec::encode(entry.request()) {
            Ok(command) => command,
            Err(e) => {
                warn!("Cannot encode request: {}", e);
                fail(entry, FailureCode::InvalidRequest);
                return ControlFlow::Continue(());
            }
        };

        debug!(
            "Sending {:?}",
            String::from_utf8_lossy(&command).trim_end()
        );
        let raw = match exchange(self.channel.as_mut(), &command) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Adapter I/O failed: {}", e);
                self.listeners.notify_error(&InterpreterError::Transport(e));
                fail(entry, FailureCode::IoLinkError);
                // The next request must not read what is left of this reply
                let dropped = resync(self.channel.as_mut());
                if dropped > 0 {
                    debug!("Discarded {} bytes of an interrupted reply", dropped);
                }
                return ControlFlow::Continue(());
            }
        };

        let latency = entry.request().elapsed();
        self.shared.stats.record_completion(latency);
        metrics::histogram!("obd_request_latency_seconds").record(latency.as_secs_f64());
        debug!("Reply {:?} after {:?}", raw, latency);

        match codec::decode(&raw, entry.request(), self.catalog.as_ref()) {
            Ok(value) => {
                entry.complete(Ok(value));
                ControlFlow::Continue(())
            }
            Err(DecodeError::Failure(failure)) => {
                fail(entry, failure);
                ControlFlow::Continue(())
            }
            Err(DecodeError::Violation(violation)) => {
                fail(entry, FailureCode::ProtocolViolation);
                match self.policy {
                    ViolationPolicy::FailRequest => {
                        warn!("Reply did not match request: {}", violation);
                        ControlFlow::Continue(())
                    }
                    ViolationPolicy::Abort => {
                        error!("Protocol violation, shutting link down: {}", violation);
                        self.shared.link.store(LinkStatus::Error);
                        self.listeners
                            .notify_error(&InterpreterError::Violation(violation));
                        ControlFlow::Break(())
                    }
                }
            }
        }
    }

    fn shutdown(mut self) {
        self.shared.state.store(EngineState::Stopping);

        let remaining = self.receiver.close();
        if !remaining.is_empty() {
            info!("Failing {} queued requests", remaining.len());
        }
        for entry in remaining {
            fail(entry, FailureCode::InterpreterStopped);
        }

        self.channel.close();

        if let Some(hook) = self.teardown.take() {
            if panic::catch_unwind(AssertUnwindSafe(hook)).is_err() && cfg!(debug_assertions) {
                debug!("Teardown hook panicked");
            }
        }

        self.listeners.notify_shutdown();

        if self.shared.link.load() != LinkStatus::Error {
            self.shared.link.store(LinkStatus::Disconnected);
        }
        self.shared.state.store(EngineState::Terminated);
        info!("Interpreter worker terminated");
    }
}

fn fail(entry: PendingEntry, failure: FailureCode) {
    record_failure(failure);
    entry.fail(failure);
}

fn record_failure(failure: FailureCode) {
    metrics::counter!("obd_request_failures_total", "code" => failure_label(failure)).increment(1);
}

fn failure_label(failure: FailureCode) -> &'static str {
    match failure {
        FailureCode::RequestNotSupported => "not_supported",
        FailureCode::ConfigurationCommandNotRecognized => "not_recognized",
        FailureCode::IoLinkError => "io_link",
        FailureCode::AdapterError(_) => "adapter",
        FailureCode::MalformedReply => "malformed",
        FailureCode::ProtocolViolation => "violation",
        FailureCode::InvalidRequest => "invalid_request",
        FailureCode::LedgerFull => "ledger_full",
        FailureCode::InterpreterStopped => "stopped",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obd_protocol::{SimulatedAdapter, Value};

    #[test]
    fn test_listeners_rejected_after_start() {
        let mut interpreter =
            Interpreter::with_standard_catalog(SimulatedAdapter::new(), InterpreterConfig::default())
                .unwrap();
        interpreter.add_error_listener(|_| {}).unwrap();
        interpreter.start().unwrap();

        assert_eq!(
            interpreter.add_connection_listener(|| {}),
            Err(InterpreterError::AlreadyStarted)
        );
        assert_eq!(
            interpreter.set_teardown_hook(|| {}),
            Err(InterpreterError::AlreadyStarted)
        );
        assert!(matches!(
            interpreter.start(),
            Err(InterpreterError::AlreadyStarted)
        ));
    }

    #[test]
    fn test_stop_before_start() {
        let mut interpreter =
            Interpreter::with_standard_catalog(SimulatedAdapter::new(), InterpreterConfig::default())
                .unwrap();
        assert!(!interpreter.stop());
        assert_eq!(interpreter.join(), Err(InterpreterError::NotStarted));
        assert_eq!(interpreter.state(), EngineState::Idle);
    }

    #[test]
    fn test_invalid_config() {
        let config = InterpreterConfig {
            ledger_capacity: Some(0),
            ..Default::default()
        };
        assert!(Interpreter::with_standard_catalog(SimulatedAdapter::new(), config).is_err());
    }

    #[tokio::test]
    async fn test_simulated_round_trip() {
        let mut interpreter =
            Interpreter::with_standard_catalog(SimulatedAdapter::new(), InterpreterConfig::default())
                .unwrap();
        let handle = interpreter.start().unwrap();

        let echo = handle
            .query(Request::configuration(obd_protocol::OpCode::EchoOff, &[]))
            .await;
        assert_eq!(echo, Ok(Value::Text("OK".to_string())));

        let speed = handle.query_pid(0x0D).await.unwrap();
        assert!(speed.as_f64().is_some());
        assert_eq!(handle.request_count(), 2);
        assert_eq!(handle.completed_count(), 2);

        assert!(handle.stop());
        assert!(!handle.stop());
        tokio::task::spawn_blocking(move || interpreter.join())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(handle.state(), EngineState::Terminated);
        assert_eq!(handle.link_status(), LinkStatus::Disconnected);
        assert_eq!(
            handle.query_pid(0x0C).await,
            Err(FailureCode::InterpreterStopped)
        );
    }
}
