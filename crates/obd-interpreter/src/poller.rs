//! Adaptive PID poller
//!
//! Submits mode 01 queries through an [`InterpreterHandle`] at per-PID
//! rates, folds the decoded values into a [`SensorFrame`] and publishes
//! each update. Earliest-due PID goes first; sampling priority breaks ties.

use crate::engine::InterpreterHandle;
use crate::error::InterpreterError;
use obd_protocol::{FailureCode, Pid, Request, SensorFrame, Value};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{self, AtomicBool};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Slowest accepted polling rate
pub const MIN_RATE_HZ: f64 = 0.01;
/// Fastest accepted polling rate
pub const MAX_RATE_HZ: f64 = 1000.0;
/// Interval used when a rate gives no usable period
pub const SLOWEST_INTERVAL: Duration = Duration::from_secs(100);
/// Largest accepted back-off multiplier
pub const MAX_FAILURE_BACKOFF: u32 = 100;

/// One PID and how often to query it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PollTarget {
    pub pid: Pid,
    pub rate_hz: f64,
}

impl PollTarget {
    pub fn new(pid: Pid, rate_hz: f64) -> Self {
        Self { pid, rate_hz }
    }
}

/// Configuration for the PID poller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// PIDs to poll
    pub targets: Vec<PollTarget>,
    /// Consecutive failures before a PID is backed off
    pub max_failures: u8,
    /// Interval multiplier applied to a backed-off PID
    pub failure_backoff: u32,
    /// Coolant temperature threshold for rate boost (°C)
    pub coolant_boost_threshold: f64,
    /// Boosted rate multiplier
    pub boost_multiplier: f64,
}

impl PollerConfig {
    /// Rates of 0 disable a target; anything else must lie within
    /// `MIN_RATE_HZ..=MAX_RATE_HZ`.
    pub fn validate(&self) -> Result<(), InterpreterError> {
        for target in &self.targets {
            let rate = target.rate_hz;
            if rate != 0.0 && !(MIN_RATE_HZ..=MAX_RATE_HZ).contains(&rate) {
                return Err(InterpreterError::Config(format!(
                    "{} rate {} Hz outside {}..={} Hz",
                    target.pid.name(),
                    rate,
                    MIN_RATE_HZ,
                    MAX_RATE_HZ
                )));
            }
        }
        if !(self.boost_multiplier.is_finite() && self.boost_multiplier >= 1.0) {
            return Err(InterpreterError::Config(format!(
                "boost_multiplier must be a finite value of at least 1, got {}",
                self.boost_multiplier
            )));
        }
        if !(1..=MAX_FAILURE_BACKOFF).contains(&self.failure_backoff) {
            return Err(InterpreterError::Config(format!(
                "failure_backoff must be within 1..={}, got {}",
                MAX_FAILURE_BACKOFF, self.failure_backoff
            )));
        }
        Ok(())
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            targets: vec![
                // Critical PIDs at 5Hz
                PollTarget::new(Pid::Rpm, 5.0),
                PollTarget::new(Pid::Speed, 5.0),
                PollTarget::new(Pid::CoolantTemp, 5.0),
                PollTarget::new(Pid::EngineLoad, 5.0),
                PollTarget::new(Pid::Maf, 1.0),
                // Slow PIDs
                PollTarget::new(Pid::ShortFuelTrim, 0.5),
                PollTarget::new(Pid::LongFuelTrim, 0.5),
                PollTarget::new(Pid::O2Voltage, 0.5),
            ],
            max_failures: 3,
            failure_backoff: 4,
            coolant_boost_threshold: 95.0,
            boost_multiplier: 2.0,
        }
    }
}

/// A scheduled PID with priority and timing info
#[derive(Debug, Clone)]
pub struct ScheduledPid {
    pub pid: Pid,
    /// Configured sampling rate in Hz
    pub base_rate_hz: f64,
    /// Current sampling rate in Hz
    pub rate_hz: f64,
    pub next_query: Instant,
    /// Higher is more important
    pub priority: u8,
    /// Consecutive failure count
    pub failures: u8,
}

impl ScheduledPid {
    pub fn new(pid: Pid, rate_hz: f64) -> Self {
        Self {
            pid,
            base_rate_hz: rate_hz,
            rate_hz,
            next_query: Instant::now(),
            priority: pid.sampling_priority(),
            failures: 0,
        }
    }

    /// Time between queries, never longer than `SLOWEST_INTERVAL`
    pub fn interval(&self) -> Duration {
        Duration::try_from_secs_f64(1.0 / self.rate_hz)
            .map_or(SLOWEST_INTERVAL, |interval| interval.min(SLOWEST_INTERVAL))
    }

    pub fn schedule_after(&mut self, delay: Duration) {
        self.next_query = Instant::now() + delay;
    }
}

impl Eq for ScheduledPid {}

impl PartialEq for ScheduledPid {
    fn eq(&self, other: &Self) -> bool {
        self.next_query == other.next_query && self.priority == other.priority
    }
}

impl Ord for ScheduledPid {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for min-heap on time, then higher priority first
        other
            .next_query
            .cmp(&self.next_query)
            .then_with(|| self.priority.cmp(&other.priority))
    }
}

impl PartialOrd for ScheduledPid {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Why the poll loop returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollExit {
    /// Stop flag was set
    Stopped,
    /// Interpreter refused work
    InterpreterStopped,
    /// Frame receiver was dropped
    ReceiverClosed,
    /// Nothing to poll
    Empty,
}

pub struct PidPoller {
    queue: BinaryHeap<ScheduledPid>,
    config: PollerConfig,
    stop: Arc<AtomicBool>,
    frame: SensorFrame,
}

impl PidPoller {
    pub fn new(config: PollerConfig) -> Result<Self, InterpreterError> {
        config.validate()?;
        let queue: BinaryHeap<_> = config
            .targets
            .iter()
            .filter(|target| target.rate_hz > 0.0)
            .map(|target| ScheduledPid::new(target.pid, target.rate_hz))
            .collect();

        info!("PID poller created with {} PIDs", queue.len());

        Ok(Self {
            queue,
            config,
            stop: Arc::new(AtomicBool::new(false)),
            frame: SensorFrame::default(),
        })
    }

    /// Flag that ends `run` before its next query
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn pid_count(&self) -> usize {
        self.queue.len()
    }

    /// Latest assembled frame
    pub fn frame(&self) -> &SensorFrame {
        &self.frame
    }

    pub async fn run(
        &mut self,
        handle: &InterpreterHandle,
        frame_tx: mpsc::Sender<SensorFrame>,
    ) -> PollExit {
        info!("Starting PID poller");

        loop {
            if self.stop.load(atomic::Ordering::SeqCst) {
                info!("PID poller stopped");
                return PollExit::Stopped;
            }
            let Some(mut scheduled) = self.queue.pop() else {
                return PollExit::Empty;
            };

            tokio::time::sleep_until(scheduled.next_query).await;

            let outcome = handle.query(Request::current_data(scheduled.pid.as_hex())).await;
            let delay = match outcome {
                Ok(value) => {
                    scheduled.failures = 0;
                    self.apply(&mut scheduled, &value);
                    match frame_tx.try_send(self.frame.clone()) {
                        Ok(()) | Err(TrySendError::Full(_)) => {}
                        Err(TrySendError::Closed(_)) => {
                            debug!("Frame receiver dropped, stopping poller");
                            return PollExit::ReceiverClosed;
                        }
                    }
                    scheduled.interval()
                }
                Err(FailureCode::InterpreterStopped) => {
                    info!("Interpreter stopped, ending poll loop");
                    return PollExit::InterpreterStopped;
                }
                Err(failure) => {
                    scheduled.failures = scheduled.failures.saturating_add(1);
                    warn!(
                        "PID {:02X} query failed (attempt {}): {}",
                        scheduled.pid.as_hex(),
                        scheduled.failures,
                        failure
                    );
                    if scheduled.failures >= self.config.max_failures {
                        warn!("Backing off PID {:02X}", scheduled.pid.as_hex());
                        scheduled
                            .interval()
                            .saturating_mul(self.config.failure_backoff)
                    } else {
                        scheduled.interval()
                    }
                }
            };

            scheduled.schedule_after(delay);
            self.queue.push(scheduled);
        }
    }

    fn apply(&mut self, scheduled: &mut ScheduledPid, value: &Value) {
        let Some(reading) = value.as_f64() else {
            return;
        };
        self.frame.update(scheduled.pid, reading);
        self.frame.timestamp_ms = now_ms();

        if scheduled.pid == Pid::CoolantTemp {
            if reading > self.config.coolant_boost_threshold {
                if scheduled.rate_hz == scheduled.base_rate_hz {
                    warn!("Coolant temp {} > threshold, boosting rate", reading);
                }
                scheduled.rate_hz = scheduled.base_rate_hz * self.config.boost_multiplier;
            } else {
                scheduled.rate_hz = scheduled.base_rate_hz;
            }
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
