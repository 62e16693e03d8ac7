//! Running request statistics
//!
//! Written by the worker (completions) and by submitters (request count);
//! read from any thread with atomic loads.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct Statistics {
    requests: AtomicU64,
    completed: AtomicU64,
    latency_nanos: AtomicU64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub requests: u64,
    pub completed: u64,
    pub average_latency_ms: u64,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a submitted request
    pub fn record_enqueue(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Add the round-trip latency of a request that got a reply
    pub fn record_completion(&self, latency: Duration) {
        let nanos = u64::try_from(latency.as_nanos()).unwrap_or(u64::MAX);
        self.latency_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Accumulated latency divided by the request count.
    ///
    /// Zero before any request has been submitted.
    pub fn average_latency(&self) -> Duration {
        match self.requests.load(Ordering::Relaxed) {
            0 => Duration::ZERO,
            count => Duration::from_nanos(self.latency_nanos.load(Ordering::Relaxed) / count),
        }
    }

    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn completed_count(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            requests: self.request_count(),
            completed: self.completed_count(),
            average_latency_ms: self.average_latency().as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_count_latency() {
        let stats = Statistics::new();
        assert_eq!(stats.average_latency(), Duration::ZERO);
        assert_eq!(stats.snapshot().average_latency_ms, 0);
    }

    #[test]
    fn test_average_over_requests() {
        let stats = Statistics::new();
        stats.record_enqueue();
        stats.record_enqueue();
        stats.record_completion(Duration::from_millis(30));
        stats.record_completion(Duration::from_millis(50));
        assert_eq!(stats.average_latency(), Duration::from_millis(40));
        assert_eq!(stats.request_count(), 2);
        assert_eq!(stats.completed_count(), 2);
    }

    #[test]
    fn test_unanswered_requests_lower_average() {
        let stats = Statistics::new();
        for _ in 0..4 {
            stats.record_enqueue();
        }
        stats.record_completion(Duration::from_millis(100));
        assert_eq!(stats.average_latency(), Duration::from_millis(25));
    }
}
