//! Link status and engine lifecycle state

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Health of the adapter link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum LinkStatus {
    Disconnected = 0,
    Connected = 1,
    Error = 2,
}

impl LinkStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => LinkStatus::Connected,
            2 => LinkStatus::Error,
            _ => LinkStatus::Disconnected,
        }
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinkStatus::Disconnected => "DISCONNECTED",
            LinkStatus::Connected => "CONNECTED",
            LinkStatus::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// Engine lifecycle: Idle -> Connecting -> Running -> Stopping -> Terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum EngineState {
    Idle = 0,
    Connecting = 1,
    Running = 2,
    Stopping = 3,
    Terminated = 4,
}

impl EngineState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => EngineState::Connecting,
            2 => EngineState::Running,
            3 => EngineState::Stopping,
            4 => EngineState::Terminated,
            _ => EngineState::Idle,
        }
    }
}

#[derive(Debug)]
pub struct AtomicLinkStatus(AtomicU8);

impl AtomicLinkStatus {
    pub fn new(status: LinkStatus) -> Self {
        Self(AtomicU8::new(status as u8))
    }

    pub fn load(&self) -> LinkStatus {
        LinkStatus::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, status: LinkStatus) {
        self.0.store(status as u8, Ordering::Release);
    }
}

#[derive(Debug)]
pub struct AtomicEngineState(AtomicU8);

impl AtomicEngineState {
    pub fn new(state: EngineState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn load(&self) -> EngineState {
        EngineState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, state: EngineState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Move `from -> to` only if the current state is `from`
    pub fn transition(&self, from: EngineState, to: EngineState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_status_roundtrip() {
        let status = AtomicLinkStatus::new(LinkStatus::Disconnected);
        status.store(LinkStatus::Error);
        assert_eq!(status.load(), LinkStatus::Error);
        assert_eq!(status.load().to_string(), "ERROR");
    }

    #[test]
    fn test_state_transition_guard() {
        let state = AtomicEngineState::new(EngineState::Idle);
        assert!(state.transition(EngineState::Idle, EngineState::Connecting));
        assert!(!state.transition(EngineState::Idle, EngineState::Connecting));
        assert_eq!(state.load(), EngineState::Connecting);
        state.store(EngineState::Terminated);
        assert!(!state.transition(EngineState::Connecting, EngineState::Running));
    }
}
