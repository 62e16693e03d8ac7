//! Outbound Diagnostic Requests

use crate::mode;
use crate::opcode::OpCode;
use crate::protocol::ObdProtocol;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Unit system requested from the parameter catalog
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    #[default]
    Metric,
    Imperial,
}

/// A diagnostic service query, optionally for a single PID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRequest {
    /// Service (mode) code
    pub service: u8,
    /// Parameter identifier, absent for services such as mode 03
    pub pid: Option<u8>,
    /// Unit the decoded value should be expressed in
    pub unit: Unit,
}

/// An adapter configuration command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationRequest {
    pub op: OpCode,
    pub args: Vec<u32>,
}

/// The two kinds of outbound operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestKind {
    Service(ServiceRequest),
    Configuration(ConfigurationRequest),
}

/// One outbound operation, immutable once built
#[derive(Debug, Clone)]
pub struct Request {
    kind: RequestKind,
    created_at: Instant,
}

impl Request {
    fn new(kind: RequestKind) -> Self {
        Self {
            kind,
            created_at: Instant::now(),
        }
    }

    /// Query `pid` within `service`
    pub fn service(service: u8, pid: u8) -> Self {
        Self::new(RequestKind::Service(ServiceRequest {
            service,
            pid: Some(pid),
            unit: Unit::Metric,
        }))
    }

    /// Query a service that takes no PID
    pub fn service_only(service: u8) -> Self {
        Self::new(RequestKind::Service(ServiceRequest {
            service,
            pid: None,
            unit: Unit::Metric,
        }))
    }

    /// Current-data query (mode 01)
    pub fn current_data(pid: u8) -> Self {
        Self::service(mode::CURRENT_DATA, pid)
    }

    /// Stored trouble codes (mode 03)
    pub fn read_trouble_codes() -> Self {
        Self::service_only(mode::READ_DTC)
    }

    /// Clear trouble codes (mode 04)
    pub fn clear_trouble_codes() -> Self {
        Self::service_only(mode::CLEAR_DTC)
    }

    /// Adapter configuration command
    pub fn configuration(op: OpCode, args: &[u32]) -> Self {
        Self::new(RequestKind::Configuration(ConfigurationRequest {
            op,
            args: args.to_vec(),
        }))
    }

    /// `ATSP` for the given protocol
    pub fn set_protocol(protocol: ObdProtocol) -> Self {
        Self::configuration(OpCode::SetProtocol, &[protocol.code() as u32])
    }

    /// Replace the unit of a service request
    pub fn with_unit(mut self, unit: Unit) -> Self {
        if let RequestKind::Service(service) = &mut self.kind {
            service.unit = unit;
        }
        self
    }

    pub fn kind(&self) -> &RequestKind {
        &self.kind
    }

    /// Creation time, used for round-trip latency
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Time since the request was created
    pub fn elapsed(&self) -> Duration {
        self.created_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_data_request() {
        let request = Request::current_data(0x0C);
        match request.kind() {
            RequestKind::Service(service) => {
                assert_eq!(service.service, 0x01);
                assert_eq!(service.pid, Some(0x0C));
                assert_eq!(service.unit, Unit::Metric);
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn test_with_unit_ignores_configuration() {
        let request = Request::set_protocol(ObdProtocol::Auto).with_unit(Unit::Imperial);
        assert!(matches!(request.kind(), RequestKind::Configuration(_)));

        let request = Request::current_data(0x0D).with_unit(Unit::Imperial);
        assert!(matches!(
            request.kind(),
            RequestKind::Service(ServiceRequest { unit: Unit::Imperial, .. })
        ));
    }

    #[test]
    fn test_set_protocol_arguments() {
        let request = Request::set_protocol(ObdProtocol::Iso15765_4Can11bit500);
        assert_eq!(
            request.kind(),
            &RequestKind::Configuration(ConfigurationRequest {
                op: OpCode::SetProtocol,
                args: vec![6],
            })
        );
    }
}
