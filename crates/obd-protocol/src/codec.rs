//! ELM327 Wire Codec
//!
//! Stateless translation between typed requests and the adapter's
//! carriage-return terminated ASCII dialect.

use crate::catalog::{ParameterCatalog, Value};
use crate::error::{DecodeError, EncodeError, FailureCode, ProtocolViolation};
use crate::reply::{Reply, Sentinel};
use crate::request::{Request, RequestKind, ServiceRequest};
use tracing::debug;

/// Command terminator
pub const TERMINATOR: u8 = b'\r';

/// Offset added to the service code in a positive response
pub const RESPONSE_OFFSET: u8 = 0x40;

/// Service response header acknowledging a clear-DTC request
const CLEAR_DTC_ACK: &str = "44";

/// Command text for a request, without the terminator
pub fn command_text(request: &Request) -> Result<String, EncodeError> {
    match request.kind() {
        RequestKind::Service(ServiceRequest {
            service,
            pid: Some(pid),
            ..
        }) => Ok(format!("{:02X}{:02X}", service, pid)),
        RequestKind::Service(ServiceRequest {
            service, pid: None, ..
        }) => Ok(format!("{:02X}", service)),
        RequestKind::Configuration(config) => config.op.format(&config.args),
    }
}

/// Encode a request into the bytes written to the adapter
pub fn encode(request: &Request) -> Result<Vec<u8>, EncodeError> {
    let mut bytes = command_text(request)?.into_bytes();
    bytes.push(TERMINATOR);
    Ok(bytes)
}

/// Decode one framed reply against the request that produced it.
///
/// `NO DATA` is always `RequestNotSupported`. Configuration replies are
/// passed through as text. Service replies must carry the `0x40 + service`
/// header and, when a PID was requested, echo that PID; otherwise the reply
/// is a [`ProtocolViolation`].
pub fn decode(
    raw: &str,
    request: &Request,
    catalog: &dyn ParameterCatalog,
) -> Result<Value, DecodeError> {
    let echo = command_text(request).ok();
    let reply = Reply::parse(raw, echo.as_deref());
    debug!(?reply, "Decoding reply");

    if reply == Reply::Sentinel(Sentinel::NoData) {
        return Err(FailureCode::RequestNotSupported.into());
    }

    match request.kind() {
        RequestKind::Configuration(_) => match reply {
            Reply::Sentinel(Sentinel::UnknownCommand) => {
                Err(FailureCode::ConfigurationCommandNotRecognized.into())
            }
            Reply::Sentinel(sentinel) => Err(FailureCode::AdapterError(sentinel).into()),
            Reply::Data(text) | Reply::Text(text) => Ok(Value::Text(text)),
        },
        RequestKind::Service(service) => match reply {
            Reply::Sentinel(sentinel) => Err(FailureCode::AdapterError(sentinel).into()),
            Reply::Text(_) => Err(FailureCode::MalformedReply.into()),
            Reply::Data(hex) => decode_service(&hex, service, catalog),
        },
    }
}

fn decode_service(
    hex: &str,
    request: &ServiceRequest,
    catalog: &dyn ParameterCatalog,
) -> Result<Value, DecodeError> {
    let expected = request.service.wrapping_add(RESPONSE_OFFSET);
    let header = hex
        .get(..2)
        .ok_or_else(|| ProtocolViolation::Truncated(hex.to_string()))?;
    if header != format!("{:02X}", expected) {
        return Err(ProtocolViolation::HeaderMismatch {
            expected,
            actual: header.to_string(),
        }
        .into());
    }
    if header == CLEAR_DTC_ACK {
        return Ok(Value::Acknowledged);
    }

    let mut body = &hex[2..];
    if let Some(pid) = request.pid {
        let echoed = body
            .get(..2)
            .ok_or_else(|| ProtocolViolation::Truncated(hex.to_string()))?;
        if echoed != format!("{:02X}", pid) {
            return Err(ProtocolViolation::ParameterMismatch {
                expected: pid,
                actual: echoed.to_string(),
            }
            .into());
        }
        body = &body[2..];
    }

    let bytes = hex_to_bytes(body);
    match catalog.unmarshaller_for(request.service, request.pid, request.unit) {
        Some(unmarshal) => unmarshal(&bytes).ok_or(DecodeError::Failure(FailureCode::MalformedReply)),
        None => Ok(Value::Raw(bytes)),
    }
}

/// Decode hex digit pairs; a trailing odd digit is dropped
pub fn hex_to_bytes(hex: &str) -> Vec<u8> {
    hex.as_bytes()
        .chunks_exact(2)
        .filter_map(|pair| {
            let s = std::str::from_utf8(pair).ok()?;
            u8::from_str_radix(s, 16).ok()
        })
        .collect()
}
