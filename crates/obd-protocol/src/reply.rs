//! Inbound Adapter Replies
//!
//! Classifies the text between two prompts into a hex data payload, a known
//! adapter sentinel, or free text.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed condition strings the adapter prints instead of data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sentinel {
    /// `NO DATA`
    NoData,
    /// `?`
    UnknownCommand,
    /// `UNABLE TO CONNECT`
    UnableToConnect,
    /// `CAN ERROR`
    CanError,
    /// `BUS ERROR`
    BusError,
    /// `BUS INIT: ...ERROR`
    BusInitError,
    /// `BUFFER FULL`
    BufferFull,
    /// `STOPPED`
    Stopped,
    /// `ERROR`
    Error,
}

impl Sentinel {
    /// Text as printed by the adapter
    pub fn text(&self) -> &'static str {
        match self {
            Sentinel::NoData => "NO DATA",
            Sentinel::UnknownCommand => "?",
            Sentinel::UnableToConnect => "UNABLE TO CONNECT",
            Sentinel::CanError => "CAN ERROR",
            Sentinel::BusError => "BUS ERROR",
            Sentinel::BusInitError => "BUS INIT: ...ERROR",
            Sentinel::BufferFull => "BUFFER FULL",
            Sentinel::Stopped => "STOPPED",
            Sentinel::Error => "ERROR",
        }
    }

    /// Match uppercase text with all whitespace removed
    fn recognize(compact: &str) -> Option<Self> {
        let sentinel = match compact {
            "NODATA" => Sentinel::NoData,
            "?" => Sentinel::UnknownCommand,
            "UNABLETOCONNECT" => Sentinel::UnableToConnect,
            "CANERROR" => Sentinel::CanError,
            "BUSERROR" => Sentinel::BusError,
            "BUFFERFULL" => Sentinel::BufferFull,
            "STOPPED" => Sentinel::Stopped,
            "ERROR" => Sentinel::Error,
            s if s.starts_with("BUSINIT") && s.ends_with("ERROR") => Sentinel::BusInitError,
            _ => return None,
        };
        Some(sentinel)
    }
}

impl fmt::Display for Sentinel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

/// A classified reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Uppercase hex digits with whitespace and frame indices removed
    Data(String),
    /// A known adapter condition
    Sentinel(Sentinel),
    /// Anything else, uppercase, one line per adapter line
    Text(String),
}

impl Reply {
    /// Classify raw reply text.
    ///
    /// `command` is the command that was sent; a first line equal to it is
    /// treated as adapter echo and discarded.
    pub fn parse(raw: &str, command: Option<&str>) -> Self {
        let upper = raw.to_ascii_uppercase();
        let echo = command.map(compact);

        let mut lines: Vec<&str> = upper
            .split(|c: char| c == '\r' || c == '\n')
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter(|line| !line.starts_with("SEARCHING"))
            .collect();

        if let (Some(echo), Some(first)) = (echo.as_deref(), lines.first()) {
            if compact(first) == echo {
                lines.remove(0);
            }
        }

        let joined = lines.iter().map(|line| compact(line)).collect::<String>();
        if let Some(sentinel) = Sentinel::recognize(&joined) {
            return Reply::Sentinel(sentinel);
        }

        // A hex command is answered by a header of the same length
        let header_len = echo
            .as_deref()
            .filter(|echo| echo.chars().all(|c| c.is_ascii_hexdigit()))
            .map_or(0, str::len);
        if let Some(data) = hex_payload(&lines, header_len) {
            return Reply::Data(data);
        }

        Reply::Text(lines.join("\n"))
    }
}

fn compact(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Concatenate hex lines, unwrapping CAN multi-frame layout
/// (`014` length line followed by `0:`, `1:`, ... indexed lines).
///
/// Without frame indices every line is a separate response (several ECUs
/// answering, or a segmented mode 09 reply). The first `header_len` digits
/// of the first line are stripped from later lines that repeat them.
fn hex_payload(lines: &[&str], header_len: usize) -> Option<String> {
    if lines.is_empty() {
        return None;
    }

    let indexed = lines.iter().any(|line| frame_index(line).is_some());
    let mut payload = String::new();
    let mut header: Option<String> = None;

    for (i, line) in lines.iter().enumerate() {
        let body = match frame_index(line) {
            Some(rest) => rest,
            None if indexed && i == 0 => continue,
            None => line,
        };
        let body = compact(body);
        if !body.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }

        if indexed || header_len == 0 {
            payload.push_str(&body);
            continue;
        }
        match header.as_deref() {
            Some(header) => payload.push_str(body.strip_prefix(header).unwrap_or(&body)),
            None => {
                header = body.get(..header_len).map(str::to_string);
                payload.push_str(&body);
            }
        }
    }

    if payload.is_empty() {
        None
    } else {
        Some(payload)
    }
}

fn frame_index(line: &str) -> Option<&str> {
    let (index, rest) = line.split_once(':')?;
    if !index.is_empty() && index.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(rest)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_reply() {
        let reply = Reply::parse("41 0c 1a f8\r", None);
        assert_eq!(reply, Reply::Data("410C1AF8".to_string()));
    }

    #[test]
    fn test_no_data_any_case() {
        for raw in ["NO DATA", "no data", "No Data \r", "NODATA"] {
            assert_eq!(Reply::parse(raw, None), Reply::Sentinel(Sentinel::NoData));
        }
    }

    #[test]
    fn test_searching_line_discarded() {
        let reply = Reply::parse("SEARCHING...\r41 0D 37\r", None);
        assert_eq!(reply, Reply::Data("410D37".to_string()));
    }

    #[test]
    fn test_echo_discarded() {
        let reply = Reply::parse("010C\r41 0C 0F A0\r", Some("010C"));
        assert_eq!(reply, Reply::Data("410C0FA0".to_string()));

        let reply = Reply::parse("ATE0\rOK\r", Some("ATE0"));
        assert_eq!(reply, Reply::Text("OK".to_string()));
    }

    #[test]
    fn test_bus_init_error() {
        let reply = Reply::parse("BUS INIT: ...ERROR", None);
        assert_eq!(reply, Reply::Sentinel(Sentinel::BusInitError));
    }

    #[test]
    fn test_multi_frame_reply() {
        let raw = "014\r0: 49 02 01 31 47 31\r1: 4A 43 35 34 34 34 52\r2: 37 32 35 32 33 36 37\r";
        let reply = Reply::parse(raw, None);
        assert_eq!(
            reply,
            Reply::Data("490201314731".to_string() + "4A433534343452" + "37323532333637")
        );
    }

    #[test]
    fn test_segmented_vin_headers_stripped() {
        let raw = "49 02 01 00 00 00 31\r49 02 02 47 31 4A 43\r49 02 03 35 34 34 34\r\
                   49 02 04 52 37 32 35\r49 02 05 32 33 36 37\r";
        let reply = Reply::parse(raw, Some("0902"));
        assert_eq!(
            reply,
            Reply::Data(
                "49020100000031".to_string() + "0247314A43" + "0335343434" + "0452373235"
                    + "0532333637"
            )
        );
    }

    #[test]
    fn test_second_ecu_header_stripped() {
        let reply = Reply::parse("41 0C 1A F8\r41 0C 1B 00\r", Some("010C"));
        assert_eq!(reply, Reply::Data("410C1AF81B00".to_string()));

        // Without a hex command nothing is stripped
        let reply = Reply::parse("41 0C 1A F8\r41 0C 1B 00\r", None);
        assert_eq!(reply, Reply::Data("410C1AF8410C1B00".to_string()));
    }

    #[test]
    fn test_free_text() {
        let reply = Reply::parse("elm327 v1.5\r", None);
        assert_eq!(reply, Reply::Text("ELM327 V1.5".to_string()));
    }
}
