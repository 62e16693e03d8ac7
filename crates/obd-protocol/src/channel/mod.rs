//! Communication Channel
//!
//! Byte-level duplex link to the adapter plus the reply framing rules.

mod serial;
mod simulated;

pub use serial::{SerialChannel, SerialConfig};
pub use simulated::SimulatedAdapter;

use crate::error::TransportError;
use tracing::debug;

/// Prompt byte the adapter prints when it is ready for the next command
pub const PROMPT: u8 = b'>';

/// Replies longer than this without a prompt are treated as a broken link
pub const MAX_REPLY_LEN: usize = 4096;

/// Byte-oriented link to an ELM327 adapter
pub trait Channel: Send {
    /// Open the underlying device
    fn connect(&mut self) -> Result<(), TransportError>;

    /// Release the device; further I/O fails with `NotConnected`
    fn close(&mut self);

    /// Block until one byte is available
    fn read_byte(&mut self) -> Result<u8, TransportError>;

    /// Write all bytes
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Drop bytes already received but not yet read
    fn discard_input(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

impl<C: Channel + ?Sized> Channel for Box<C> {
    fn connect(&mut self) -> Result<(), TransportError> {
        (**self).connect()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn read_byte(&mut self) -> Result<u8, TransportError> {
        (**self).read_byte()
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        (**self).write(bytes)
    }

    fn discard_input(&mut self) -> Result<(), TransportError> {
        (**self).discard_input()
    }
}

/// Read one reply up to the prompt byte.
///
/// Spaces are skipped while scanning. The prompt and the carriage
/// return/line feed framing before it are not part of the reply.
pub fn read_reply<C: Channel + ?Sized>(channel: &mut C) -> Result<String, TransportError> {
    let mut buffer = Vec::with_capacity(64);
    loop {
        match channel.read_byte()? {
            PROMPT => break,
            b' ' => continue,
            byte => {
                if buffer.len() >= MAX_REPLY_LEN {
                    return Err(TransportError::Overflow(MAX_REPLY_LEN));
                }
                buffer.push(byte);
            }
        }
    }

    while matches!(buffer.last(), Some(b'\r' | b'\n')) {
        buffer.pop();
    }

    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Write a command and read its reply
pub fn exchange<C: Channel + ?Sized>(
    channel: &mut C,
    command: &[u8],
) -> Result<String, TransportError> {
    channel.write(command)?;
    read_reply(channel)
}

/// Throw away the rest of an interrupted reply.
///
/// Reads up to the next prompt, stopping early once the adapter goes
/// quiet, then discards whatever is still buffered. Returns the number of
/// bytes read and dropped.
pub fn resync<C: Channel + ?Sized>(channel: &mut C) -> usize {
    let mut dropped = 0;
    while dropped <= MAX_REPLY_LEN {
        match channel.read_byte() {
            Ok(PROMPT) => {
                dropped += 1;
                break;
            }
            Ok(_) => dropped += 1,
            Err(_) => break,
        }
    }
    if let Err(e) = channel.discard_input() {
        debug!("Could not discard adapter input: {}", e);
    }
    dropped
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct Bytes(VecDeque<u8>);

    impl Channel for Bytes {
        fn connect(&mut self) -> Result<(), TransportError> {
            Ok(())
        }

        fn close(&mut self) {}

        fn read_byte(&mut self) -> Result<u8, TransportError> {
            self.0.pop_front().ok_or(TransportError::Closed)
        }

        fn write(&mut self, _bytes: &[u8]) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn channel(text: &str) -> Bytes {
        Bytes(text.bytes().collect())
    }

    #[test]
    fn test_read_reply_skips_spaces_and_framing() {
        let mut link = channel("41 0C 1A F8\r\r>");
        assert_eq!(read_reply(&mut link).unwrap(), "410C1AF8");
    }

    #[test]
    fn test_read_reply_bare_prompt() {
        let mut link = channel("NO DATA>");
        assert_eq!(read_reply(&mut link).unwrap(), "NODATA");
    }

    #[test]
    fn test_read_reply_keeps_inner_lines() {
        let mut link = channel("SEARCHING...\r41 0D 37\r\r>41");
        assert_eq!(read_reply(&mut link).unwrap(), "SEARCHING...\r410D37");
        assert_eq!(link.0.len(), 2);
    }

    #[test]
    fn test_read_reply_without_prompt_fails() {
        let mut link = channel("41 0C");
        assert_eq!(read_reply(&mut link), Err(TransportError::Closed));
    }

    #[test]
    fn test_resync_drops_rest_of_reply() {
        let mut link = channel(" 1A F8\r>41 0D 32\r>");
        assert_eq!(resync(&mut link), 8);
        assert_eq!(read_reply(&mut link).unwrap(), "410D32");
    }

    #[test]
    fn test_resync_on_quiet_link() {
        let mut link = channel("");
        assert_eq!(resync(&mut link), 0);
    }

    #[test]
    fn test_read_reply_overflow() {
        let mut link = Bytes(std::iter::repeat(b'A').take(MAX_REPLY_LEN + 1).collect());
        assert_eq!(
            read_reply(&mut link),
            Err(TransportError::Overflow(MAX_REPLY_LEN))
        );
    }
}
