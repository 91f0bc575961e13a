//! We use this mocking module in unit tests to emulate the instrument's serial port.
//!
//! Replies are scripted per write: every `write` call moves the next scripted reply into the
//! read buffer, so a flush of the input buffer before a command cannot eat its answer.

use std::collections::VecDeque;

use fugit::MillisDurationU32;
use thiserror::Error;

use crate::transport::Transport;

/// Our mock type used to emulate a serial port.
pub struct MockSerial {
    /// Every write call, in order.
    writes: Vec<Vec<u8>>,
    /// Replies released into the read buffer, one per write call.
    replies: VecDeque<Vec<u8>>,
    /// Bytes available to read.
    read_buffer: VecDeque<u8>,
    /// Current read timeout.
    timeout: MillisDurationU32,
    /// Every timeout set, in order.
    timeout_history: Vec<MillisDurationU32>,
    /// Total time spent in `pause`, which never actually sleeps.
    paused_ms: u64,
    /// Number of times the input buffer was flushed.
    input_flushes: usize,
    /// Flag to simulate write errors
    should_error_on_write: bool,
    /// Flag to simulate read errors
    should_error_on_read: bool,
}

#[derive(Error, Debug)]
pub enum MockSerialError {
    /// Nothing left to read before the timeout.
    #[error("Simulated read timeout")]
    Timeout,
    /// Generic simulated error for testing
    #[error("Simulated transport error")]
    SimulatedError,
}

impl embedded_io::Error for MockSerialError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            MockSerialError::Timeout => embedded_io::ErrorKind::TimedOut,
            MockSerialError::SimulatedError => embedded_io::ErrorKind::Other,
        }
    }
}

impl embedded_io::ErrorType for MockSerial {
    type Error = MockSerialError;
}

impl embedded_io::Write for MockSerial {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if self.should_error_on_write {
            return Err(MockSerialError::SimulatedError);
        }
        self.writes.push(buf.to_vec());
        if let Some(reply) = self.replies.pop_front() {
            self.read_buffer.extend(reply);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        if self.should_error_on_write {
            return Err(MockSerialError::SimulatedError);
        }
        Ok(())
    }
}

impl embedded_io::Read for MockSerial {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if self.should_error_on_read {
            return Err(MockSerialError::SimulatedError);
        }
        if self.read_buffer.is_empty() {
            return Err(MockSerialError::Timeout);
        }

        let mut count = 0;
        while count < buf.len() {
            match self.read_buffer.pop_front() {
                Some(byte) => {
                    buf[count] = byte;
                    count += 1;
                }
                None => break,
            }
        }
        Ok(count)
    }
}

impl Transport for MockSerial {
    fn flush_input(&mut self) -> Result<(), Self::Error> {
        self.input_flushes += 1;
        self.read_buffer.clear();
        Ok(())
    }

    fn flush_output(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_timeout(&mut self, timeout: MillisDurationU32) -> Result<(), Self::Error> {
        self.timeout = timeout;
        self.timeout_history.push(timeout);
        Ok(())
    }

    fn timeout(&self) -> MillisDurationU32 {
        self.timeout
    }

    fn pause(&mut self, duration: MillisDurationU32) {
        self.paused_ms += duration.to_millis() as u64;
    }
}

impl MockSerial {
    /// Create a new MockSerial instance with nothing scripted.
    pub fn new() -> Self {
        Self {
            writes: Vec::new(),
            replies: VecDeque::new(),
            read_buffer: VecDeque::new(),
            timeout: MillisDurationU32::millis(1000),
            timeout_history: Vec::new(),
            paused_ms: 0,
            input_flushes: 0,
            should_error_on_write: false,
            should_error_on_read: false,
        }
    }

    /// Create a MockSerial answering successive writes with `replies`.
    pub fn with_replies(replies: &[&[u8]]) -> Self {
        let mut mock = Self::new();
        for reply in replies {
            mock.push_reply(reply);
        }
        mock
    }

    /// Queue the reply to the next unanswered write. An empty reply means silence.
    pub fn push_reply(&mut self, reply: &[u8]) {
        self.replies.push_back(reply.to_vec());
    }

    /// Bytes of every write call, in order.
    pub fn writes(&self) -> &[Vec<u8>] {
        &self.writes
    }

    /// Every write call as text with the carriage return terminator stripped.
    pub fn written_commands(&self) -> Vec<String> {
        self.writes
            .iter()
            .map(|w| {
                let text = String::from_utf8_lossy(w);
                text.strip_suffix('\r').unwrap_or(&text).to_string()
            })
            .collect()
    }

    /// Clear the record of writes.
    pub fn clear_writes(&mut self) {
        self.writes.clear();
    }

    /// Scripted replies not yet released.
    pub fn pending_replies(&self) -> usize {
        self.replies.len()
    }

    pub fn timeout_history(&self) -> &[MillisDurationU32] {
        &self.timeout_history
    }

    pub fn paused_ms(&self) -> u64 {
        self.paused_ms
    }

    pub fn input_flushes(&self) -> usize {
        self.input_flushes
    }

    /// Configure whether write operations should fail with an error
    pub fn set_write_error(&mut self, should_error: bool) {
        self.should_error_on_write = should_error;
    }

    /// Configure whether read operations should fail with an error
    pub fn set_read_error(&mut self, should_error: bool) {
        self.should_error_on_read = should_error;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_io::{Error, Read, Write};

    #[test]
    fn test_new_mock_serial() {
        let mock = MockSerial::new();
        assert!(mock.writes().is_empty());
        assert_eq!(mock.pending_replies(), 0);
        assert_eq!(mock.paused_ms(), 0);
    }

    #[test]
    fn test_write_releases_reply() {
        let mut mock = MockSerial::with_replies(&[b"o", b"o12\r"]);

        mock.write(b"A\r").unwrap();
        let mut buffer = [0u8; 8];
        assert_eq!(mock.read(&mut buffer).unwrap(), 1);
        assert_eq!(buffer[0], b'o');

        mock.write(b"C0\r").unwrap();
        assert_eq!(mock.read(&mut buffer).unwrap(), 4);
        assert_eq!(&buffer[..4], b"o12\r");

        assert_eq!(mock.written_commands(), vec!["A", "C0"]);
    }

    #[test]
    fn test_read_partial_data() {
        let mut mock = MockSerial::with_replies(&[b"Long response data"]);
        mock.write(b"x").unwrap();

        let mut buffer = [0u8; 5];
        assert_eq!(mock.read(&mut buffer).unwrap(), 5);
        assert_eq!(&buffer, b"Long ");
    }

    #[test]
    fn test_read_timeout_when_no_data() {
        let mut mock = MockSerial::new();
        let mut buffer = [0u8; 10];

        let result = mock.read(&mut buffer);
        assert!(matches!(result, Err(MockSerialError::Timeout)));
        assert_eq!(
            MockSerialError::Timeout.kind(),
            embedded_io::ErrorKind::TimedOut
        );
    }

    #[test]
    fn test_silent_reply() {
        let mut mock = MockSerial::with_replies(&[b""]);
        mock.write(b" ").unwrap();

        let mut buffer = [0u8; 1];
        assert!(mock.read(&mut buffer).is_err());
        assert_eq!(mock.pending_replies(), 0);
    }

    #[test]
    fn test_flush_input_discards_unread() {
        let mut mock = MockSerial::with_replies(&[b"stale"]);
        mock.write(b"x").unwrap();
        mock.flush_input().unwrap();

        let mut buffer = [0u8; 5];
        assert!(mock.read(&mut buffer).is_err());
        assert_eq!(mock.input_flushes(), 1);
    }

    #[test]
    fn test_pause_does_not_sleep() {
        let mut mock = MockSerial::new();
        mock.pause(MillisDurationU32::secs(3600));
        assert_eq!(mock.paused_ms(), 3_600_000);
    }

    #[test]
    fn test_timeout_history() {
        let mut mock = MockSerial::new();
        mock.set_timeout(MillisDurationU32::secs(90)).unwrap();
        mock.set_timeout(MillisDurationU32::millis(500)).unwrap();
        assert_eq!(mock.timeout(), MillisDurationU32::millis(500));
        assert_eq!(mock.timeout_history().len(), 2);
    }

    #[test]
    fn test_error_flags_toggle() {
        let mut mock = MockSerial::new();

        mock.set_write_error(true);
        assert!(mock.write(b"test").is_err());
        assert!(mock.flush().is_err());
        mock.set_write_error(false);
        assert!(mock.write(b"test").is_ok());

        mock.push_reply(b"data");
        mock.write(b"q").unwrap();
        mock.set_read_error(true);
        let mut buffer = [0u8; 10];
        assert!(matches!(
            mock.read(&mut buffer),
            Err(MockSerialError::SimulatedError)
        ));
        mock.set_read_error(false);
        assert!(mock.read(&mut buffer).is_ok());
    }

    #[test]
    fn test_errors_classify_and_display() {
        assert_eq!(MockSerialError::Timeout.kind(), embedded_io::ErrorKind::TimedOut);
        assert_eq!(
            MockSerialError::SimulatedError.kind(),
            embedded_io::ErrorKind::Other
        );
        assert_eq!(MockSerialError::Timeout.to_string(), "Simulated read timeout");
        let err: &dyn core::error::Error = &MockSerialError::SimulatedError;
        assert_eq!(err.to_string(), "Simulated transport error");
    }
}
