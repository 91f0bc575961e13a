//! Command/acknowledge exchanges over a [`Transport`].
//!
//! Every exchange starts by flushing the input buffer so a late byte from an earlier, timed out
//! exchange is never taken as this command's acknowledgement. A command succeeds when the
//! instrument answers with a single `o`; some commands then send a line of numeric payload.

use fugit::MillisDurationU32;
use log::trace;

use crate::{
    commands::{CommandText, reply},
    error::{Error, Result},
    transport::Transport,
};

/// Longest payload line we accept.
const LINE_CAPACITY: usize = 64;

/// How commands are delimited on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// No terminator. Used while negotiating with the boot loader.
    Raw,
    /// Commands and payload lines end with `\r`. Used by the main program.
    CarriageReturn,
}

/// The driver's end of the link to the instrument.
pub struct Channel<S: Transport> {
    transport: S,
    framing: Framing,
}

impl<S: Transport> Channel<S> {
    /// Wrap a freshly opened transport. Framing starts out [`Framing::Raw`].
    pub fn new(transport: S) -> Self {
        Self {
            transport,
            framing: Framing::Raw,
        }
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    pub fn set_framing(&mut self, framing: Framing) {
        trace!("channel framing {:?} -> {:?}", self.framing, framing);
        self.framing = framing;
    }

    pub fn transport(&self) -> &S {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut S {
        &mut self.transport
    }

    /// Give the transport back, e.g. to close it.
    pub fn into_inner(self) -> S {
        self.transport
    }

    pub fn flush_input(&mut self) -> Result<(), S::Error> {
        self.transport.flush_input().map_err(Error::Transport)
    }

    pub fn flush_output(&mut self) -> Result<(), S::Error> {
        self.transport.flush_output().map_err(Error::Transport)
    }

    pub fn pause(&mut self, duration: MillisDurationU32) {
        self.transport.pause(duration);
    }

    /// Write bytes as they are, ignoring the framing.
    pub fn write_raw(&mut self, bytes: &[u8]) -> Result<(), S::Error> {
        trace!("-> {:02x?}", bytes);
        self.transport.write_all(bytes).map_err(Error::Transport)?;
        self.transport.flush().map_err(Error::Transport)
    }

    /// Write a command, adding the terminator the current framing requires.
    pub fn send(&mut self, command: &str) -> Result<(), S::Error> {
        let mut frame: heapless::Vec<u8, 40> = heapless::Vec::new();
        frame
            .extend_from_slice(command.as_bytes())
            .map_err(|_| Error::BufferOverflow)?;
        if self.framing == Framing::CarriageReturn {
            frame.push(b'\r').map_err(|_| Error::BufferOverflow)?;
        }
        trace!("-> {command:?}");
        self.transport.write_all(&frame).map_err(Error::Transport)?;
        self.transport.flush().map_err(Error::Transport)
    }

    /// Read a single byte. `None` if nothing arrived before the read timeout.
    pub fn read_byte(&mut self) -> Result<Option<u8>, S::Error> {
        let mut byte = [0u8; 1];
        match self.transport.read(&mut byte) {
            Ok(0) => Ok(None),
            Ok(_) => {
                trace!("<- {:#04x}", byte[0]);
                Ok(Some(byte[0]))
            }
            Err(e) if embedded_io::Error::kind(&e) == embedded_io::ErrorKind::TimedOut => {
                Ok(None)
            }
            Err(e) => Err(Error::Transport(e)),
        }
    }

    /// Read one payload line, without its terminator.
    pub fn read_line(&mut self) -> Result<heapless::String<LINE_CAPACITY>, S::Error> {
        let mut line: heapless::Vec<u8, LINE_CAPACITY> = heapless::Vec::new();
        loop {
            match self.read_byte()? {
                Some(b'\r') | Some(b'\n') if !line.is_empty() => break,
                Some(b'\r') | Some(b'\n') => continue,
                Some(byte) => line.push(byte).map_err(|_| Error::InvalidResponse)?,
                // Accept an unterminated line once the instrument goes quiet.
                None if !line.is_empty() => break,
                None => return Err(Error::InvalidResponse),
            }
        }
        heapless::String::from_utf8(line).map_err(|_| Error::InvalidResponse)
    }

    fn expect_ack(&mut self, command: &str) -> Result<(), S::Error> {
        match self.read_byte()? {
            Some(reply::ACK) => Ok(()),
            other => Err(Error::NotAcknowledged {
                command: CommandText::try_from(command).unwrap_or_default(),
                reply: other,
            }),
        }
    }

    /// Send a command and check it is acknowledged.
    pub fn execute(&mut self, command: &str) -> Result<(), S::Error> {
        self.flush_input()?;
        self.send(command)?;
        self.expect_ack(command)
    }

    /// Send a command, give the mechanics `settle` to finish, then check the acknowledgement.
    pub fn execute_settled(
        &mut self,
        command: &str,
        settle: MillisDurationU32,
    ) -> Result<(), S::Error> {
        self.flush_input()?;
        self.send(command)?;
        self.pause(settle);
        self.expect_ack(command)
    }

    /// Send a command answered by `o` and a single status byte.
    pub fn query_byte(&mut self, command: &str) -> Result<u8, S::Error> {
        self.execute(command)?;
        self.read_byte()?.ok_or(Error::InvalidResponse)
    }

    /// Send a command answered by `o` and a single number.
    pub fn query_number(&mut self, command: &str) -> Result<f64, S::Error> {
        let [value] = self.query_numbers::<1>(command)?;
        Ok(value)
    }

    /// Send a command answered by `o` and `N` comma separated numbers.
    pub fn query_numbers<const N: usize>(&mut self, command: &str) -> Result<[f64; N], S::Error> {
        self.execute(command)?;
        let line = self.read_line()?;
        parse_numbers(&line).ok_or(Error::InvalidResponse)
    }

    /// Run `f` with a different read timeout, restoring the previous one afterwards.
    pub fn with_timeout<T>(
        &mut self,
        timeout: MillisDurationU32,
        f: impl FnOnce(&mut Self) -> Result<T, S::Error>,
    ) -> Result<T, S::Error> {
        let previous = self.transport.timeout();
        self.transport
            .set_timeout(timeout)
            .map_err(Error::Transport)?;
        let result = f(self);
        let restored = self
            .transport
            .set_timeout(previous)
            .map_err(Error::Transport);
        let value = result?;
        restored?;
        Ok(value)
    }
}

/// Parse exactly `N` comma separated numbers.
fn parse_numbers<const N: usize>(text: &str) -> Option<[f64; N]> {
    let mut values = [0.0; N];
    let mut fields = text.trim().split(',');
    for value in values.iter_mut() {
        *value = fields.next()?.trim().parse().ok()?;
    }
    match fields.next() {
        Some(_) => None,
        None => Some(values),
    }
}
