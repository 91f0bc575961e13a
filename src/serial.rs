//! [`Transport`] over a local serial port, enabled by the `serial` feature.
//!
//! The port is opened 8N1 without flow control at one of the baud rates in [`BaudRate`].

use std::time::Duration;

use fugit::MillisDurationU32;
use log::debug;
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};

use crate::{
    error::{Error, Result},
    transport::Transport,
    types::{BaudRate, SerialConfig},
};

/// Read timeout until the controller picks its own.
const INITIAL_TIMEOUT: MillisDurationU32 = MillisDurationU32::millis(300);

/// A [`std::io::Error`] usable as an [`embedded_io::Error`].
#[derive(Debug)]
pub struct IoError(std::io::Error);

impl IoError {
    pub fn into_inner(self) -> std::io::Error {
        self.0
    }
}

impl core::fmt::Display for IoError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for IoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl From<std::io::Error> for IoError {
    fn from(err: std::io::Error) -> Self {
        IoError(err)
    }
}

impl From<serialport::Error> for IoError {
    fn from(err: serialport::Error) -> Self {
        IoError(err.into())
    }
}

impl embedded_io::Error for IoError {
    fn kind(&self) -> embedded_io::ErrorKind {
        map_kind(self.0.kind())
    }
}

fn map_kind(kind: std::io::ErrorKind) -> embedded_io::ErrorKind {
    use embedded_io::ErrorKind as E;
    use std::io::ErrorKind as K;
    match kind {
        K::NotFound => E::NotFound,
        K::PermissionDenied => E::PermissionDenied,
        K::BrokenPipe => E::BrokenPipe,
        K::InvalidInput => E::InvalidInput,
        K::InvalidData => E::InvalidData,
        // Some platforms report an expired read timeout as WouldBlock.
        K::TimedOut | K::WouldBlock => E::TimedOut,
        K::Interrupted => E::Interrupted,
        K::Unsupported => E::Unsupported,
        K::OutOfMemory => E::OutOfMemory,
        _ => E::Other,
    }
}

/// A serial port talking to the monochromator.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    timeout: MillisDurationU32,
}

impl SerialTransport {
    /// Open the port named in `config`.
    pub fn open(config: &SerialConfig) -> Result<Self, IoError> {
        let baud: u32 = config.baud_rate().into();
        debug!("opening {} at {baud} baud", config.port());
        let port = serialport::new(config.port(), baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(to_std(INITIAL_TIMEOUT))
            .open()
            .map_err(|e| Error::Transport(e.into()))?;
        Ok(Self::from_port(port))
    }

    /// Wrap a port opened elsewhere. It must already be set up 8N1.
    pub fn from_port(port: Box<dyn SerialPort>) -> Self {
        let timeout = MillisDurationU32::millis(
            u32::try_from(port.timeout().as_millis()).unwrap_or(u32::MAX),
        );
        Self { port, timeout }
    }

    pub fn baud_rate(&self) -> Option<BaudRate> {
        self.port
            .baud_rate()
            .ok()
            .and_then(|baud| BaudRate::try_from(baud).ok())
    }

    pub fn into_inner(self) -> Box<dyn SerialPort> {
        self.port
    }
}

fn to_std(duration: MillisDurationU32) -> Duration {
    Duration::from_millis(duration.to_millis() as u64)
}

impl embedded_io::ErrorType for SerialTransport {
    type Error = IoError;
}

impl embedded_io::Read for SerialTransport {
    fn read(&mut self, buf: &mut [u8]) -> core::result::Result<usize, Self::Error> {
        std::io::Read::read(&mut self.port, buf).map_err(IoError)
    }
}

impl embedded_io::Write for SerialTransport {
    fn write(&mut self, buf: &[u8]) -> core::result::Result<usize, Self::Error> {
        std::io::Write::write(&mut self.port, buf).map_err(IoError)
    }

    fn flush(&mut self) -> core::result::Result<(), Self::Error> {
        std::io::Write::flush(&mut self.port).map_err(IoError)
    }
}

impl Transport for SerialTransport {
    fn flush_input(&mut self) -> core::result::Result<(), Self::Error> {
        self.port.clear(ClearBuffer::Input).map_err(IoError::from)
    }

    fn flush_output(&mut self) -> core::result::Result<(), Self::Error> {
        self.port.clear(ClearBuffer::Output).map_err(IoError::from)
    }

    fn set_timeout(&mut self, timeout: MillisDurationU32) -> core::result::Result<(), Self::Error> {
        self.port.set_timeout(to_std(timeout)).map_err(IoError::from)?;
        self.timeout = timeout;
        Ok(())
    }

    fn timeout(&self) -> MillisDurationU32 {
        self.timeout
    }
}
