//! Our error types for the iHR monochromators.

use thiserror::Error;

pub type Result<T, I> = core::result::Result<T, Error<I>>;

/// Invalid connection parameters, detected before any transport is touched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Serial port name is empty")]
    EmptyPortName,
    #[error("Unsupported baud rate {0}, expected one of 1200, 2400, 4800, 9600 or 19200")]
    UnsupportedBaudRate(u32),
    #[error("GPIB primary address {0} is out of range 0-30")]
    GpibAddressOutOfRange(u8),
    #[error("GPIB board index {0} is out of range 0-15")]
    GpibBoardOutOfRange(u8),
}

/// Custom error type for monochromator communications.
#[derive(Error, Debug)]
pub enum Error<I: embedded_io::Error> {
    #[error("Transport communication error")]
    Transport(I),
    #[error("Invalid configuration: {0}")]
    Config(ConfigError),
    #[error(
        "Instrument did not reach its main program after {attempts} attempts (last reply {last_reply:?}), power cycle the monochromator"
    )]
    HandshakeFailed {
        attempts: u8,
        last_reply: Option<u8>,
    },
    #[error("Boot loader answered {0:?} to the start command, power cycle the monochromator")]
    UnexpectedBootReply(Option<u8>),
    #[error("Command {command:?} was not acknowledged, got {reply:?}")]
    NotAcknowledged {
        command: heapless::String<32>,
        reply: Option<u8>,
    },
    #[error("Invalid response received")]
    InvalidResponse,
    #[error("{quantity} value {value} is out of range [{min}, {max}]")]
    OutOfRange {
        quantity: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("Monochromator is not connected")]
    NotConnected,
    #[error("Motors have not been initialized")]
    NotInitialized,
    #[error("Motors still busy after {waited_ms} ms, power cycle the monochromator if this persists")]
    Timeout { waited_ms: u32 },
    #[error("Wait for motors was cancelled")]
    Cancelled,
    #[error("Command text does not fit its buffer")]
    BufferOverflow,
}

/// Coarse classification of an [`Error`], kept as the controller's error flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Config,
    HandshakeFailed,
    Protocol,
    Range,
    State,
    Timeout,
    Cancelled,
}

impl<I: embedded_io::Error> Error<I> {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Transport(_) => ErrorKind::Transport,
            Error::Config(_) => ErrorKind::Config,
            Error::HandshakeFailed { .. } | Error::UnexpectedBootReply(_) => {
                ErrorKind::HandshakeFailed
            }
            Error::NotAcknowledged { .. } | Error::InvalidResponse | Error::BufferOverflow => {
                ErrorKind::Protocol
            }
            Error::OutOfRange { .. } => ErrorKind::Range,
            Error::NotConnected | Error::NotInitialized => ErrorKind::State,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Whether the instrument is likely wedged and needs its power cycled.
    pub fn recommends_power_cycle(&self) -> bool {
        matches!(self.kind(), ErrorKind::HandshakeFailed | ErrorKind::Timeout)
    }
}

impl<I: embedded_io::Error> From<ConfigError> for Error<I> {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}
