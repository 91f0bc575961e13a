//! This module contains the value types used by the monochromator API.

use core::fmt::Write as _;

use strum_macros::{EnumCount as EnumCountMacro, EnumIter};

use crate::error::ConfigError;

/// All baud rates supported by the monochromator's serial port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
#[repr(u32)]
pub enum BaudRate {
    _1200 = 1200,
    _2400 = 2400,
    _4800 = 4800,
    /// This is the default after power-up.
    _9600 = 9600,
    _19200 = 19200,
}

impl TryFrom<u32> for BaudRate {
    type Error = ConfigError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1200 => Ok(BaudRate::_1200),
            2400 => Ok(BaudRate::_2400),
            4800 => Ok(BaudRate::_4800),
            9600 => Ok(BaudRate::_9600),
            19200 => Ok(BaudRate::_19200),
            other => Err(ConfigError::UnsupportedBaudRate(other)),
        }
    }
}

impl From<BaudRate> for u32 {
    fn from(value: BaudRate) -> Self {
        value as u32
    }
}

/// Options for opening a serial connection. Always 8 data bits, 1 stop bit, no parity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    port: String,
    baud_rate: BaudRate,
}

impl SerialConfig {
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Result<Self, ConfigError> {
        let port = port.into();
        if port.trim().is_empty() {
            return Err(ConfigError::EmptyPortName);
        }
        Ok(Self {
            port,
            baud_rate: BaudRate::try_from(baud_rate)?,
        })
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn baud_rate(&self) -> BaudRate {
        self.baud_rate
    }
}

/// Options for a GPIB connection.
///
/// This crate does not ship a GPIB transport; the validated values are meant for whatever
/// VISA/NI-488.2 binding the caller wraps in a [`Transport`](crate::transport::Transport).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpibConfig {
    board: u8,
    address: u8,
}

impl GpibConfig {
    pub const MAX_ADDRESS: u8 = 30;
    pub const MAX_BOARD: u8 = 15;

    pub fn new(board: u8, address: u8) -> Result<Self, ConfigError> {
        if board > Self::MAX_BOARD {
            return Err(ConfigError::GpibBoardOutOfRange(board));
        }
        if address > Self::MAX_ADDRESS {
            return Err(ConfigError::GpibAddressOutOfRange(address));
        }
        Ok(Self { board, address })
    }

    pub fn board(&self) -> u8 {
        self.board
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// VISA resource string, e.g. `GPIB0::5::INSTR`.
    pub fn resource_name(&self) -> heapless::String<24> {
        let mut name = heapless::String::new();
        // Longest possible value is "GPIB15::30::INSTR", well inside the buffer.
        let _ = write!(name, "GPIB{}::{}::INSTR", self.board, self.address);
        name
    }
}

/// Position on the grating turret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, EnumCountMacro)]
#[repr(u8)]
pub enum GratingIndex {
    First = 0,
    Second = 1,
    Third = 2,
}

impl GratingIndex {
    pub fn as_usize(self) -> usize {
        self as usize
    }
}

impl TryFrom<u8> for GratingIndex {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(GratingIndex::First),
            1 => Ok(GratingIndex::Second),
            2 => Ok(GratingIndex::Third),
            other => Err(other),
        }
    }
}

/// The four motorized slits. The discriminant is the slit number used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, EnumCountMacro)]
#[repr(u8)]
pub enum Slit {
    EntranceFront = 0,
    EntranceSide = 1,
    ExitFront = 2,
    ExitSide = 3,
}

/// Speed profile of a stepper motor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotorSpeed {
    /// Start frequency in Hz.
    pub min_hz: u32,
    /// Top frequency in Hz.
    pub max_hz: u32,
    /// Time to ramp from `min_hz` to `max_hz`, in milliseconds.
    pub rise_time_ms: u32,
}

impl MotorSpeed {
    pub const fn new(min_hz: u32, max_hz: u32, rise_time_ms: u32) -> Self {
        Self {
            min_hz,
            max_hz,
            rise_time_ms,
        }
    }
}

/// A slit width or bandwidth request. `Max` opens the slit fully.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SlitTarget {
    Value(f64),
    Max,
}

impl From<f64> for SlitTarget {
    fn from(value: f64) -> Self {
        SlitTarget::Value(value)
    }
}

/// Answer to a motor busy query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorStatus {
    /// Anything but `z` on the wire, normally `q`.
    Busy,
    /// `z` on the wire.
    Idle,
}

impl MotorStatus {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            b'z' => MotorStatus::Idle,
            _ => MotorStatus::Busy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn baud_rate_conversions() {
        for rate in BaudRate::iter() {
            let raw: u32 = rate.into();
            assert_eq!(BaudRate::try_from(raw), Ok(rate));
        }
        assert_eq!(
            BaudRate::try_from(115200),
            Err(ConfigError::UnsupportedBaudRate(115200))
        );
    }

    #[test]
    fn serial_config_validation() {
        let config = SerialConfig::new("/dev/ttyUSB0", 9600).unwrap();
        assert_eq!(config.port(), "/dev/ttyUSB0");
        assert_eq!(config.baud_rate(), BaudRate::_9600);

        assert_eq!(SerialConfig::new("  ", 9600), Err(ConfigError::EmptyPortName));
        assert_eq!(
            SerialConfig::new("COM3", 57600),
            Err(ConfigError::UnsupportedBaudRate(57600))
        );
    }

    #[test]
    fn gpib_config_validation() {
        let config = GpibConfig::new(0, 5).unwrap();
        assert_eq!(config.resource_name().as_str(), "GPIB0::5::INSTR");

        let config = GpibConfig::new(15, 30).unwrap();
        assert_eq!(config.resource_name().as_str(), "GPIB15::30::INSTR");

        assert_eq!(GpibConfig::new(0, 31), Err(ConfigError::GpibAddressOutOfRange(31)));
        assert_eq!(GpibConfig::new(16, 1), Err(ConfigError::GpibBoardOutOfRange(16)));
    }

    #[test]
    fn grating_index_conversions() {
        for index in GratingIndex::iter() {
            assert_eq!(GratingIndex::try_from(index as u8), Ok(index));
        }
        assert_eq!(GratingIndex::try_from(3), Err(3));
    }

    #[test]
    fn motor_status_bytes() {
        assert_eq!(MotorStatus::from_byte(b'z'), MotorStatus::Idle);
        assert_eq!(MotorStatus::from_byte(b'q'), MotorStatus::Busy);
        assert_eq!(MotorStatus::from_byte(b'o'), MotorStatus::Busy);
    }
}
