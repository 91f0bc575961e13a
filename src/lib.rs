//! This crate provides an interface for controlling HORIBA iHR320 and iHR550 imaging spectrometers.
//!
//! It drives the grating turret, the wavelength drive, the four motorized slits, the two
//! switchable mirrors and the shutter, over any byte stream implementing [`transport::Transport`].
//! A serial implementation is available with the `serial` feature.
//!
//! The serial port used for comms should be configured like so:
//! * Baud rate: 1200, 2400, 4800, 9600 or 19200
//! * Data bits: 8
//! * Stop bits: 1
//! * Parity: None
//!
//! GPIB connections are identified with [`types::GpibConfig`]; the GPIB session itself has to be
//! supplied as a [`transport::Transport`].
//!
//! Diagnostics go through the [`log`] facade. Install any logger to see them.

pub mod calibration;
pub mod commands;
pub mod conversion;
pub mod error;
pub mod handshake;
pub mod monochromator;
pub mod protocol;
#[cfg(feature = "serial")]
pub mod serial;
pub mod speed;
pub mod transport;
pub mod types;

pub use calibration::DeviceModel;
pub use error::{Error, ErrorKind};
pub use monochromator::{ControllerConfig, DeviceState, Monochromator, WaitPolicy};

#[cfg(test)]
mod mock_serial;
