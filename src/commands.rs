//! This module is used to define the command vocabulary of the monochromator.
//!
//! Handshake bytes are sent raw. Every other command is ASCII text, terminated with a carriage
//! return by the [`Channel`](crate::protocol::Channel) once the main program is running.

use core::fmt::Write as _;

use crate::{
    error::Error,
    types::{GratingIndex, MotorSpeed, Slit},
};

/// Fixed-capacity command text.
pub type CommandText = heapless::String<32>;

/// "Where am I" query. Answered with `*`, `B`, `F` or a space.
pub const WHERE_AM_I: u8 = b' ';
/// Switch the firmware into intelligent (command) mode.
pub const ENTER_INTELLIGENT_MODE: u8 = 0xF8;
/// Force a reboot if the firmware is hung.
pub const FORCE_REBOOT: u8 = 0xDE;
/// Boot loader command starting the main program. Sent with a trailing NUL.
pub const START_MAIN_PROGRAM: &[u8] = b"O2000\0";

/// Replies to [`WHERE_AM_I`].
pub mod reply {
    /// Terminal/autobaud mode right after power-on.
    pub const TERMINAL: u8 = b'*';
    /// Boot loader running.
    pub const BOOT: u8 = b'B';
    /// Main program running in intelligent mode.
    pub const MAIN: u8 = b'F';
    /// Dumb terminal mode.
    pub const DUMB_TERMINAL: u8 = b' ';
    /// Acknowledgement of a command.
    pub const ACK: u8 = b'o';
    /// Answer of the boot loader to [`START_MAIN_PROGRAM`](super::START_MAIN_PROGRAM).
    pub const MAIN_STARTED: u8 = b'*';
}

pub const INITIALIZE_MOTORS: &str = "A";
pub const GET_GRATING_SPEED: &str = "C0";
pub const READ_TURRET_INDEX: &str = "Z452,0,0,0";
pub const INDEX_DEVICE_STATUS: &str = "Z453";
pub const GET_WAVELENGTH: &str = "Z62,0";
pub const MOTOR_BUSY_STATUS: &str = "E";
pub const ENTRANCE_MIRROR_SIDE: &str = "c0";
pub const ENTRANCE_MIRROR_FRONT: &str = "d0";
pub const EXIT_MIRROR_SIDE: &str = "e0";
pub const EXIT_MIRROR_FRONT: &str = "f0";
pub const OPEN_SHUTTER: &str = "W0";
pub const CLOSE_SHUTTER: &str = "X0";

fn format<I: embedded_io::Error>(args: core::fmt::Arguments<'_>) -> Result<CommandText, Error<I>> {
    let mut text = CommandText::new();
    text.write_fmt(args).map_err(|_| Error::BufferOverflow)?;
    Ok(text)
}

/// `B0,min,max,rise`
pub fn set_grating_speed<I: embedded_io::Error>(
    speed: MotorSpeed,
) -> Result<CommandText, Error<I>> {
    format(format_args!(
        "B0,{},{},{}",
        speed.min_hz, speed.max_hz, speed.rise_time_ms
    ))
}

/// `Z451,0,0,0,idx`
pub fn set_turret_index<I: embedded_io::Error>(
    index: GratingIndex,
) -> Result<CommandText, Error<I>> {
    format(format_args!("Z451,0,0,0,{}", index as u8))
}

/// `Z60,0,raw`
pub fn set_wavelength<I: embedded_io::Error>(raw: f64) -> Result<CommandText, Error<I>> {
    format(format_args!("Z60,0,{raw:.4}"))
}

/// `Z61,0,raw`
pub fn move_to_wavelength<I: embedded_io::Error>(raw: f64) -> Result<CommandText, Error<I>> {
    format(format_args!("Z61,0,{raw:.4}"))
}

/// `g0,slit,hz`
pub fn set_slit_speed<I: embedded_io::Error>(slit: Slit, hz: u32) -> Result<CommandText, Error<I>> {
    format(format_args!("g0,{},{hz}", slit as u8))
}

/// `h0,slit`
pub fn get_slit_speed<I: embedded_io::Error>(slit: Slit) -> Result<CommandText, Error<I>> {
    format(format_args!("h0,{}", slit as u8))
}

/// `i0,slit,steps`
pub fn set_slit_position<I: embedded_io::Error>(
    slit: Slit,
    steps: i32,
) -> Result<CommandText, Error<I>> {
    format(format_args!("i0,{},{steps}", slit as u8))
}

/// `j0,slit`
pub fn read_slit_position<I: embedded_io::Error>(slit: Slit) -> Result<CommandText, Error<I>> {
    format(format_args!("j0,{}", slit as u8))
}

/// `k0,slit,delta`
pub fn move_slit_relative<I: embedded_io::Error>(
    slit: Slit,
    delta_steps: i32,
) -> Result<CommandText, Error<I>> {
    format(format_args!("k0,{},{delta_steps}", slit as u8))
}
