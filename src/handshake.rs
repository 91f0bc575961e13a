//! Connection negotiation.
//!
//! After power-up the instrument sits in terminal/autobaud mode; after a reset it may be in its
//! boot loader. The mode query reveals which, and each state has a fixed push towards the main
//! program. Once the main program answers, the channel switches to carriage return framing.

use fugit::MillisDurationU32;
use log::{debug, info, warn};

use crate::{
    commands::{self, reply},
    error::{Error, Result},
    protocol::{Channel, Framing},
    transport::Transport,
};

/// Mode queries before giving up.
pub const MAX_ATTEMPTS: u8 = 10;

/// Read timeout while probing.
const QUERY_TIMEOUT: MillisDurationU32 = MillisDurationU32::millis(300);
/// Wait after a mode query before reading, slow firmware states answer late.
const QUERY_GRACE: MillisDurationU32 = MillisDurationU32::millis(100);
/// Wait after each mode switch byte.
const MODE_SWITCH_PAUSE: MillisDurationU32 = MillisDurationU32::millis(200);
/// Wait for the boot loader to hand over to the main program.
const MAIN_PROGRAM_SETTLE: MillisDurationU32 = MillisDurationU32::millis(1000);

/// Outcome of a successful negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiation {
    /// Mode queries used, including the final one.
    pub attempts: u8,
    /// The instrument passed through terminal or boot mode, so its motors lost their homing.
    pub rebooted: bool,
}

/// Drive the instrument into its main program and switch the channel to command framing.
pub fn negotiate<S: Transport>(channel: &mut Channel<S>) -> Result<Negotiation, S::Error> {
    channel.set_framing(Framing::Raw);
    channel.with_timeout(QUERY_TIMEOUT, run)
}

fn run<S: Transport>(channel: &mut Channel<S>) -> Result<Negotiation, S::Error> {
    let mut rebooted = false;
    let mut last_reply = None;

    for attempt in 1..=MAX_ATTEMPTS {
        let answer = query_mode(channel)?;
        last_reply = answer;
        match answer {
            Some(reply::MAIN) => {
                channel.set_framing(Framing::CarriageReturn);
                info!("main program answered after {attempt} attempt(s), rebooted: {rebooted}");
                return Ok(Negotiation {
                    attempts: attempt,
                    rebooted,
                });
            }
            Some(reply::TERMINAL) | Some(reply::DUMB_TERMINAL) => {
                debug!("terminal mode, switching to intelligent mode");
                enter_intelligent_mode(channel)?;
                rebooted = true;
            }
            Some(reply::BOOT) => {
                debug!("boot loader running, starting main program");
                start_main_program(channel)?;
                rebooted = true;
            }
            Some(other) => warn!("unexpected mode reply {other:#04x} on attempt {attempt}"),
            None => debug!("no mode reply on attempt {attempt}"),
        }
    }

    warn!("handshake failed after {MAX_ATTEMPTS} attempts, last reply {last_reply:?}");
    Err(Error::HandshakeFailed {
        attempts: MAX_ATTEMPTS,
        last_reply,
    })
}

/// Send the "where am I" byte and read its answer.
fn query_mode<S: Transport>(channel: &mut Channel<S>) -> Result<Option<u8>, S::Error> {
    channel.write_raw(&[commands::WHERE_AM_I])?;
    channel.pause(QUERY_GRACE);
    let answer = channel.read_byte()?;
    channel.flush_input()?;
    Ok(answer)
}

fn enter_intelligent_mode<S: Transport>(channel: &mut Channel<S>) -> Result<(), S::Error> {
    channel.write_raw(&[commands::ENTER_INTELLIGENT_MODE])?;
    channel.pause(MODE_SWITCH_PAUSE);
    channel.write_raw(&[commands::FORCE_REBOOT])?;
    channel.pause(MODE_SWITCH_PAUSE);
    channel.flush_input()
}

fn start_main_program<S: Transport>(channel: &mut Channel<S>) -> Result<(), S::Error> {
    channel.write_raw(commands::START_MAIN_PROGRAM)?;
    channel.pause(MAIN_PROGRAM_SETTLE);
    match channel.read_byte()? {
        Some(reply::MAIN_STARTED) => channel.flush_input(),
        other => Err(Error::UnexpectedBootReply(other)),
    }
}
