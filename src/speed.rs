//! Grating motor speed profile and the torque boost scope.
//!
//! A stepper delivers more torque when driven slower. Rotating the turret and homing the motors
//! run under [`TORQUE_BOOST_SPEED`], after which the speed found on entry is put back, whether the
//! action succeeded or not.

use log::{debug, warn};

use crate::{
    calibration::TORQUE_BOOST_SPEED,
    commands,
    conversion::check_grating_speed,
    error::{Error, Result},
    protocol::Channel,
    transport::Transport,
    types::MotorSpeed,
};

fn to_hz<I: embedded_io::Error>(value: f64) -> Result<u32, I> {
    if value >= 0.0 && value <= u32::MAX as f64 && value.fract() == 0.0 {
        Ok(value as u32)
    } else {
        Err(Error::InvalidResponse)
    }
}

/// Read the grating motor speed profile (`C0`).
pub fn get_grating_speed<S: Transport>(channel: &mut Channel<S>) -> Result<MotorSpeed, S::Error> {
    let [min_hz, max_hz, rise_time_ms] = channel.query_numbers::<3>(commands::GET_GRATING_SPEED)?;
    Ok(MotorSpeed::new(
        to_hz(min_hz)?,
        to_hz(max_hz)?,
        to_hz(rise_time_ms)?,
    ))
}

/// Write the grating motor speed profile (`B0,min,max,rise`).
pub fn set_grating_speed<S: Transport>(
    channel: &mut Channel<S>,
    speed: MotorSpeed,
) -> Result<(), S::Error> {
    let speed = check_grating_speed(speed)?;
    let command = commands::set_grating_speed::<S::Error>(speed)?;
    channel.execute(&command)
}

/// The grating motor running at [`TORQUE_BOOST_SPEED`]. Must be released.
#[must_use = "the grating motor stays slow until the boost is released"]
pub struct TorqueBoost {
    original: MotorSpeed,
}

impl TorqueBoost {
    /// Remember the current speed and switch to the boost profile.
    pub fn apply<S: Transport>(channel: &mut Channel<S>) -> Result<Self, S::Error> {
        let original = get_grating_speed(channel)?;
        let boost = TorqueBoost { original };
        debug!("torque boost on, saved speed {original:?}");
        if let Err(e) = set_grating_speed(channel, TORQUE_BOOST_SPEED) {
            // The instrument may have taken part of the command.
            if let Err(restore) = boost.release(channel) {
                warn!("could not restore grating speed after failed boost: {restore}");
            }
            return Err(e);
        }
        Ok(boost)
    }

    pub fn original(&self) -> MotorSpeed {
        self.original
    }

    /// Put the saved speed back.
    pub fn release<S: Transport>(self, channel: &mut Channel<S>) -> Result<(), S::Error> {
        debug!("torque boost off, restoring {:?}", self.original);
        set_grating_speed(channel, self.original)
    }
}

/// Run `action` with the grating motor slowed down, restoring the speed on every exit path.
///
/// If `action` fails its error is returned even when restoring fails as well.
pub fn with_boosted_torque<S: Transport, T>(
    channel: &mut Channel<S>,
    action: impl FnOnce(&mut Channel<S>) -> Result<T, S::Error>,
) -> Result<T, S::Error> {
    let boost = TorqueBoost::apply(channel)?;
    let result = action(channel);
    let restored = boost.release(channel);
    match (result, restored) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(restore)) => {
            warn!("could not restore grating speed after failed action: {restore}");
            Err(e)
        }
    }
}
