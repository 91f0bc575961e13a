//! The [`Monochromator`] controller: connection lifecycle, cached device state and all public
//! operations.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use fugit::MillisDurationU32;
use log::{debug, info, warn};

use crate::{
    calibration::{DeviceModel, ModelCalibration, SLIT_GEOMETRY},
    commands,
    conversion::check_slit_speed,
    error::{Error, ErrorKind, Result},
    handshake,
    protocol::Channel,
    speed,
    transport::Transport,
    types::{GratingIndex, MotorSpeed, MotorStatus, Slit, SlitTarget},
};

/// Homing is only acknowledged once it completes, which takes up to this long.
pub const MIN_INITIALIZE_TIMEOUT: MillisDurationU32 = MillisDurationU32::secs(80);

fn at_least(value: MillisDurationU32, floor: MillisDurationU32) -> MillisDurationU32 {
    if value < floor { floor } else { value }
}

/// How long to keep polling a moving motor, and how often.
#[derive(Debug, Clone)]
pub struct WaitPolicy {
    /// Give up with [`Error::Timeout`] after this long.
    pub timeout: MillisDurationU32,
    /// Pause between two status polls.
    pub interval: MillisDurationU32,
    cancel: Option<Arc<AtomicBool>>,
}

impl WaitPolicy {
    pub fn new(timeout: MillisDurationU32, interval: MillisDurationU32) -> Self {
        Self {
            timeout,
            interval,
            cancel: None,
        }
    }

    /// Stop waiting with [`Error::Cancelled`] once `flag` is set.
    ///
    /// The flag is checked between complete status exchanges, so no acknowledgement is ever left
    /// unread on the channel.
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

/// Behaviour of a [`Monochromator`]. Use [`Default`] and the `with_*` methods.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Slow the grating motor down while homing and rotating the turret.
    pub torque_boost: bool,
    /// Read timeout for ordinary commands.
    pub command_timeout: MillisDurationU32,
    /// Read timeout for motor initialization, which is only acknowledged once homing finishes.
    /// Never shorter than [`MIN_INITIALIZE_TIMEOUT`] when used.
    pub initialize_timeout: MillisDurationU32,
    /// Pause between a mirror or shutter command and its acknowledgement.
    pub settle_time: MillisDurationU32,
    pub grating_wait: WaitPolicy,
    pub slit_wait: WaitPolicy,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            torque_boost: true,
            command_timeout: MillisDurationU32::secs(2),
            initialize_timeout: MillisDurationU32::secs(90),
            settle_time: MillisDurationU32::secs(1),
            grating_wait: WaitPolicy::new(MillisDurationU32::secs(60), MillisDurationU32::secs(1)),
            slit_wait: WaitPolicy::new(MillisDurationU32::secs(30), MillisDurationU32::secs(1)),
        }
    }
}

impl ControllerConfig {
    pub fn with_torque_boost(mut self, enabled: bool) -> Self {
        self.torque_boost = enabled;
        self
    }

    pub fn with_command_timeout(mut self, timeout: MillisDurationU32) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Values below [`MIN_INITIALIZE_TIMEOUT`] are raised to it.
    pub fn with_initialize_timeout(mut self, timeout: MillisDurationU32) -> Self {
        self.initialize_timeout = at_least(timeout, MIN_INITIALIZE_TIMEOUT);
        self
    }

    pub fn with_settle_time(mut self, settle: MillisDurationU32) -> Self {
        self.settle_time = settle;
        self
    }

    pub fn with_grating_wait(mut self, policy: WaitPolicy) -> Self {
        self.grating_wait = policy;
        self
    }

    pub fn with_slit_wait(mut self, policy: WaitPolicy) -> Self {
        self.slit_wait = policy;
        self
    }
}

/// What the driver knows about the instrument.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceState {
    connected: bool,
    motors_initialized: bool,
    grating_index: Option<GratingIndex>,
    /// Only ever set together with, or derived from, the grating in use.
    grating_base_factor: Option<f64>,
    last_error: Option<ErrorKind>,
}

impl DeviceState {
    pub fn connected(&self) -> bool {
        self.connected
    }

    pub fn motors_initialized(&self) -> bool {
        self.motors_initialized
    }

    pub fn grating_index(&self) -> Option<GratingIndex> {
        self.grating_index
    }

    pub fn grating_base_factor(&self) -> Option<f64> {
        self.grating_base_factor
    }

    pub fn last_error(&self) -> Option<ErrorKind> {
        self.last_error
    }
}

/// A monochromator reached through any [`Transport`].
///
/// The protocol is strictly one command at a time, so every method takes `&mut self`. To share
/// one instrument between threads put the `Monochromator` behind a [`std::sync::Mutex`].
///
/// Methods named "set" write a target without moving anything, "move" methods drive a motor and,
/// where the motion takes a while, block until it stops.
pub struct Monochromator<S: Transport> {
    model: DeviceModel,
    calibration: ModelCalibration,
    config: ControllerConfig,
    channel: Option<Channel<S>>,
    state: DeviceState,
}

impl<S: Transport> Monochromator<S> {
    /// Create a disconnected controller for `model` with the default configuration.
    pub fn new(model: DeviceModel) -> Self {
        Self::with_config(model, ControllerConfig::default())
    }

    pub fn with_config(model: DeviceModel, config: ControllerConfig) -> Self {
        Self {
            model,
            calibration: model.calibration(),
            config,
            channel: None,
            state: DeviceState::default(),
        }
    }

    pub fn model(&self) -> DeviceModel {
        self.model
    }

    pub fn calibration(&self) -> &ModelCalibration {
        &self.calibration
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state.connected
    }

    /// The transport, while connected.
    pub fn transport(&self) -> Option<&S> {
        self.channel.as_ref().map(Channel::transport)
    }

    /// Return and clear the error flag.
    pub fn take_last_error(&mut self) -> Option<ErrorKind> {
        self.state.last_error.take()
    }

    /// Negotiate with the instrument over a freshly opened `transport`.
    ///
    /// On failure the transport is dropped and the controller stays disconnected. A
    /// [`Error::HandshakeFailed`] means the instrument needs a power cycle.
    pub fn connect(&mut self, transport: S) -> Result<(), S::Error> {
        self.channel = None;
        self.state.connected = false;
        self.track(|this| {
            let mut channel = Channel::new(transport);
            let negotiation = handshake::negotiate(&mut channel)?;
            channel
                .transport_mut()
                .set_timeout(this.config.command_timeout)
                .map_err(Error::Transport)?;

            if negotiation.rebooted {
                this.state.motors_initialized = false;
                this.forget_grating();
            }
            this.state.connected = true;
            this.channel = Some(channel);
            info!(
                "{} connected, motors initialized: {}",
                this.model, this.state.motors_initialized
            );
            Ok(())
        })
    }

    /// Release the transport and forget everything known about the instrument.
    pub fn disconnect(&mut self) -> Option<S> {
        let mut channel = self.channel.take()?;
        if let Err(e) = channel.flush_input().and_then(|_| channel.flush_output()) {
            warn!("could not flush buffers on disconnect: {e}");
        }
        self.state = DeviceState::default();
        Some(channel.into_inner())
    }

    /// Home all motors. Takes over a minute; the read timeout is extended meanwhile.
    pub fn initialize_motors(&mut self) -> Result<(), S::Error> {
        self.track(|this| {
            let timeout = at_least(this.config.initialize_timeout, MIN_INITIALIZE_TIMEOUT);
            let boost = this.config.torque_boost;
            let channel = this.link()?;
            let home = |c: &mut Channel<S>| {
                c.with_timeout(timeout, |c| c.execute(commands::INITIALIZE_MOTORS))
            };
            if boost {
                speed::with_boosted_torque(channel, home)?;
            } else {
                home(channel)?;
            }
            this.state.motors_initialized = true;
            // Homing may have moved the turret.
            this.forget_grating();
            info!("motors initialized");
            Ok(())
        })
    }

    /// Current wavelength in nm.
    pub fn get_wavelength_position(&mut self) -> Result<f64, S::Error> {
        self.track(|this| {
            this.link()?;
            let factor = this.base_factor()?;
            let raw = this.link()?.query_number(commands::GET_WAVELENGTH)?;
            Ok(this.calibration.raw_to_wavelength(raw, factor))
        })
    }

    /// Tell the instrument it currently sits at `nm`, without moving.
    pub fn set_wavelength_position(&mut self, nm: f64) -> Result<(), S::Error> {
        self.track(|this| {
            this.link()?;
            let raw = this.wavelength_to_raw(nm)?;
            let command = commands::set_wavelength::<S::Error>(raw)?;
            this.link()?.execute(&command)
        })
    }

    /// Drive to `nm`. Returns once the move is acknowledged; see [`Self::wait_until_idle`].
    pub fn move_to(&mut self, nm: f64) -> Result<(), S::Error> {
        self.track(|this| {
            this.require_initialized()?;
            let raw = this.wavelength_to_raw(nm)?;
            let command = commands::move_to_wavelength::<S::Error>(raw)?;
            this.link()?.execute(&command)
        })
    }

    /// Record which grating is in use, without talking to the instrument.
    pub fn set_grating_index(&mut self, index: GratingIndex) {
        self.state.grating_index = Some(index);
        self.state.grating_base_factor = Some(
            self.calibration
                .grating_base_factor(index.spec().groove_density),
        );
    }

    /// Grating in use, asking the instrument if it is not known yet.
    pub fn get_grating_index(&mut self) -> Result<GratingIndex, S::Error> {
        self.track(|this| this.grating_index())
    }

    /// Rotate the turret to `target` and wait for it to stop.
    pub fn move_grating_index(&mut self, target: GratingIndex) -> Result<(), S::Error> {
        self.track(|this| {
            this.require_initialized()?;
            // Cached only once the turret has actually arrived.
            let current = this.read_grating_index()?;
            if current == target {
                debug!("grating {target:?} already in place");
                return Ok(());
            }

            let command = commands::set_turret_index::<S::Error>(target)?;
            let policy = this.config.grating_wait.clone();
            let boost = this.config.torque_boost;
            let channel = this.link()?;
            let rotate = |c: &mut Channel<S>| {
                c.execute(&command)?;
                wait_idle(c, &policy)
            };
            if boost {
                speed::with_boosted_torque(channel, rotate)?;
            } else {
                rotate(channel)?;
            }

            this.set_grating_index(target);
            info!("grating {current:?} -> {target:?}");
            Ok(())
        })
    }

    /// Override the grating base factor with that of a `groove_density` grating (grooves/mm).
    pub fn set_grating_base_factor(&mut self, groove_density: f64) -> Result<(), S::Error> {
        self.track(|this| {
            let density = this.calibration.check_groove_density(groove_density)?;
            this.state.grating_base_factor = Some(this.calibration.grating_base_factor(density));
            Ok(())
        })
    }

    /// Grating base factor, derived from the grating in use on first call.
    pub fn get_grating_base_factor(&mut self) -> Result<f64, S::Error> {
        self.track(|this| this.base_factor())
    }

    /// Set the grating motor speed profile. Validated before anything is sent.
    pub fn set_motor_speed(&mut self, profile: MotorSpeed) -> Result<(), S::Error> {
        self.track(|this| speed::set_grating_speed(this.link()?, profile))
    }

    /// Get the grating motor speed profile.
    pub fn get_motor_speed(&mut self) -> Result<MotorSpeed, S::Error> {
        self.track(|this| speed::get_grating_speed(this.link()?))
    }

    /// Set the drive frequency of a slit motor, in Hz.
    pub fn set_slit_motor_speed(&mut self, slit: Slit, hz: u32) -> Result<(), S::Error> {
        self.track(|this| {
            this.link()?;
            let hz = check_slit_speed(hz)?;
            let command = commands::set_slit_speed::<S::Error>(slit, hz)?;
            this.link()?.execute(&command)
        })
    }

    /// Get the drive frequency of a slit motor, in Hz.
    pub fn get_slit_motor_speed(&mut self, slit: Slit) -> Result<u32, S::Error> {
        self.track(|this| {
            let command = commands::get_slit_speed::<S::Error>(slit)?;
            let hz = this.link()?.query_number(&command)?;
            if hz >= 0.0 && hz <= u32::MAX as f64 && hz.fract() == 0.0 {
                Ok(hz as u32)
            } else {
                Err(Error::InvalidResponse)
            }
        })
    }

    /// Slit width in mm, to 2 decimal places.
    pub fn get_slit_width(&mut self, slit: Slit) -> Result<f64, S::Error> {
        self.track(|this| {
            let steps = this.slit_steps(slit)?;
            Ok(SLIT_GEOMETRY.steps_to_width(steps))
        })
    }

    /// Drive a slit to an absolute width in mm.
    pub fn set_slit_width(
        &mut self,
        slit: Slit,
        width: impl Into<SlitTarget>,
    ) -> Result<(), S::Error> {
        let width = width.into();
        self.track(|this| {
            this.require_initialized()?;
            let width_mm = SLIT_GEOMETRY.width_target(width)?;
            this.set_slit_width_mm(slit, width_mm)
        })
    }

    /// Open or close a slit by the difference to its current width, then wait for it to stop.
    pub fn move_slit_width(
        &mut self,
        slit: Slit,
        width: impl Into<SlitTarget>,
    ) -> Result<(), S::Error> {
        let width = width.into();
        self.track(|this| {
            this.require_initialized()?;
            let target_mm = SLIT_GEOMETRY.width_target(width)?;
            let current_mm = SLIT_GEOMETRY.steps_to_width(this.slit_steps(slit)?);
            let delta = SLIT_GEOMETRY.width_to_steps(target_mm - current_mm);
            if delta == 0 {
                debug!("slit {slit:?} already at {current_mm} mm");
                return Ok(());
            }

            let command = commands::move_slit_relative::<S::Error>(slit, delta)?;
            let policy = this.config.slit_wait.clone();
            let channel = this.link()?;
            channel.execute(&command)?;
            wait_idle(channel, &policy)
        })
    }

    /// Drive a slit to the width passing `bandwidth` nm.
    pub fn set_slit_bandwidth(
        &mut self,
        slit: Slit,
        bandwidth: impl Into<SlitTarget>,
    ) -> Result<(), S::Error> {
        let bandwidth = bandwidth.into();
        self.track(|this| {
            this.require_initialized()?;
            let width_mm = this
                .calibration
                .bandwidth_target_to_width(bandwidth, &SLIT_GEOMETRY)?;
            this.set_slit_width_mm(slit, width_mm)
        })
    }

    /// Bandwidth in nm passed by a slit.
    pub fn get_slit_bandwidth(&mut self, slit: Slit) -> Result<f64, S::Error> {
        self.track(|this| {
            let width_mm = SLIT_GEOMETRY.steps_to_width(this.slit_steps(slit)?);
            Ok(this.calibration.width_to_bandwidth(width_mm))
        })
    }

    /// Switch the entrance mirror to the side port.
    pub fn entrance_mirror_side(&mut self) -> Result<(), S::Error> {
        self.settled_motion(commands::ENTRANCE_MIRROR_SIDE)
    }

    /// Switch the entrance mirror to the front port.
    pub fn entrance_mirror_front(&mut self) -> Result<(), S::Error> {
        self.settled_motion(commands::ENTRANCE_MIRROR_FRONT)
    }

    /// Switch the exit mirror to the side port.
    pub fn exit_mirror_side(&mut self) -> Result<(), S::Error> {
        self.settled_motion(commands::EXIT_MIRROR_SIDE)
    }

    /// Switch the exit mirror to the front port.
    pub fn exit_mirror_front(&mut self) -> Result<(), S::Error> {
        self.settled_motion(commands::EXIT_MIRROR_FRONT)
    }

    /// Open the shutter.
    pub fn open_shutter(&mut self) -> Result<(), S::Error> {
        self.settled(commands::OPEN_SHUTTER)
    }

    /// Close the shutter.
    pub fn close_shutter(&mut self) -> Result<(), S::Error> {
        self.settled(commands::CLOSE_SHUTTER)
    }

    /// Ask whether any motor is still moving (`E`).
    pub fn motor_status(&mut self) -> Result<MotorStatus, S::Error> {
        self.track(|this| motor_status(this.link()?))
    }

    /// Ask whether the turret is still moving (`Z453`).
    pub fn index_device_status(&mut self) -> Result<MotorStatus, S::Error> {
        self.track(|this| {
            let status = this.link()?.query_byte(commands::INDEX_DEVICE_STATUS)?;
            Ok(MotorStatus::from_byte(status))
        })
    }

    /// Block until all motors stop, e.g. after [`Self::move_to`].
    pub fn wait_until_idle(&mut self, policy: &WaitPolicy) -> Result<(), S::Error> {
        self.track(|this| wait_idle(this.link()?, policy))
    }

    fn track<T>(
        &mut self,
        op: impl FnOnce(&mut Self) -> Result<T, S::Error>,
    ) -> Result<T, S::Error> {
        let before = self.state.clone();
        let result = op(self);
        if let Err(e) = &result {
            // Anything learnt on the way is dropped, only the error flag changes.
            self.state = DeviceState {
                last_error: Some(e.kind()),
                ..before
            };
        }
        result
    }

    fn link(&mut self) -> Result<&mut Channel<S>, S::Error> {
        self.channel.as_mut().ok_or(Error::NotConnected)
    }

    fn require_initialized(&self) -> Result<(), S::Error> {
        if self.channel.is_none() {
            Err(Error::NotConnected)
        } else if !self.state.motors_initialized {
            Err(Error::NotInitialized)
        } else {
            Ok(())
        }
    }

    fn forget_grating(&mut self) {
        self.state.grating_index = None;
        self.state.grating_base_factor = None;
    }

    /// Cached index, or the turret's answer without caching it.
    fn read_grating_index(&mut self) -> Result<GratingIndex, S::Error> {
        if let Some(index) = self.state.grating_index {
            return Ok(index);
        }
        let raw = self.link()?.query_number(commands::READ_TURRET_INDEX)?;
        if raw.fract() == 0.0 && (0.0..=u8::MAX as f64).contains(&raw) {
            GratingIndex::try_from(raw as u8).map_err(|_| Error::InvalidResponse)
        } else {
            Err(Error::InvalidResponse)
        }
    }

    fn grating_index(&mut self) -> Result<GratingIndex, S::Error> {
        let index = self.read_grating_index()?;
        self.state.grating_index = Some(index);
        Ok(index)
    }

    fn base_factor(&mut self) -> Result<f64, S::Error> {
        if let Some(factor) = self.state.grating_base_factor {
            return Ok(factor);
        }
        let index = self.grating_index()?;
        let factor = self
            .calibration
            .grating_base_factor(index.spec().groove_density);
        self.state.grating_base_factor = Some(factor);
        Ok(factor)
    }

    fn wavelength_to_raw(&mut self, nm: f64) -> Result<f64, S::Error> {
        let factor = self.base_factor()?;
        let nm = self.calibration.check_wavelength(nm, factor)?;
        Ok(self.calibration.wavelength_to_raw(nm, factor))
    }

    fn slit_steps(&mut self, slit: Slit) -> Result<i32, S::Error> {
        let command = commands::read_slit_position::<S::Error>(slit)?;
        let steps = self.link()?.query_number(&command)?;
        if steps.fract() == 0.0 && steps >= i32::MIN as f64 && steps <= i32::MAX as f64 {
            Ok(steps as i32)
        } else {
            Err(Error::InvalidResponse)
        }
    }

    fn set_slit_width_mm(&mut self, slit: Slit, width_mm: f64) -> Result<(), S::Error> {
        let steps = SLIT_GEOMETRY.width_to_steps(width_mm);
        let command = commands::set_slit_position::<S::Error>(slit, steps)?;
        self.link()?.execute(&command)
    }

    fn settled_motion(&mut self, command: &'static str) -> Result<(), S::Error> {
        self.track(|this| {
            this.require_initialized()?;
            let settle = this.config.settle_time;
            this.link()?.execute_settled(command, settle)
        })
    }

    fn settled(&mut self, command: &'static str) -> Result<(), S::Error> {
        self.track(|this| {
            let settle = this.config.settle_time;
            this.link()?.execute_settled(command, settle)
        })
    }
}

fn motor_status<S: Transport>(channel: &mut Channel<S>) -> Result<MotorStatus, S::Error> {
    let status = channel.query_byte(commands::MOTOR_BUSY_STATUS)?;
    Ok(MotorStatus::from_byte(status))
}

/// Poll `E` until the motors report idle, the policy times out, or it is cancelled.
fn wait_idle<S: Transport>(channel: &mut Channel<S>, policy: &WaitPolicy) -> Result<(), S::Error> {
    let step = policy.interval.to_millis().max(1);
    let limit = policy.timeout.to_millis();
    let mut waited: u32 = 0;
    loop {
        if motor_status(channel)? == MotorStatus::Idle {
            debug!("motors idle after {waited} ms");
            return Ok(());
        }
        if policy.is_cancelled() {
            warn!("wait for motors cancelled after {waited} ms");
            return Err(Error::Cancelled);
        }
        if waited >= limit {
            warn!("motors still busy after {waited} ms");
            return Err(Error::Timeout { waited_ms: waited });
        }
        channel.pause(MillisDurationU32::millis(step));
        waited = waited.saturating_add(step);
    }
}
