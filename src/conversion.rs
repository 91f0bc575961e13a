//! Conversions between physical quantities and raw device units.
//!
//! The wavelength drive counts in units of the base grating, so every wavelength is scaled by
//! the grating base factor (selected grating density / base density). Slit motors count steps.

use crate::{
    calibration::{
        Bounds, GRATING_FREQUENCY_HZ, GRATING_RISE_TIME_MS, MAX_GROOVE_DENSITY,
        MIN_GROOVE_DENSITY, ModelCalibration, SLIT_FREQUENCY_HZ, SlitGeometry,
    },
    error::Error,
    types::{MotorSpeed, SlitTarget},
};

/// A value rejected before anything is sent to the instrument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeViolation {
    pub quantity: &'static str,
    pub value: f64,
    pub min: f64,
    pub max: f64,
}

impl<I: embedded_io::Error> From<RangeViolation> for Error<I> {
    fn from(v: RangeViolation) -> Self {
        Error::OutOfRange {
            quantity: v.quantity,
            value: v.value,
            min: v.min,
            max: v.max,
        }
    }
}

fn check_inclusive(
    quantity: &'static str,
    value: f64,
    min: f64,
    max: f64,
) -> Result<f64, RangeViolation> {
    // NaN fails both comparisons and is rejected too.
    if value >= min && value <= max {
        Ok(value)
    } else {
        Err(RangeViolation {
            quantity,
            value,
            min,
            max,
        })
    }
}

fn check_bounds(quantity: &'static str, value: u32, bounds: Bounds) -> Result<u32, RangeViolation> {
    if bounds.contains(value) {
        Ok(value)
    } else {
        Err(RangeViolation {
            quantity,
            value: value as f64,
            min: bounds.min as f64,
            max: bounds.max as f64,
        })
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

impl ModelCalibration {
    /// Ratio of `groove_density` to the base grating density.
    #[inline]
    pub fn grating_base_factor(&self, groove_density: f64) -> f64 {
        groove_density / self.base_groove_density
    }

    /// Check a groove density before deriving a base factor from it.
    pub fn check_groove_density(&self, groove_density: f64) -> Result<f64, RangeViolation> {
        check_inclusive(
            "groove density",
            groove_density,
            MIN_GROOVE_DENSITY,
            MAX_GROOVE_DENSITY,
        )
    }

    /// Reachable wavelengths in nm with the given base factor.
    pub fn wavelength_limits(&self, factor: f64) -> (f64, f64) {
        (
            self.min_wavelength_nm / factor,
            self.max_wavelength_nm / factor,
        )
    }

    /// Reject a wavelength outside the drive's range for the selected grating.
    pub fn check_wavelength(&self, nm: f64, factor: f64) -> Result<f64, RangeViolation> {
        let (min, max) = self.wavelength_limits(factor);
        check_inclusive("wavelength", nm, min, max)
    }

    /// Convert nm to raw wavelength counts, rounded to 4 decimal places.
    #[inline]
    pub fn wavelength_to_raw(&self, nm: f64, factor: f64) -> f64 {
        round_to(nm * factor, 4)
    }

    /// Convert raw wavelength counts back to nm.
    #[inline]
    pub fn raw_to_wavelength(&self, raw: f64, factor: f64) -> f64 {
        raw / factor
    }

    /// Slit width in mm passing `bandwidth_nm`.
    #[inline]
    pub fn bandwidth_to_width(&self, bandwidth_nm: f64) -> f64 {
        bandwidth_nm / self.spectral_dispersion
    }

    /// Bandwidth in nm passed by a slit `width_mm` wide.
    #[inline]
    pub fn width_to_bandwidth(&self, width_mm: f64) -> f64 {
        width_mm * self.spectral_dispersion
    }

    /// Resolve and validate a bandwidth request into a slit width in mm.
    pub fn bandwidth_target_to_width(
        &self,
        target: SlitTarget,
        geometry: &SlitGeometry,
    ) -> Result<f64, RangeViolation> {
        let max_bandwidth = self.width_to_bandwidth(geometry.max_aperture_mm);
        let bandwidth = match target {
            SlitTarget::Max => max_bandwidth,
            SlitTarget::Value(nm) => check_inclusive("slit bandwidth", nm, 0.0, max_bandwidth)?,
        };
        Ok(self.bandwidth_to_width(bandwidth).min(geometry.max_aperture_mm))
    }
}

impl SlitGeometry {
    /// Convert a width in mm to motor steps.
    #[inline]
    pub fn width_to_steps(&self, width_mm: f64) -> i32 {
        (width_mm * self.steps_per_mm).round() as i32
    }

    /// Convert motor steps to a width in mm, rounded to 2 decimal places.
    #[inline]
    pub fn steps_to_width(&self, steps: i32) -> f64 {
        round_to(steps as f64 / self.steps_per_mm, 2)
    }

    /// Resolve and validate a width request in mm.
    pub fn width_target(&self, target: SlitTarget) -> Result<f64, RangeViolation> {
        match target {
            SlitTarget::Max => Ok(self.max_aperture_mm),
            SlitTarget::Value(mm) => check_inclusive("slit width", mm, 0.0, self.max_aperture_mm),
        }
    }
}

/// Validate a grating motor speed profile.
pub fn check_grating_speed(speed: MotorSpeed) -> Result<MotorSpeed, RangeViolation> {
    check_bounds("grating min frequency", speed.min_hz, GRATING_FREQUENCY_HZ)?;
    check_bounds("grating max frequency", speed.max_hz, GRATING_FREQUENCY_HZ)?;
    check_bounds("grating rise time", speed.rise_time_ms, GRATING_RISE_TIME_MS)?;
    if speed.min_hz > speed.max_hz {
        return Err(RangeViolation {
            quantity: "grating min frequency",
            value: speed.min_hz as f64,
            min: GRATING_FREQUENCY_HZ.min as f64,
            max: speed.max_hz as f64,
        });
    }
    Ok(speed)
}

/// Validate a slit motor frequency.
pub fn check_slit_speed(hz: u32) -> Result<u32, RangeViolation> {
    check_bounds("slit frequency", hz, SLIT_FREQUENCY_HZ)
}
