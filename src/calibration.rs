//! Calibration constants for the supported instrument models.
//!
//! Each model has its own dispersion and wavelength limits. The grating turret, slit mechanics
//! and motor speed limits are shared by the whole protocol family.

use strum::EnumCount;
use strum_macros::{Display, EnumIter, EnumString};

use crate::types::{GratingIndex, MotorSpeed};

/// Instrument models known to this driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, EnumString, Display)]
pub enum DeviceModel {
    #[strum(serialize = "iHR320")]
    Ihr320,
    #[strum(serialize = "iHR550")]
    Ihr550,
}

/// Immutable per-model calibration record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelCalibration {
    /// Bandwidth per millimeter of slit aperture, in nm/mm, at the base grating.
    pub spectral_dispersion: f64,
    /// Lowest reachable wavelength in nm at the base grating.
    pub min_wavelength_nm: f64,
    /// Highest reachable wavelength in nm at the base grating.
    pub max_wavelength_nm: f64,
    /// Groove density the wavelength drive is calibrated against, in grooves/mm.
    pub base_groove_density: f64,
}

impl DeviceModel {
    /// Calibration constants for this model.
    pub const fn calibration(&self) -> ModelCalibration {
        match self {
            DeviceModel::Ihr320 => ModelCalibration {
                spectral_dispersion: 2.31,
                min_wavelength_nm: 0.0,
                max_wavelength_nm: 1500.0,
                base_groove_density: BASE_GROOVE_DENSITY,
            },
            DeviceModel::Ihr550 => ModelCalibration {
                spectral_dispersion: 1.34,
                min_wavelength_nm: 0.0,
                max_wavelength_nm: 1500.0,
                base_groove_density: BASE_GROOVE_DENSITY,
            },
        }
    }
}

pub const BASE_GROOVE_DENSITY: f64 = 1200.0;

/// One grating on the turret.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GratingSpec {
    /// Groove density in grooves/mm.
    pub groove_density: f64,
    /// Rough wavelength calibration offset in nm.
    pub offset_nm: f64,
}

/// Gratings fitted to turret positions 0, 1 and 2.
pub const GRATING_TABLE: [GratingSpec; GratingIndex::COUNT] = [
    GratingSpec {
        groove_density: 1200.0,
        offset_nm: 0.0,
    },
    GratingSpec {
        groove_density: 600.0,
        offset_nm: 0.0,
    },
    GratingSpec {
        groove_density: 150.0,
        offset_nm: 0.0,
    },
];

impl GratingIndex {
    pub const fn spec(self) -> GratingSpec {
        GRATING_TABLE[self as usize]
    }
}

/// Groove densities accepted by
/// [`Monochromator::set_grating_base_factor`](crate::Monochromator::set_grating_base_factor).
pub const MIN_GROOVE_DENSITY: f64 = 60.0;
pub const MAX_GROOVE_DENSITY: f64 = 3600.0;

/// Slit mechanics, identical for all four slits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlitGeometry {
    /// Widest aperture in mm.
    pub max_aperture_mm: f64,
    /// Motor steps per mm of aperture.
    pub steps_per_mm: f64,
    /// Mechanical backlash in motor steps. Not compensated for by any operation.
    pub backlash_steps: u32,
}

pub const SLIT_GEOMETRY: SlitGeometry = SlitGeometry {
    max_aperture_mm: 7.0,
    steps_per_mm: 482.14,
    backlash_steps: 100,
};

/// Inclusive bounds for a motor speed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub min: u32,
    pub max: u32,
}

impl Bounds {
    pub const fn contains(&self, value: u32) -> bool {
        value >= self.min && value <= self.max
    }
}

pub const GRATING_FREQUENCY_HZ: Bounds = Bounds {
    min: 100,
    max: 80_000,
};
pub const GRATING_RISE_TIME_MS: Bounds = Bounds {
    min: 100,
    max: 65_535,
};
pub const SLIT_FREQUENCY_HZ: Bounds = Bounds {
    min: 10,
    max: 10_000,
};

/// Slow profile applied to the grating motor while the turret rotates.
pub const TORQUE_BOOST_SPEED: MotorSpeed = MotorSpeed::new(200, 2_000, 400);
