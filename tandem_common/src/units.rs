//! mm ↔ pulse conversions on the driver scale.
//!
//! All on-wire positions use the driver scale (encoder pulses × position
//! factor 2). Conversions between user millimetres and driver pulses go
//! through the axis leadscrew feed; the motor-scale helper exists only for
//! the profile SDOs, which the drive expects at encoder scale.

use serde::{Deserialize, Serialize};

use crate::consts::{PULSES_PER_REV, PULSES_PER_REV_DRIVER, X_MM_PER_REV, Z_MM_PER_REV};

/// Mechanical axis kind, selecting the leadscrew feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AxisKind {
    /// Cross slide.
    #[default]
    X,
    /// Longitudinal feed.
    Z,
}

impl AxisKind {
    /// Leadscrew feed [mm/rev].
    #[inline]
    pub const fn mm_per_rev(self) -> f64 {
        match self {
            Self::X => X_MM_PER_REV,
            Self::Z => Z_MM_PER_REV,
        }
    }
}

/// Convert millimetres to driver-scale pulses (rounded).
#[inline]
pub fn mm_to_pulses(mm: f64, kind: AxisKind) -> i64 {
    let revolutions = mm / kind.mm_per_rev();
    (revolutions * PULSES_PER_REV_DRIVER as f64).round() as i64
}

/// Convert driver-scale pulses to millimetres.
#[inline]
pub fn pulses_to_mm(pulses: i64, kind: AxisKind) -> f64 {
    let revolutions = pulses as f64 / PULSES_PER_REV_DRIVER as f64;
    revolutions * kind.mm_per_rev()
}

/// Trajectory velocity [driver pulses/s] for a profile velocity in RPM.
#[inline]
pub fn rpm_to_driver_pulses_per_s(rpm: u32) -> f64 {
    rpm as f64 / 60.0 * PULSES_PER_REV_DRIVER as f64
}

/// Profile SDO velocity [encoder pulses/s] for a value in RPM.
///
/// 0x6081/0x6083/0x6084 take encoder scale, not driver scale.
#[inline]
pub fn rpm_to_motor_pulses_per_s(rpm: u32) -> u32 {
    (rpm as f64 / 60.0 * PULSES_PER_REV as f64) as u32
}

/// Clamp a driver-scale position to the on-wire `i32` range.
#[inline]
pub fn clamp_to_wire(pulses: i64) -> i32 {
    pulses.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}
