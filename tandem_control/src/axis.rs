//! Per-axis runtime state.
//!
//! Owned exclusively by the control loop thread; the outside world sees
//! only the published snapshots. Created before OP entry, never
//! reallocated.

use tandem_common::config::AxisConfig;
use tandem_common::units::AxisKind;

use crate::trajectory::Segment;

/// Mutable runtime state of one axis.
#[derive(Debug, Clone)]
pub struct AxisState {
    /// Mechanical axis kind (selects mm-per-rev).
    pub kind: AxisKind,
    /// Profile velocity used for trajectory durations [RPM].
    pub velocity_rpm: u32,
    /// Profile acceleration for the init SDO [RPM/s].
    pub accel_rpm_s: Option<u32>,
    /// Profile deceleration for the init SDO [RPM/s].
    pub decel_rpm_s: Option<u32>,
    /// Driver-scale pulse value representing the user's 0 mm.
    pub offset_pulse: i64,
    /// Most recently commanded absolute target [driver pulses].
    pub target_pulse: i64,
    /// Most recently decoded actual position [driver pulses].
    pub actual_pulse: i64,
    /// Statusword decoded this cycle.
    pub statusword: u16,
    /// Previous statusword, for change-detection logging.
    pub last_status: u16,
    /// Controlword emitted last cycle.
    pub last_controlword: u16,
    /// Active motion segment, if any.
    pub trajectory: Option<Segment>,
}

impl AxisState {
    /// Build runtime state from an axis configuration.
    pub fn from_config(config: &AxisConfig) -> Self {
        Self {
            kind: config.kind,
            velocity_rpm: config.velocity_rpm,
            accel_rpm_s: config.accel_rpm_s,
            decel_rpm_s: config.effective_decel(),
            offset_pulse: 0,
            target_pulse: 0,
            actual_pulse: 0,
            statusword: 0,
            last_status: 0,
            last_controlword: 0,
            trajectory: None,
        }
    }

    /// Whether a trajectory is active.
    #[inline]
    pub fn is_moving(&self) -> bool {
        self.trajectory.is_some()
    }

    /// Offset-relative measured position [driver pulses].
    #[inline]
    pub const fn rel_pulse(&self) -> i64 {
        self.actual_pulse - self.offset_pulse
    }

    /// Cancel any trajectory and pin the target to the measured position.
    #[inline]
    pub fn freeze(&mut self) {
        self.trajectory = None;
        self.target_pulse = self.actual_pulse;
    }
}
