//! Per-axis S-curve trajectory segments.
//!
//! A segment interpolates from a start to an end pulse over a fixed
//! duration with half-cosine smoothing: zero velocity and symmetric
//! acceleration at both endpoints, C¹-continuous in between.
//!
//! Completion is position based, not time based: accumulated cycle latency
//! would drift time-based finish instants apart across axes, while the
//! measured position converging into the completion window keeps
//! coordinated moves honest.

use std::f64::consts::PI;
use std::time::Instant;

use tandem_common::consts::{COMPLETION_WINDOW_PULSES, MIN_SEGMENT_DURATION_S};
use tandem_common::units::rpm_to_driver_pulses_per_s;

/// One installed motion segment on the driver pulse scale.
#[derive(Debug, Clone, Copy)]
pub struct Segment {
    /// Measured position when the segment was installed.
    pub start_pulse: i64,
    /// Absolute target position.
    pub end_pulse: i64,
    /// Total duration [s], ≥ the 0.1 s floor.
    pub duration_s: f64,
    /// Common batch start instant.
    pub start_time: Instant,
}

impl Segment {
    /// Create a segment, clamping the duration to the floor.
    pub fn new(start_pulse: i64, end_pulse: i64, duration_s: f64, start_time: Instant) -> Self {
        Self {
            start_pulse,
            end_pulse,
            duration_s: duration_s.max(MIN_SEGMENT_DURATION_S),
            start_time,
        }
    }

    /// Interpolated target at `now`, rounded to whole pulses.
    pub fn target_at(&self, now: Instant) -> i64 {
        let elapsed = now.saturating_duration_since(self.start_time).as_secs_f64();
        let progress = (elapsed / self.duration_s).min(1.0);
        let s = smooth(progress);
        let span = (self.end_pulse - self.start_pulse) as f64;
        self.start_pulse + (span * s).round() as i64
    }

    /// Whether the measured position has converged into the completion
    /// window around the endpoint.
    #[inline]
    pub fn is_complete(&self, actual_pulse: i64) -> bool {
        (self.end_pulse - actual_pulse).abs() < COMPLETION_WINDOW_PULSES
    }
}

/// Half-cosine smoothing: `s(p) = (1 − cos(π·p)) / 2` on `[0, 1]`.
#[inline]
pub fn smooth(progress: f64) -> f64 {
    (1.0 - (PI * progress).cos()) / 2.0
}

/// Segment duration [s] for a distance at the configured profile velocity,
/// before the common-duration tie-break and the floor.
pub fn duration_for(distance_pulses: i64, velocity_rpm: u32) -> f64 {
    let velocity = rpm_to_driver_pulses_per_s(velocity_rpm);
    if velocity <= 0.0 {
        return MIN_SEGMENT_DURATION_S;
    }
    distance_pulses.unsigned_abs() as f64 / velocity
}
