//! Cross-coupling correction stage.
//!
//! Between trajectory evaluation and PDO encode, each axis's interpolated
//! target is corrected toward the pack: an axis running ahead of the mean
//! offset-relative position is pulled back by `gain × deviation`. The
//! stage only activates while every axis is in coordinated motion and no
//! fault or sync trip is latched; outside that window the targets pass
//! through untouched.

use tracing::{debug, warn};

use tandem_common::config::CouplingConfig;

use crate::axis::AxisState;

/// Gain above which convergence is no longer guaranteed.
const GAIN_STABILITY_LIMIT: f64 = 0.5;

/// Runtime-tunable cross-coupling stage.
#[derive(Debug)]
pub struct CrossCoupling {
    enabled: bool,
    gain: f64,
}

impl CrossCoupling {
    pub fn new(config: &CouplingConfig) -> Self {
        Self {
            enabled: config.enabled,
            gain: config.gain.clamp(0.0, 1.0),
        }
    }

    #[inline]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[inline]
    pub const fn gain(&self) -> f64 {
        self.gain
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        debug!(enabled, "cross coupling toggled");
    }

    /// Set the gain, clamped to 0.0–1.0.
    pub fn set_gain(&mut self, gain: f64) {
        let clamped = gain.clamp(0.0, 1.0);
        if clamped > GAIN_STABILITY_LIMIT {
            warn!(gain = clamped, "coupling gain above stability limit");
        }
        self.gain = clamped;
    }

    /// Apply the correction to this cycle's interpolated targets.
    ///
    /// No-op unless enabled, at least two axes exist, and every axis has
    /// an active trajectory.
    pub fn apply(&self, axes: &mut [AxisState]) {
        if !self.enabled || self.gain == 0.0 || axes.len() < 2 {
            return;
        }
        if !axes.iter().all(AxisState::is_moving) {
            return;
        }

        let mean = axes.iter().map(AxisState::rel_pulse).sum::<i64>() as f64
            / axes.len() as f64;
        for axis in axes.iter_mut() {
            let deviation = axis.rel_pulse() as f64 - mean;
            let correction = (self.gain * deviation).round() as i64;
            axis.target_pulse -= correction;
        }
    }
}
