//! Adjacent-axis sync-deviation guard.
//!
//! Runs before the fault supervisor each cycle. While any axis is moving,
//! the offset-relative positions of adjacent slaves are compared; a
//! deviation above the configured threshold that persists for the
//! configured number of consecutive cycles trips a full freeze. The trip
//! latches until an explicit reset (`ResetSyncError` or `SetOrigin`).

use tracing::warn;

use tandem_common::config::SyncGuardConfig;
use tandem_common::units::{mm_to_pulses, AxisKind};

use crate::axis::AxisState;

/// Position-difference emergency stop across coupled axes.
#[derive(Debug)]
pub struct SyncGuard {
    /// Whether monitoring is enabled at all.
    enabled: bool,
    /// Trip threshold [driver pulses].
    threshold_pulse: i64,
    /// Consecutive over-threshold cycles required to trip.
    trip_cycles: u32,
    /// Consecutive over-threshold cycles observed.
    over_cycles: u32,
    /// Latched trip flag.
    tripped: bool,
}

impl SyncGuard {
    /// Build from config. The mm threshold converts on the Z-axis scale,
    /// matching the coupled-pair mechanics it protects.
    pub fn new(config: &SyncGuardConfig) -> Self {
        Self {
            enabled: config.enabled,
            threshold_pulse: mm_to_pulses(config.max_error_mm, AxisKind::Z),
            trip_cycles: config.trip_cycles,
            over_cycles: 0,
            tripped: false,
        }
    }

    /// Whether a trip is latched.
    #[inline]
    pub const fn is_tripped(&self) -> bool {
        self.tripped
    }

    /// Clear the latch after the operator has resolved the deviation.
    pub fn reset(&mut self) {
        self.tripped = false;
        self.over_cycles = 0;
    }

    /// Evaluate this cycle's positions. Returns true on the cycle the
    /// guard trips (all axes are frozen before returning).
    pub fn check(&mut self, axes: &mut [AxisState]) -> bool {
        if !self.enabled || self.tripped || axes.len() < 2 {
            return false;
        }
        if !axes.iter().any(AxisState::is_moving) {
            self.over_cycles = 0;
            return false;
        }

        let mut worst = 0i64;
        let mut worst_pair = 0usize;
        for i in 0..axes.len() - 1 {
            let diff = (axes[i].rel_pulse() - axes[i + 1].rel_pulse()).abs();
            if diff > worst {
                worst = diff;
                worst_pair = i;
            }
        }

        if worst > self.threshold_pulse {
            self.over_cycles += 1;
        } else {
            self.over_cycles = 0;
            return false;
        }

        if self.over_cycles < self.trip_cycles {
            return false;
        }

        self.tripped = true;
        warn!(
            pair = worst_pair,
            deviation_pulse = worst,
            threshold_pulse = self.threshold_pulse,
            "sync deviation trip, freezing all axes"
        );
        for axis in axes.iter_mut() {
            axis.freeze();
        }
        true
    }
}
