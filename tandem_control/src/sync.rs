//! Multi-axis move synchronization.
//!
//! All `MoveToMm` commands drained in one cycle form a batch. Every
//! segment in the batch shares one start instant and one duration (the
//! longest individual duration), so the axes depart and arrive together;
//! shorter distances simply run at proportionally lower peak velocity.

use std::time::Instant;

use tracing::{info, warn};

use tandem_common::consts::MIN_SEGMENT_DURATION_S;
use tandem_common::units::mm_to_pulses;

use crate::axis::AxisState;
use crate::trajectory::{duration_for, Segment};

/// A move collected from the command channel, awaiting installation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingMove {
    /// Slave index.
    pub axis: usize,
    /// Absolute target relative to the axis origin [mm].
    pub target_mm: f64,
}

/// Install one cycle's batch of moves as synchronized segments.
///
/// Existing segments on affected axes are discarded first. When `inhibited`
/// is set (fault or sync trip latched) the whole batch is dropped with a
/// warning and nothing is installed. Returns the number of installed
/// segments.
pub fn install_batch(axes: &mut [AxisState], moves: &[PendingMove], inhibited: bool) -> usize {
    if moves.is_empty() {
        return 0;
    }
    if inhibited {
        warn!(count = moves.len(), "motion inhibited, dropping move batch");
        return 0;
    }

    // One start instant for the whole batch.
    let common_start = Instant::now();

    // First pass: absolute targets and individual durations.
    let mut common_duration = MIN_SEGMENT_DURATION_S;
    for mv in moves {
        let Some(axis) = axes.get(mv.axis) else {
            warn!(axis = mv.axis, "move for unknown axis ignored");
            continue;
        };
        let rel = mm_to_pulses(mv.target_mm, axis.kind);
        let abs = rel + axis.offset_pulse;
        let distance = abs - axis.actual_pulse;
        common_duration = common_duration.max(duration_for(distance, axis.velocity_rpm));
    }

    // Second pass: install with the common duration and start.
    let mut installed = 0;
    for mv in moves {
        let Some(axis) = axes.get_mut(mv.axis) else {
            continue;
        };
        if axis.trajectory.is_some() {
            warn!(axis = mv.axis, "replacing active trajectory");
            axis.trajectory = None;
        }
        let rel = mm_to_pulses(mv.target_mm, axis.kind);
        let end = rel + axis.offset_pulse;
        let start = axis.actual_pulse;
        axis.trajectory = Some(Segment::new(start, end, common_duration, common_start));
        info!(
            axis = mv.axis,
            target_mm = mv.target_mm,
            start,
            end,
            duration_s = common_duration,
            "trajectory installed"
        );
        installed += 1;
    }
    installed
}
