//! Drive fault supervision.
//!
//! Scans every statusword after process-data receive. A fault on any one
//! axis freezes all of them in the same cycle: partial stops in
//! coordinated motion leave the mechanics in a worse place than a full
//! freeze. Motion stays inhibited until every fault bit has cleared; the
//! CiA 402 driver meanwhile emits Fault Reset on the faulting axes.

use tracing::{info, warn};

use tandem_common::status::StatusBits;

use crate::axis::AxisState;

/// Cross-axis fault supervisor.
#[derive(Debug, Default)]
pub struct FaultSupervisor {
    active: bool,
}

impl FaultSupervisor {
    pub const fn new() -> Self {
        Self { active: false }
    }

    /// Whether any axis currently reports a fault.
    #[inline]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Scan statuswords and fan out the freeze on a rising fault edge.
    ///
    /// Returns true while any fault is present.
    pub fn scan(&mut self, axes: &mut [AxisState]) -> bool {
        let mut any_fault = false;
        let mut first_faulted = None;
        for (idx, axis) in axes.iter().enumerate() {
            if StatusBits::fault_in(axis.statusword) {
                any_fault = true;
                if first_faulted.is_none() {
                    first_faulted = Some(idx);
                }
            }
        }

        if any_fault && !self.active {
            warn!(
                axis = first_faulted.unwrap_or(0),
                "drive fault detected, freezing all axes"
            );
            for (idx, axis) in axes.iter_mut().enumerate() {
                if axis.trajectory.is_some() {
                    warn!(idx, pinned = axis.actual_pulse, "trajectory cancelled");
                }
                axis.freeze();
            }
        } else if !any_fault && self.active {
            info!("all drive faults cleared, motion re-enabled");
        }

        self.active = any_fault;
        any_fault
    }
}
