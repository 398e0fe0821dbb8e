//! Published axis state.
//!
//! The loop is the only writer; it copies four words per axis under a
//! lock held just for the copy. Readers taking the same lock observe a
//! consistent per-axis tuple. The sync-error flag lives outside the lock
//! as an atomic: scalar reads may be one cycle stale, which is the
//! documented contract for lock-free access.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::axis::AxisState;

/// One published axis tuple.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AxisSnapshot {
    /// Statusword from the last completed cycle.
    pub statusword: u16,
    /// Whether a trajectory was active last cycle.
    pub moving: bool,
    /// Measured position [driver pulses].
    pub actual_pulse: i64,
    /// Origin offset [driver pulses].
    pub offset_pulse: i64,
}

/// Snapshot region shared between the loop and outside observers.
#[derive(Debug)]
pub struct SharedStates {
    slots: Mutex<Vec<AxisSnapshot>>,
    sync_error: AtomicBool,
}

impl SharedStates {
    /// Allocate a zeroed region for `axis_count` axes.
    pub fn new(axis_count: usize) -> Arc<Self> {
        Arc::new(Self {
            slots: Mutex::new(vec![AxisSnapshot::default(); axis_count]),
            sync_error: AtomicBool::new(false),
        })
    }

    /// Publish the cycle's state. Called once per cycle by the loop.
    pub fn publish(&self, axes: &[AxisState]) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        for (slot, axis) in slots.iter_mut().zip(axes) {
            *slot = AxisSnapshot {
                statusword: axis.statusword,
                moving: axis.is_moving(),
                actual_pulse: axis.actual_pulse,
                offset_pulse: axis.offset_pulse,
            };
        }
    }

    /// Consistent snapshot of one axis. `None` for an unknown index.
    pub fn snapshot(&self, axis: usize) -> Option<AxisSnapshot> {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.get(axis).copied()
    }

    /// Number of published axes.
    pub fn axis_count(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.len()
    }

    /// Set or clear the latched sync-error flag.
    #[inline]
    pub fn set_sync_error(&self, tripped: bool) {
        self.sync_error.store(tripped, Ordering::Release);
    }

    /// Lock-free read of the sync-error flag.
    #[inline]
    pub fn sync_error(&self) -> bool {
        self.sync_error.load(Ordering::Acquire)
    }
}
