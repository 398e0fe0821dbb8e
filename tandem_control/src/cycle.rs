//! Deterministic control cycle: commands → sync → receive → guard →
//! fault → trajectory/CiA 402 → coupling → send → publish → sleep.
//!
//! The runner owns the master, all per-axis runtime state and the receive
//! side of the command channel. One `Instant` is captured per cycle and
//! used for every axis's trajectory evaluation, so a batch departs and
//! arrives on a single clock.
//!
//! ## RT setup sequence (`rt` feature)
//!
//! 1. `mlockall(MCL_CURRENT | MCL_FUTURE)` — lock all pages.
//! 2. Prefault stack pages.
//! 3. `sched_setaffinity` — pin to the configured core.
//! 4. `sched_setscheduler(SCHED_FIFO, priority)`.
//!
//! Pacing is absolute-time `clock_nanosleep(TIMER_ABSTIME)` under `rt`,
//! `Instant` + `thread::sleep` otherwise. An overrun is logged and the
//! schedule re-anchored; missed deadlines are never repaid by doubling
//! up.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use tracing::{debug, info, warn};

use tandem_common::command::Command;
use tandem_common::config::BusConfig;
use tandem_common::consts::PDO_FRAME_LEN;
use tandem_common::status::StatusBits;
use tandem_common::units::clamp_to_wire;

use crate::axis::AxisState;
use crate::cia402::DriveState;
use crate::coupling::CrossCoupling;
use crate::error::BusError;
use crate::fault::FaultSupervisor;
use crate::guard::SyncGuard;
use crate::master::EcatMaster;
use crate::pdo;
use crate::shared::SharedStates;
use crate::sync::{install_batch, PendingMove};

// ─── Cycle Statistics ───────────────────────────────────────────────

/// O(1) per-cycle timing statistics, no allocation.
#[derive(Debug, Clone)]
pub struct CycleStats {
    /// Total cycles executed.
    pub cycle_count: u64,
    /// Last cycle duration [µs].
    pub last_cycle_us: u64,
    /// Maximum cycle duration [µs].
    pub max_cycle_us: u64,
    /// Running sum for average computation [µs].
    pub sum_cycle_us: u64,
    /// Deadline overruns observed.
    pub overruns: u64,
}

impl CycleStats {
    pub const fn new() -> Self {
        Self {
            cycle_count: 0,
            last_cycle_us: 0,
            max_cycle_us: 0,
            sum_cycle_us: 0,
            overruns: 0,
        }
    }

    /// Record one cycle against the budget.
    #[inline]
    pub fn record(&mut self, duration: Duration, budget: Duration) {
        let us = duration.as_micros() as u64;
        self.cycle_count += 1;
        self.last_cycle_us = us;
        if us > self.max_cycle_us {
            self.max_cycle_us = us;
        }
        self.sum_cycle_us += us;
        if duration > budget {
            self.overruns += 1;
        }
    }

    /// Average cycle time [µs] (0 before the first cycle).
    #[inline]
    pub fn avg_cycle_us(&self) -> u64 {
        if self.cycle_count == 0 {
            0
        } else {
            self.sum_cycle_us / self.cycle_count
        }
    }
}

impl Default for CycleStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of one executed cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Keep running.
    Continue,
    /// `StopAll` drained; leave the loop and run shutdown.
    StopRequested,
}

// ─── Cycle Runner ───────────────────────────────────────────────────

/// The control loop: sole owner of the master and axis runtime state.
pub struct CycleRunner<M: EcatMaster> {
    pub(crate) master: M,
    pub(crate) config: BusConfig,
    pub(crate) axes: Vec<AxisState>,
    pub(crate) shared: Arc<SharedStates>,
    pub(crate) cycle_time: Duration,
    pub(crate) stats: CycleStats,
    pub(crate) rx: Receiver<Command>,
    fault: FaultSupervisor,
    guard: SyncGuard,
    coupling: CrossCoupling,
    pending_moves: Vec<PendingMove>,
}

impl<M: EcatMaster> CycleRunner<M> {
    /// Pre-allocate a runner. No master I/O happens here.
    pub fn new(
        master: M,
        config: BusConfig,
        rx: Receiver<Command>,
        shared: Arc<SharedStates>,
    ) -> Self {
        let axes: Vec<AxisState> = config.axes.iter().map(AxisState::from_config).collect();
        let cycle_time = Duration::from_millis(config.cycle_time_ms);
        let guard = SyncGuard::new(&config.sync_guard);
        let coupling = CrossCoupling::new(&config.coupling);
        let pending_moves = Vec::with_capacity(axes.len());
        Self {
            master,
            config,
            axes,
            shared,
            cycle_time,
            stats: CycleStats::new(),
            rx,
            fault: FaultSupervisor::new(),
            guard,
            coupling,
            pending_moves,
        }
    }

    /// The master backend (tests and diagnostics).
    pub fn master(&self) -> &M {
        &self.master
    }

    /// Mutable master access (tests: fault injection, position presets).
    pub fn master_mut(&mut self) -> &mut M {
        &mut self.master
    }

    /// Per-axis runtime state (tests and diagnostics).
    pub fn axes(&self) -> &[AxisState] {
        &self.axes
    }

    /// Timing statistics.
    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }

    /// Run the paced loop until `StopAll` or a master failure, then the
    /// shutdown sequence either way.
    pub fn run(&mut self) -> Result<(), BusError> {
        let result = self.cycle_loop();
        if let Err(ref e) = result {
            warn!(error = %e, "cycle loop aborted, entering shutdown");
        }
        self.shutdown();
        result
    }

    /// Execute one control cycle at `now`.
    ///
    /// Exposed so tests and the bench can step the loop on a synthetic
    /// clock; production pacing goes through [`Self::run`].
    pub fn tick(&mut self, now: Instant) -> Result<CycleOutcome, BusError> {
        // 1. Drain the command channel.
        let stop = self.drain_commands();
        if stop {
            self.pending_moves.clear();
            return Ok(CycleOutcome::StopRequested);
        }

        // 2. Install this cycle's batch of moves.
        let inhibited = self.fault.is_active() || self.guard.is_tripped();
        install_batch(&mut self.axes, &self.pending_moves, inhibited);
        self.pending_moves.clear();

        // 3. Receive and decode process data.
        self.master.receive_processdata()?;
        for (idx, axis) in self.axes.iter_mut().enumerate() {
            let Some(tx) = pdo::decode(self.master.inputs(idx)) else {
                warn!(axis = idx, "short input frame, keeping previous state");
                continue;
            };
            axis.statusword = tx.statusword;
            axis.actual_pulse = i64::from(tx.actual_position);
            if axis.last_status != tx.statusword {
                if axis.is_moving() || StatusBits::fault_in(tx.statusword) {
                    debug!(
                        axis = idx,
                        "statusword changed {:#06x} -> {:#06x}",
                        axis.last_status,
                        tx.statusword
                    );
                }
                axis.last_status = tx.statusword;
            }
        }

        // 4. Sync-deviation guard, before the fault supervisor.
        if self.guard.check(&mut self.axes) {
            self.shared.set_sync_error(true);
        }

        // 5. Fault supervisor.
        self.fault.scan(&mut self.axes);

        // 6. Trajectory evaluation and hold pinning, one clock for all axes.
        for (idx, axis) in self.axes.iter_mut().enumerate() {
            let drive = DriveState::from_statusword(axis.statusword);
            match axis.trajectory {
                Some(_) if !drive.permits_motion() => {
                    warn!(axis = idx, ?drive, "drive left Operation Enabled, cancelling trajectory");
                    axis.freeze();
                }
                Some(segment) => {
                    if segment.is_complete(axis.actual_pulse) {
                        axis.target_pulse = segment.end_pulse;
                        axis.trajectory = None;
                        info!(
                            axis = idx,
                            error_pulse = (segment.end_pulse - axis.actual_pulse).abs(),
                            "trajectory complete"
                        );
                    } else {
                        axis.target_pulse = segment.target_at(now);
                    }
                }
                None => {
                    // Hold: the drive tracks the measured position so no
                    // following error accumulates while idle.
                    axis.target_pulse = axis.actual_pulse;
                }
            }
        }

        // 7. Cross-coupling correction on the interpolated targets.
        if !self.fault.is_active() && !self.guard.is_tripped() {
            self.coupling.apply(&mut self.axes);
        }

        // 8. Encode outputs.
        for (idx, axis) in self.axes.iter_mut().enumerate() {
            let cw = DriveState::from_statusword(axis.statusword).controlword();
            let frame = pdo::encode(cw, clamp_to_wire(axis.target_pulse));
            self.master.outputs_mut(idx)[..PDO_FRAME_LEN].copy_from_slice(&frame);
            axis.last_controlword = cw;
        }

        // 9. One send carries every axis's output onto the wire.
        self.master.send_processdata()?;

        // 10. Publish the completed cycle.
        self.shared.publish(&self.axes);

        Ok(CycleOutcome::Continue)
    }

    /// Non-blocking drain of the command channel. Returns true when
    /// `StopAll` was seen.
    fn drain_commands(&mut self) -> bool {
        while let Ok(cmd) = self.rx.try_recv() {
            match cmd {
                Command::StopAll => {
                    info!("stop requested");
                    return true;
                }
                Command::SetAxisKind { axis, kind } => match self.axes.get_mut(axis) {
                    Some(a) => a.kind = kind,
                    None => warn!(axis, "SetAxisKind for unknown axis ignored"),
                },
                Command::SetVelocity { axis, rpm } => match self.axes.get_mut(axis) {
                    Some(a) if rpm > 0 => a.velocity_rpm = rpm,
                    Some(_) => warn!(axis, "zero velocity ignored"),
                    None => warn!(axis, "SetVelocity for unknown axis ignored"),
                },
                Command::SetAccel {
                    axis,
                    accel_rpm_s,
                    decel_rpm_s,
                } => match self.axes.get_mut(axis) {
                    Some(a) => {
                        a.accel_rpm_s = Some(accel_rpm_s);
                        a.decel_rpm_s = Some(decel_rpm_s);
                    }
                    None => warn!(axis, "SetAccel for unknown axis ignored"),
                },
                Command::SetOrigin { axis } => match self.axes.get_mut(axis) {
                    Some(a) => {
                        a.offset_pulse = a.actual_pulse;
                        a.target_pulse = a.actual_pulse;
                        // A fresh origin also clears a latched sync trip.
                        self.guard.reset();
                        self.shared.set_sync_error(false);
                        info!(axis, offset = a.offset_pulse, "origin set");
                    }
                    None => warn!(axis, "SetOrigin for unknown axis ignored"),
                },
                Command::MoveToMm { axis, mm } => {
                    if axis < self.axes.len() {
                        self.pending_moves.push(PendingMove {
                            axis,
                            target_mm: mm,
                        });
                    } else {
                        warn!(axis, "MoveToMm for unknown axis ignored");
                    }
                }
                Command::SetCouplingGain(gain) => self.coupling.set_gain(gain),
                Command::SetCouplingEnabled(enabled) => self.coupling.set_enabled(enabled),
                Command::ResetSyncError => {
                    self.guard.reset();
                    self.shared.set_sync_error(false);
                    info!("sync error reset");
                }
            }
        }
        false
    }

    // ─── Pacing ─────────────────────────────────────────────────────

    #[cfg(not(feature = "rt"))]
    fn cycle_loop(&mut self) -> Result<(), BusError> {
        loop {
            let cycle_start = Instant::now();
            if self.tick(cycle_start)? == CycleOutcome::StopRequested {
                return Ok(());
            }
            let elapsed = cycle_start.elapsed();
            self.stats.record(elapsed, self.cycle_time);
            match self.cycle_time.checked_sub(elapsed) {
                Some(remaining) => std::thread::sleep(remaining),
                None => warn!(
                    elapsed_us = elapsed.as_micros() as u64,
                    budget_us = self.cycle_time.as_micros() as u64,
                    "cycle overrun"
                ),
            }
        }
    }

    /// Absolute-time pacing on CLOCK_MONOTONIC for drift-free cycles.
    #[cfg(feature = "rt")]
    fn cycle_loop(&mut self) -> Result<(), BusError> {
        use nix::time::{clock_gettime, clock_nanosleep, ClockId, ClockNanosleepFlags};

        let clock = ClockId::CLOCK_MONOTONIC;
        let period_ns = self.cycle_time.as_nanos() as i64;
        let mut next_wake = clock_gettime(clock)
            .map_err(|e| BusError::Init(format!("clock_gettime: {e}")))?;

        loop {
            next_wake = timespec_add_ns(next_wake, period_ns);

            let cycle_start = Instant::now();
            if self.tick(cycle_start)? == CycleOutcome::StopRequested {
                return Ok(());
            }
            let elapsed = cycle_start.elapsed();
            self.stats.record(elapsed, self.cycle_time);

            let now = clock_gettime(clock)
                .map_err(|e| BusError::Init(format!("clock_gettime: {e}")))?;
            if timespec_diff_ns(&now, &next_wake) > 0 {
                warn!(
                    elapsed_us = elapsed.as_micros() as u64,
                    budget_us = self.cycle_time.as_micros() as u64,
                    "cycle overrun"
                );
                // Re-anchor instead of replaying missed deadlines.
                next_wake = timespec_add_ns(now, period_ns);
                continue;
            }
            let _ = clock_nanosleep(clock, ClockNanosleepFlags::TIMER_ABSTIME, &next_wake);
        }
    }
}

// ─── RT Setup ───────────────────────────────────────────────────────

/// Lock all current and future pages. No-op without the `rt` feature.
#[cfg(feature = "rt")]
fn rt_mlockall() -> Result<(), BusError> {
    use nix::sys::mman::{mlockall, MlockAllFlags};
    mlockall(MlockAllFlags::MCL_CURRENT | MlockAllFlags::MCL_FUTURE)
        .map_err(|e| BusError::Init(format!("mlockall failed: {e}")))
}

#[cfg(not(feature = "rt"))]
fn rt_mlockall() -> Result<(), BusError> {
    Ok(())
}

/// Prefault stack pages so the loop never page-faults.
#[cfg(feature = "rt")]
fn prefault_stack() {
    let mut buf = [0u8; 256 * 1024];
    for byte in buf.iter_mut() {
        unsafe { core::ptr::write_volatile(byte, 0xFF) };
    }
    core::hint::black_box(&buf);
}

/// Pin the current thread to one core. No-op without the `rt` feature.
#[cfg(feature = "rt")]
fn rt_set_affinity(cpu: usize) -> Result<(), BusError> {
    use nix::sched::{sched_setaffinity, CpuSet};
    use nix::unistd::Pid;

    let mut cpuset = CpuSet::new();
    cpuset
        .set(cpu)
        .map_err(|e| BusError::Init(format!("CpuSet::set({cpu}) failed: {e}")))?;
    sched_setaffinity(Pid::from_raw(0), &cpuset)
        .map_err(|e| BusError::Init(format!("sched_setaffinity failed: {e}")))
}

/// Set SCHED_FIFO at the given priority. No-op without the `rt` feature.
#[cfg(feature = "rt")]
fn rt_set_scheduler(priority: i32) -> Result<(), BusError> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        return Err(BusError::Init(format!(
            "sched_setscheduler(SCHED_FIFO, {priority}) failed: {err}"
        )));
    }
    Ok(())
}

/// Full RT setup for the loop thread. Must run before the first cycle.
#[cfg(feature = "rt")]
pub fn rt_setup(cpu: Option<usize>, priority: i32) -> Result<(), BusError> {
    rt_mlockall()?;
    prefault_stack();
    if let Some(core) = cpu {
        rt_set_affinity(core)?;
    }
    rt_set_scheduler(priority)?;
    Ok(())
}

/// Without the `rt` feature all scheduling calls are no-ops.
#[cfg(not(feature = "rt"))]
pub fn rt_setup(_cpu: Option<usize>, _priority: i32) -> Result<(), BusError> {
    rt_mlockall()
}

// ─── Time Helpers ───────────────────────────────────────────────────

#[cfg(feature = "rt")]
fn timespec_add_ns(ts: nix::sys::time::TimeSpec, ns: i64) -> nix::sys::time::TimeSpec {
    use nix::sys::time::TimeSpec;
    let mut secs = ts.tv_sec();
    let mut nanos = ts.tv_nsec() + ns;
    while nanos >= 1_000_000_000 {
        secs += 1;
        nanos -= 1_000_000_000;
    }
    TimeSpec::new(secs, nanos)
}

#[cfg(feature = "rt")]
fn timespec_diff_ns(a: &nix::sys::time::TimeSpec, b: &nix::sys::time::TimeSpec) -> i64 {
    (a.tv_sec() - b.tv_sec()) * 1_000_000_000 + (a.tv_nsec() - b.tv_nsec())
}
