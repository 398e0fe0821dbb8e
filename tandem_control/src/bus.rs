//! User-facing bus and motor handles.
//!
//! `Bus::start` forks the control thread and blocks until the lifecycle
//! handshake: either the bus reached OP or init failed with a clean
//! error. From then on the only contact points are the bounded command
//! channel and the published snapshots. `Bus::stop` pushes `StopAll` and
//! joins the thread, surfacing the loop's exit result.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{info, warn};

use tandem_common::command::Command;
use tandem_common::config::BusConfig;
use tandem_common::units::{pulses_to_mm, AxisKind};

use crate::cycle::{rt_setup, CycleRunner};
use crate::error::BusError;
use crate::master::EcatMaster;
use crate::shared::{AxisSnapshot, SharedStates};

/// Command channel depth. Bounded so a stalled loop back-pressures the
/// API instead of growing without limit.
const COMMAND_QUEUE_DEPTH: usize = 64;

/// Poll period of the blocking wait helpers.
const WAIT_POLL: Duration = Duration::from_millis(50);

/// Handle to the control loop for one EtherCAT bus.
pub struct Bus {
    config: BusConfig,
    tx: Sender<Command>,
    rx: Option<Receiver<Command>>,
    shared: Arc<SharedStates>,
    handle: Option<JoinHandle<Result<(), BusError>>>,
}

impl Bus {
    /// Create a bus from a validated configuration. The loop does not
    /// start until [`Bus::start`].
    pub fn new(config: BusConfig) -> Result<Self, BusError> {
        config.validate()?;
        let (tx, rx) = bounded(COMMAND_QUEUE_DEPTH);
        let shared = SharedStates::new(config.slave_count());
        Ok(Self {
            config,
            tx,
            rx: Some(rx),
            shared,
            handle: None,
        })
    }

    /// Number of configured slaves.
    pub fn slave_count(&self) -> usize {
        self.config.slave_count()
    }

    /// Handle for one motor, or `None` for an out-of-range index.
    pub fn motor(&self, index: usize) -> Option<Motor> {
        let kind = self.config.axes.get(index)?.kind;
        Some(Motor {
            index,
            kind,
            tx: self.tx.clone(),
            shared: Arc::clone(&self.shared),
        })
    }

    /// Handles for every configured motor, in slave order.
    pub fn motors(&self) -> Vec<Motor> {
        (0..self.slave_count()).filter_map(|i| self.motor(i)).collect()
    }

    /// Fork the control thread on `master` and wait for the lifecycle
    /// handshake. Returns once the bus is operational.
    pub fn start<M: EcatMaster + 'static>(&mut self, master: M) -> Result<(), BusError> {
        let rx = self.rx.take().ok_or(BusError::AlreadyRunning)?;
        let config = self.config.clone();
        let shared = Arc::clone(&self.shared);
        let (ready_tx, ready_rx) = bounded::<Result<(), BusError>>(1);

        let handle = thread::Builder::new()
            .name("tandem-cycle".into())
            .spawn(move || {
                if let Err(e) = rt_setup(config.rt.cpu, config.rt.priority) {
                    warn!(error = %e, "rt setup failed, continuing without rt scheduling");
                }
                let mut runner = CycleRunner::new(master, config, rx, shared);
                match runner.initialize() {
                    Ok(()) => {
                        let _ = ready_tx.send(Ok(()));
                        runner.run()
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.clone()));
                        Err(e)
                    }
                }
            })
            .map_err(|e| BusError::Init(format!("failed to spawn loop thread: {e}")))?;
        self.handle = Some(handle);

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!("bus started");
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = self.join_loop();
                Err(e)
            }
            Err(_) => {
                // Thread died before the handshake.
                let result = self.join_loop();
                Err(result.err().unwrap_or(BusError::NotRunning))
            }
        }
    }

    /// Request shutdown and join the loop thread.
    pub fn stop(&mut self) -> Result<(), BusError> {
        if self.handle.is_none() {
            return Err(BusError::NotRunning);
        }
        info!("stopping bus");
        // A full queue or a dead loop both mean the loop is beyond
        // accepting commands; join either way.
        let _ = self.tx.send_timeout(Command::StopAll, Duration::from_secs(1));
        self.join_loop()
    }

    /// Submit a raw command to the loop.
    pub fn enqueue(&self, command: Command) -> Result<(), BusError> {
        self.tx
            .send_timeout(command, Duration::from_secs(1))
            .map_err(|_| BusError::NotRunning)
    }

    /// Whether a sync-deviation trip is latched.
    pub fn sync_error(&self) -> bool {
        self.shared.sync_error()
    }

    /// Clear a latched sync-deviation trip.
    pub fn reset_sync_error(&self) -> Result<(), BusError> {
        self.enqueue(Command::ResetSyncError)
    }

    /// Tune the cross-coupling gain (clamped to 0.0–1.0 by the loop).
    pub fn set_coupling_gain(&self, gain: f64) -> Result<(), BusError> {
        self.enqueue(Command::SetCouplingGain(gain))
    }

    /// Enable or disable the cross-coupling stage.
    pub fn set_coupling_enabled(&self, enabled: bool) -> Result<(), BusError> {
        self.enqueue(Command::SetCouplingEnabled(enabled))
    }

    fn join_loop(&mut self) -> Result<(), BusError> {
        match self.handle.take() {
            Some(handle) => match handle.join() {
                Ok(result) => result,
                Err(_) => Err(BusError::Init("loop thread panicked".into())),
            },
            None => Err(BusError::NotRunning),
        }
    }
}

impl Drop for Bus {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.stop();
        }
    }
}

/// Handle to one axis, cheap to clone and free of loop state.
#[derive(Clone)]
pub struct Motor {
    index: usize,
    kind: AxisKind,
    tx: Sender<Command>,
    shared: Arc<SharedStates>,
}

impl Motor {
    /// Slave index on the bus.
    #[inline]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Select the mechanical axis kind. Takes effect before PDO
    /// configuration when issued before `start()`.
    pub fn set_axis_kind(&mut self, kind: AxisKind) -> Result<(), BusError> {
        self.kind = kind;
        self.send(Command::SetAxisKind {
            axis: self.index,
            kind,
        })
    }

    /// Set the profile velocity [RPM]. Issue before `start()` for the
    /// SDO to reach the drive.
    pub fn set_profile_velocity(&self, rpm: u32) -> Result<(), BusError> {
        self.send(Command::SetVelocity {
            axis: self.index,
            rpm,
        })
    }

    /// Set profile acceleration and deceleration [RPM/s]. Deceleration
    /// defaults to the acceleration.
    pub fn set_profile_accel_decel(
        &self,
        accel_rpm_s: u32,
        decel_rpm_s: Option<u32>,
    ) -> Result<(), BusError> {
        self.send(Command::SetAccel {
            axis: self.index,
            accel_rpm_s,
            decel_rpm_s: decel_rpm_s.unwrap_or(accel_rpm_s),
        })
    }

    /// Declare the current position as 0 mm.
    pub fn set_origin(&self) -> Result<(), BusError> {
        self.send(Command::SetOrigin { axis: self.index })
    }

    /// Move to an absolute position [mm] relative to the origin.
    pub fn move_to_mm(&self, target_mm: f64) -> Result<(), BusError> {
        self.send(Command::MoveToMm {
            axis: self.index,
            mm: target_mm,
        })
    }

    /// Statusword from the last completed cycle.
    pub fn status_word(&self) -> u16 {
        self.snapshot().map(|s| s.statusword).unwrap_or(0)
    }

    /// Whether a trajectory is active.
    pub fn is_moving(&self) -> bool {
        self.snapshot().map(|s| s.moving).unwrap_or(false)
    }

    /// Current position [mm] relative to the origin.
    pub fn current_position_mm(&self) -> f64 {
        match self.snapshot() {
            Some(s) => pulses_to_mm(s.actual_pulse - s.offset_pulse, self.kind),
            None => 0.0,
        }
    }

    /// Current raw position [driver pulses].
    pub fn current_position_pulse(&self) -> i64 {
        self.snapshot().map(|s| s.actual_pulse).unwrap_or(0)
    }

    /// Origin offset [driver pulses].
    pub fn offset_pulse(&self) -> i64 {
        self.snapshot().map(|s| s.offset_pulse).unwrap_or(0)
    }

    /// Consistent snapshot of this axis.
    pub fn snapshot(&self) -> Option<AxisSnapshot> {
        self.shared.snapshot(self.index)
    }

    /// Block until the drive reports Operation Enabled.
    pub fn wait_operation_enabled(&self, timeout: Duration) -> Result<(), BusError> {
        self.wait(timeout, "operation enabled", |s| {
            s.statusword & 0x006F == 0x0027
        })
    }

    /// Block until no trajectory is active.
    pub fn wait_idle(&self, timeout: Duration) -> Result<(), BusError> {
        self.wait(timeout, "idle", |s| !s.moving)
    }

    fn wait(
        &self,
        timeout: Duration,
        what: &str,
        done: impl Fn(&AxisSnapshot) -> bool,
    ) -> Result<(), BusError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(snapshot) = self.snapshot() {
                if done(&snapshot) {
                    return Ok(());
                }
            }
            if Instant::now() >= deadline {
                return Err(BusError::StateTransition(format!(
                    "axis {} not {what} within {timeout:?}",
                    self.index
                )));
            }
            thread::sleep(WAIT_POLL);
        }
    }

    fn send(&self, command: Command) -> Result<(), BusError> {
        self.tx
            .send_timeout(command, Duration::from_secs(1))
            .map_err(|_| BusError::NotRunning)
    }
}
