//! Shared harness for the integration suite.

mod bus_api;
mod motion;
mod safety;
mod shutdown;
mod startup;

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Sender};

use tandem_common::command::Command;
use tandem_common::config::{AxisConfig, BusConfig, SyncGuardConfig};
use tandem_common::units::AxisKind;
use tandem_control::cycle::{CycleOutcome, CycleRunner};
use tandem_control::shared::SharedStates;
use tandem_control::SimMaster;

pub const CYCLE: Duration = Duration::from_millis(10);

/// A two-Z-axis bus at 50 RPM, 10 ms cycle, guard and coupling off.
pub fn test_config(axes: usize) -> BusConfig {
    BusConfig {
        adapter: "sim0".into(),
        cycle_time_ms: 10,
        rt: Default::default(),
        coupling: Default::default(),
        sync_guard: Default::default(),
        axes: vec![
            AxisConfig {
                kind: AxisKind::Z,
                velocity_rpm: 50,
                accel_rpm_s: Some(50),
                decel_rpm_s: None,
            };
            axes
        ],
    }
}

/// Cycle runner plus synthetic clock and command sender.
pub struct Harness {
    pub runner: CycleRunner<SimMaster>,
    pub tx: Sender<Command>,
    pub shared: Arc<SharedStates>,
    base: Instant,
    tick_no: u64,
}

impl Harness {
    pub fn new(axes: usize) -> Self {
        Self::with_config(test_config(axes), &vec![0; axes])
    }

    pub fn with_positions(positions: &[i64]) -> Self {
        Self::with_config(test_config(positions.len()), positions)
    }

    pub fn with_config(config: BusConfig, positions: &[i64]) -> Self {
        let (tx, rx) = bounded(64);
        let shared = SharedStates::new(config.slave_count());
        let master = SimMaster::with_positions(positions);
        let runner = CycleRunner::new(master, config, rx, Arc::clone(&shared));
        Self {
            runner,
            tx,
            shared,
            base: Instant::now(),
            tick_no: 0,
        }
    }

    /// Initialize the bus and step until every drive is Operation Enabled.
    pub fn start(&mut self) {
        self.runner.initialize().expect("bus init");
        for _ in 0..20 {
            self.step();
            if self
                .runner
                .axes()
                .iter()
                .all(|a| a.statusword & 0x006F == 0x0027)
            {
                return;
            }
        }
        panic!("drives did not reach Operation Enabled");
    }

    /// The instant the next `step()` will run at.
    pub fn now(&self) -> Instant {
        self.base + CYCLE * self.tick_no as u32
    }

    /// Execute one cycle on the synthetic clock.
    pub fn step(&mut self) -> CycleOutcome {
        let now = self.now();
        self.tick_no += 1;
        self.runner.tick(now).expect("tick")
    }

    /// Step for a stretch of synthetic seconds.
    pub fn step_secs(&mut self, seconds: f64) {
        let ticks = (seconds / CYCLE.as_secs_f64()).ceil() as u64;
        for _ in 0..ticks {
            self.step();
        }
    }

    pub fn send(&self, command: Command) {
        self.tx.send(command).expect("send command");
    }
}

/// Config variant with the sync guard armed.
pub fn guarded_config(axes: usize, max_error_mm: f64, trip_cycles: u32) -> BusConfig {
    let mut config = test_config(axes);
    config.sync_guard = SyncGuardConfig {
        enabled: true,
        max_error_mm,
        trip_cycles,
    };
    config
}
