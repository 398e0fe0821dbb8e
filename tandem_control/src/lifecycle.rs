//! Bus lifecycle: init retries, OP transition, ordered shutdown.
//!
//! Init and shutdown are the only places SDO transfers happen; once the
//! bus is operational the loop touches nothing but process data.

use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use tandem_common::command::Command;
use tandem_common::consts::{
    CW_DISABLE_VOLTAGE, CW_ENABLE_OPERATION, CW_FAULT_RESET, CW_SHUTDOWN, CW_SWITCH_ON,
    FOLLOWING_ERROR_WINDOW_PULSES, INIT_ATTEMPTS, INIT_BACKOFF_S, MODE_CSP,
    OD_CONTROLWORD, OD_FOLLOWING_ERROR_WINDOW, OD_MODES_OF_OPERATION, OD_POSITION_WINDOW,
    OD_PROFILE_ACCELERATION, OD_PROFILE_DECELERATION, OD_PROFILE_VELOCITY, OD_RXPDO_MAP,
    OD_SM2_ASSIGN, OD_SM3_ASSIGN, OD_STATUSWORD, OD_TXPDO_MAP, OP_ATTEMPTS, OP_BACKOFF_S,
    OP_WAIT_S, PDO_ENTRY_CONTROLWORD, PDO_ENTRY_POSITION_ACTUAL, PDO_ENTRY_STATUSWORD,
    PDO_ENTRY_TARGET_POSITION, PDO_FRAME_LEN, POSITION_WINDOW_PULSES,
};
use tandem_common::status::StatusBits;
use tandem_common::units::{clamp_to_wire, rpm_to_motor_pulses_per_s};

use crate::cycle::CycleRunner;
use crate::error::BusError;
use crate::master::{BusState, EcatMaster, MasterError};
use crate::pdo;

/// PDO exchanges holding position before the controlword ladder.
const HOLD_FRAMES: usize = 5;
/// Frames each ladder step is held for.
const LADDER_FRAMES: usize = 5;
/// Pause between shutdown exchanges.
const HOLD_PERIOD: Duration = Duration::from_millis(20);

impl<M: EcatMaster> CycleRunner<M> {
    /// Bring the bus from cold to Operation Enabled.
    ///
    /// Adapter open, slave discovery and per-slave configuration retry up
    /// to the init budget; the OP transition retries separately. On final
    /// failure the adapter is closed and the error surfaces to `start()`.
    pub fn initialize(&mut self) -> Result<(), BusError> {
        self.predrain_config_commands();

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_init() {
                Ok(()) => break,
                Err(e) if attempt < INIT_ATTEMPTS => {
                    warn!(attempt, error = %e, "bus init failed, retrying");
                    self.master.close();
                    thread::sleep(Duration::from_secs_f64(INIT_BACKOFF_S));
                }
                Err(e) => {
                    self.master.close();
                    return Err(BusError::Init(e.to_string()));
                }
            }
        }

        self.enter_operational()
    }

    /// Apply configuration commands queued before `start()`.
    ///
    /// They live in axis state, not the channel, so init retries keep
    /// them. Motion commands submitted before the bus runs are dropped.
    fn predrain_config_commands(&mut self) {
        while let Ok(cmd) = self.rx.try_recv() {
            match cmd {
                Command::SetAxisKind { axis, kind } => {
                    if let Some(a) = self.axes.get_mut(axis) {
                        info!(axis, ?kind, "axis kind configured");
                        a.kind = kind;
                    }
                }
                Command::SetVelocity { axis, rpm } => {
                    if let Some(a) = self.axes.get_mut(axis) {
                        if rpm > 0 {
                            info!(axis, rpm, "profile velocity configured");
                            a.velocity_rpm = rpm;
                        }
                    }
                }
                Command::SetAccel {
                    axis,
                    accel_rpm_s,
                    decel_rpm_s,
                } => {
                    if let Some(a) = self.axes.get_mut(axis) {
                        info!(axis, accel_rpm_s, decel_rpm_s, "profile accel configured");
                        a.accel_rpm_s = Some(accel_rpm_s);
                        a.decel_rpm_s = Some(decel_rpm_s);
                    }
                }
                other => warn!(?other, "command before bus start dropped"),
            }
        }
    }

    /// One init attempt: open, discover, configure every slave, map.
    fn try_init(&mut self) -> Result<(), MasterError> {
        info!(adapter = %self.config.adapter, "opening adapter");
        self.master.open(&self.config.adapter)?;

        let expected = self.axes.len();
        let found = self.master.config_init()?;
        if found < expected {
            return Err(MasterError::Discovery(format!(
                "expected {expected} slaves, found {found}"
            )));
        }
        info!(found, "slaves discovered");

        let period_ns = self.cycle_time.as_nanos() as u64;
        for idx in 0..expected {
            self.configure_slave(idx, period_ns)?;
        }

        let image_bytes = self.master.config_map()?;
        info!(image_bytes, "process image mapped");
        Ok(())
    }

    /// Per-slave SDO and DC configuration for CSP.
    fn configure_slave(&mut self, idx: usize, period_ns: u64) -> Result<(), MasterError> {
        self.master.dc_sync(idx, true, period_ns)?;

        // Clear a fault latched from a previous session.
        let mut sw = [0u8; 2];
        self.master.sdo_read(idx, OD_STATUSWORD, 0, &mut sw)?;
        if StatusBits::fault_in(u16::from_le_bytes(sw)) {
            warn!(slave = idx, "fault latched at init, sending reset");
            self.master
                .sdo_write(idx, OD_CONTROLWORD, 0, &CW_FAULT_RESET.to_le_bytes())?;
            thread::sleep(Duration::from_millis(200));
        }

        // Profile velocity and acceleration apply before PDO mapping.
        let velocity_rpm = self.axes[idx].velocity_rpm;
        let accel = self.axes[idx].accel_rpm_s;
        let decel = self.axes[idx].decel_rpm_s;
        let velocity = rpm_to_motor_pulses_per_s(velocity_rpm);
        self.master
            .sdo_write(idx, OD_PROFILE_VELOCITY, 0, &velocity.to_le_bytes())?;
        if let Some(accel_rpm_s) = accel {
            let accel_val = rpm_to_motor_pulses_per_s(accel_rpm_s);
            let decel_val = rpm_to_motor_pulses_per_s(decel.unwrap_or(accel_rpm_s));
            self.master
                .sdo_write(idx, OD_PROFILE_ACCELERATION, 0, &accel_val.to_le_bytes())?;
            self.master
                .sdo_write(idx, OD_PROFILE_DECELERATION, 0, &decel_val.to_le_bytes())?;
        }

        self.map_csp_pdos(idx)?;

        // Modes of Operation: Cyclic Synchronous Position.
        self.master
            .sdo_write(idx, OD_MODES_OF_OPERATION, 0, &[MODE_CSP as u8])?;

        // Wide windows absorb the target gap at OP entry; failure here is
        // survivable, the drive default merely faults earlier.
        if let Err(e) = self.write_windows(idx) {
            warn!(slave = idx, error = %e, "window SDO setup failed, continuing");
        }

        info!(slave = idx, velocity_rpm, "slave configured for CSP");
        Ok(())
    }

    /// CSP PDO mapping: 0x1600 = [cw, target], 0x1A00 = [sw, actual].
    fn map_csp_pdos(&mut self, idx: usize) -> Result<(), MasterError> {
        let m = &mut self.master;

        m.sdo_write(idx, OD_SM2_ASSIGN, 0, &[0])?;
        m.sdo_write(idx, OD_RXPDO_MAP, 0, &[0])?;
        m.sdo_write(idx, OD_RXPDO_MAP, 1, &PDO_ENTRY_CONTROLWORD.to_le_bytes())?;
        m.sdo_write(idx, OD_RXPDO_MAP, 2, &PDO_ENTRY_TARGET_POSITION.to_le_bytes())?;
        m.sdo_write(idx, OD_RXPDO_MAP, 0, &[2])?;
        m.sdo_write(idx, OD_SM2_ASSIGN, 1, &OD_RXPDO_MAP.to_le_bytes())?;
        m.sdo_write(idx, OD_SM2_ASSIGN, 0, &[1])?;

        m.sdo_write(idx, OD_SM3_ASSIGN, 0, &[0])?;
        m.sdo_write(idx, OD_TXPDO_MAP, 0, &[0])?;
        m.sdo_write(idx, OD_TXPDO_MAP, 1, &PDO_ENTRY_STATUSWORD.to_le_bytes())?;
        m.sdo_write(idx, OD_TXPDO_MAP, 2, &PDO_ENTRY_POSITION_ACTUAL.to_le_bytes())?;
        m.sdo_write(idx, OD_TXPDO_MAP, 0, &[2])?;
        m.sdo_write(idx, OD_SM3_ASSIGN, 1, &OD_TXPDO_MAP.to_le_bytes())?;
        m.sdo_write(idx, OD_SM3_ASSIGN, 0, &[1])?;
        Ok(())
    }

    fn write_windows(&mut self, idx: usize) -> Result<(), MasterError> {
        self.master.sdo_write(
            idx,
            OD_POSITION_WINDOW,
            0,
            &POSITION_WINDOW_PULSES.to_le_bytes(),
        )?;
        self.master.sdo_write(
            idx,
            OD_FOLLOWING_ERROR_WINDOW,
            0,
            &FOLLOWING_ERROR_WINDOW_PULSES.to_le_bytes(),
        )?;
        Ok(())
    }

    /// Request OP and poll until every slave reports it, then seed each
    /// axis's target with its measured position.
    fn enter_operational(&mut self) -> Result<(), BusError> {
        let poll_budget = (OP_WAIT_S / self.cycle_time.as_secs_f64()).ceil() as u32;

        let mut attempt = 0;
        loop {
            attempt += 1;
            self.master.request_state(BusState::Op)?;

            let mut reached = false;
            for _ in 0..poll_budget {
                self.master.send_processdata()?;
                self.master.receive_processdata()?;
                if self.master.all_slaves_in(BusState::Op) {
                    reached = true;
                    break;
                }
                thread::sleep(self.cycle_time);
            }

            if reached {
                break;
            }
            if attempt < OP_ATTEMPTS {
                warn!(attempt, "slaves did not reach OP, retrying");
                thread::sleep(Duration::from_secs_f64(OP_BACKOFF_S));
            } else {
                self.master.close();
                return Err(BusError::StateTransition(format!(
                    "slaves did not reach OP within {attempt} attempts"
                )));
            }
        }
        info!("all slaves operational");

        // Seed target = actual so the first CSP cycle commands no motion.
        for idx in 0..self.axes.len() {
            let Some(tx) = pdo::decode(self.master.inputs(idx)) else {
                return Err(BusError::StateTransition(format!(
                    "slave {idx}: no input frame after OP"
                )));
            };
            let axis = &mut self.axes[idx];
            axis.statusword = tx.statusword;
            axis.last_status = tx.statusword;
            axis.actual_pulse = i64::from(tx.actual_position);
            axis.target_pulse = axis.actual_pulse;
            info!(
                axis = idx,
                position = axis.actual_pulse,
                "target seeded from actual"
            );
        }
        self.shared.publish(&self.axes);
        Ok(())
    }

    /// Ordered shutdown: hold position, walk the controlword ladder down,
    /// drop the bus to INIT, close. Best effort throughout; a dying
    /// master must not prevent the close.
    pub fn shutdown(&mut self) {
        info!("shutdown sequence started");

        for axis in self.axes.iter_mut() {
            axis.freeze();
        }

        // Drives latch the held position before power-stage changes.
        for _ in 0..HOLD_FRAMES {
            self.shutdown_exchange(CW_ENABLE_OPERATION);
        }

        for cw in [CW_SWITCH_ON, CW_SHUTDOWN, CW_DISABLE_VOLTAGE] {
            for _ in 0..LADDER_FRAMES {
                self.shutdown_exchange(cw);
            }
        }

        if let Err(e) = self.master.request_state(BusState::Init) {
            warn!(error = %e, "INIT request failed during shutdown");
        }
        self.shared.publish(&self.axes);
        self.master.close();
        info!("shutdown complete");
    }

    /// One best-effort PDO exchange with a fixed controlword and the
    /// current measured position as target.
    fn shutdown_exchange(&mut self, cw: u16) {
        for idx in 0..self.axes.len() {
            if let Some(tx) = pdo::decode(self.master.inputs(idx)) {
                self.axes[idx].statusword = tx.statusword;
                self.axes[idx].actual_pulse = i64::from(tx.actual_position);
                self.axes[idx].target_pulse = self.axes[idx].actual_pulse;
            }
            let frame = pdo::encode(cw, clamp_to_wire(self.axes[idx].actual_pulse));
            self.master.outputs_mut(idx)[..PDO_FRAME_LEN].copy_from_slice(&frame);
            self.axes[idx].last_controlword = cw;
        }
        if let Err(e) = self.master.send_processdata() {
            warn!(error = %e, "send failed during shutdown");
            return;
        }
        if let Err(e) = self.master.receive_processdata() {
            warn!(error = %e, "receive failed during shutdown");
        }
        thread::sleep(HOLD_PERIOD);
    }
}
