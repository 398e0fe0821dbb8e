//! Simulation master.
//!
//! In-process [`EcatMaster`] backend for tests and bench runs: each
//! simulated slave carries a CiA 402 power automaton driven by the
//! received controlwords and follows its CSP target while Operation
//! Enabled. SDO writes are journalled so lifecycle tests can assert the
//! exact configuration sequence.

use tracing::debug;

use tandem_common::consts::{
    CW_DISABLE_VOLTAGE, CW_ENABLE_OPERATION, CW_FAULT_RESET, CW_SHUTDOWN, CW_SWITCH_ON,
    OD_POSITION_ACTUAL, OD_STATUSWORD, PDO_FRAME_LEN,
};
use tandem_common::units::clamp_to_wire;

use crate::master::{BusState, EcatMaster, MasterError};
use crate::pdo;

/// One journalled SDO write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdoWrite {
    pub slave: usize,
    pub index: u16,
    pub sub: u8,
    pub data: Vec<u8>,
}

/// Recorded DC sync configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DcSyncSetting {
    pub slave: usize,
    pub enabled: bool,
    pub period_ns: u64,
}

/// CiA 402 power automaton state of a simulated slave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SimPower {
    SwitchOnDisabled,
    ReadyToSwitchOn,
    SwitchedOn,
    OperationEnabled,
}

impl SimPower {
    fn statusword(self) -> u16 {
        match self {
            Self::SwitchOnDisabled => 0x0240,
            Self::ReadyToSwitchOn => 0x0221,
            Self::SwitchedOn => 0x0233,
            Self::OperationEnabled => 0x0237,
        }
    }
}

#[derive(Debug)]
struct SimSlave {
    power: SimPower,
    faulted: bool,
    inject_fault: bool,
    actual_pulse: i64,
    input: [u8; PDO_FRAME_LEN],
    output: [u8; PDO_FRAME_LEN],
    cw_log: Vec<u16>,
}

impl SimSlave {
    fn new(initial_pulse: i64) -> Self {
        let mut slave = Self {
            power: SimPower::SwitchOnDisabled,
            faulted: false,
            inject_fault: false,
            actual_pulse: initial_pulse,
            input: [0; PDO_FRAME_LEN],
            output: [0; PDO_FRAME_LEN],
            cw_log: Vec::new(),
        };
        slave.refresh_input();
        slave
    }

    fn statusword(&self) -> u16 {
        if self.faulted {
            // Fault bit plus voltage/remote ambience.
            0x0218
        } else {
            self.power.statusword()
        }
    }

    fn refresh_input(&mut self) {
        // Tx and Rx frames share the (u16, i32) layout.
        self.input = pdo::encode(self.statusword(), clamp_to_wire(self.actual_pulse));
    }

    /// React to one received RxPDO frame.
    fn step(&mut self, idx: usize) {
        let Some(rx) = pdo::decode(&self.output) else {
            return;
        };
        let cw = rx.statusword; // same word position as the controlword
        let target = i64::from(rx.actual_position);
        self.cw_log.push(cw);

        if self.inject_fault {
            self.inject_fault = false;
            self.faulted = true;
            debug!(slave = idx, "sim: fault injected");
        }

        if self.faulted {
            if cw == CW_FAULT_RESET {
                self.faulted = false;
                self.power = SimPower::SwitchOnDisabled;
                debug!(slave = idx, "sim: fault reset accepted");
            }
        } else {
            let next = match cw {
                CW_DISABLE_VOLTAGE => SimPower::SwitchOnDisabled,
                CW_SHUTDOWN => SimPower::ReadyToSwitchOn,
                CW_SWITCH_ON => match self.power {
                    SimPower::ReadyToSwitchOn | SimPower::OperationEnabled => {
                        SimPower::SwitchedOn
                    }
                    other => other,
                },
                CW_ENABLE_OPERATION => match self.power {
                    SimPower::SwitchedOn | SimPower::OperationEnabled => {
                        SimPower::OperationEnabled
                    }
                    other => other,
                },
                _ => self.power,
            };
            if next != self.power {
                debug!(slave = idx, ?next, "sim: power transition");
                self.power = next;
            }

            // CSP: the drive follows the commanded target while enabled.
            if self.power == SimPower::OperationEnabled {
                self.actual_pulse = target;
            }
        }

        self.refresh_input();
    }
}

/// Simulated EtherCAT master with `n` CiA 402 slaves.
#[derive(Debug)]
pub struct SimMaster {
    slaves: Vec<SimSlave>,
    opened: bool,
    mapped: bool,
    requested_state: BusState,
    /// Polls remaining before an OP request is acknowledged.
    op_delay_polls: u32,
    sdo_log: Vec<SdoWrite>,
    dc_log: Vec<DcSyncSetting>,
    /// Attempts that fail discovery before succeeding (retry testing).
    failing_discoveries: u32,
}

impl SimMaster {
    /// Create a master with `slave_count` slaves at position 0.
    pub fn new(slave_count: usize) -> Self {
        Self::with_positions(&vec![0; slave_count])
    }

    /// Create a master with given initial slave positions [driver pulses].
    pub fn with_positions(initial: &[i64]) -> Self {
        Self {
            slaves: initial.iter().map(|&p| SimSlave::new(p)).collect(),
            opened: false,
            mapped: false,
            requested_state: BusState::Init,
            op_delay_polls: 2,
            sdo_log: Vec::new(),
            dc_log: Vec::new(),
            failing_discoveries: 0,
        }
    }

    /// Make the next `n` discovery attempts fail, to exercise init retry.
    pub fn fail_discoveries(&mut self, n: u32) {
        self.failing_discoveries = n;
    }

    /// Latch a fault on a slave at the next process-data exchange.
    pub fn inject_fault(&mut self, slave: usize) {
        self.slaves[slave].inject_fault = true;
    }

    /// Measured position of a slave [driver pulses].
    pub fn actual_pulse(&self, slave: usize) -> i64 {
        self.slaves[slave].actual_pulse
    }

    /// Journal of every SDO write since creation.
    pub fn sdo_log(&self) -> &[SdoWrite] {
        &self.sdo_log
    }

    /// Journal of DC sync settings.
    pub fn dc_log(&self) -> &[DcSyncSetting] {
        &self.dc_log
    }

    /// Every controlword a slave has received, in arrival order.
    pub fn controlword_log(&self, slave: usize) -> &[u16] {
        &self.slaves[slave].cw_log
    }

    /// Application-layer state last requested.
    pub fn requested_state(&self) -> BusState {
        self.requested_state
    }

    /// Whether the adapter is open.
    pub fn is_open(&self) -> bool {
        self.opened
    }

    fn check_slave(&self, slave: usize) -> Result<(), MasterError> {
        if slave < self.slaves.len() {
            Ok(())
        } else {
            Err(MasterError::Discovery(format!("no slave {slave}")))
        }
    }
}

impl EcatMaster for SimMaster {
    fn open(&mut self, adapter: &str) -> Result<(), MasterError> {
        debug!(adapter, "sim: adapter opened");
        self.opened = true;
        Ok(())
    }

    fn config_init(&mut self) -> Result<usize, MasterError> {
        if !self.opened {
            return Err(MasterError::Discovery("adapter not open".into()));
        }
        if self.failing_discoveries > 0 {
            self.failing_discoveries -= 1;
            return Err(MasterError::Discovery("simulated bus scan failure".into()));
        }
        Ok(self.slaves.len())
    }

    fn config_map(&mut self) -> Result<usize, MasterError> {
        self.mapped = true;
        Ok(self.slaves.len() * PDO_FRAME_LEN * 2)
    }

    fn sdo_read(
        &mut self,
        slave: usize,
        index: u16,
        _sub: u8,
        buf: &mut [u8],
    ) -> Result<usize, MasterError> {
        self.check_slave(slave)?;
        match index {
            OD_STATUSWORD => {
                let sw = self.slaves[slave].statusword().to_le_bytes();
                buf[..2].copy_from_slice(&sw);
                Ok(2)
            }
            OD_POSITION_ACTUAL => {
                let pos = clamp_to_wire(self.slaves[slave].actual_pulse).to_le_bytes();
                buf[..4].copy_from_slice(&pos);
                Ok(4)
            }
            _ => {
                buf.iter_mut().for_each(|b| *b = 0);
                Ok(buf.len().min(4))
            }
        }
    }

    fn sdo_write(
        &mut self,
        slave: usize,
        index: u16,
        sub: u8,
        data: &[u8],
    ) -> Result<(), MasterError> {
        self.check_slave(slave)?;
        self.sdo_log.push(SdoWrite {
            slave,
            index,
            sub,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn dc_sync(&mut self, slave: usize, enable: bool, period_ns: u64) -> Result<(), MasterError> {
        self.check_slave(slave)?;
        self.dc_log.push(DcSyncSetting {
            slave,
            enabled: enable,
            period_ns,
        });
        Ok(())
    }

    fn request_state(&mut self, state: BusState) -> Result<(), MasterError> {
        self.requested_state = state;
        if state == BusState::Op {
            self.op_delay_polls = 2;
        }
        Ok(())
    }

    fn all_slaves_in(&mut self, state: BusState) -> bool {
        if state != self.requested_state {
            return false;
        }
        if state == BusState::Op {
            if !self.mapped {
                return false;
            }
            if self.op_delay_polls > 0 {
                self.op_delay_polls -= 1;
                return false;
            }
        }
        true
    }

    fn send_processdata(&mut self) -> Result<(), MasterError> {
        for idx in 0..self.slaves.len() {
            self.slaves[idx].step(idx);
        }
        Ok(())
    }

    fn receive_processdata(&mut self) -> Result<(), MasterError> {
        // Inputs were refreshed when the outputs were latched in
        // send_processdata; nothing further to do in-process.
        Ok(())
    }

    fn inputs(&self, slave: usize) -> &[u8] {
        &self.slaves[slave].input
    }

    fn outputs_mut(&mut self, slave: usize) -> &mut [u8] {
        &mut self.slaves[slave].output
    }

    fn close(&mut self) {
        self.opened = false;
        debug!("sim: adapter closed");
    }
}
