//! EtherCAT master interface.
//!
//! The control core does not implement EtherCAT I/O itself; it drives any
//! backend implementing [`EcatMaster`]: a hardware master binding in
//! production, [`crate::sim::SimMaster`] in tests and the demo binary.
//!
//! # Lifecycle
//!
//! 1. `open()` / `config_init()` / per-slave SDO + DC setup / `config_map()`
//!    — before the RT loop, may block.
//! 2. `send_processdata()` / `receive_processdata()` and the per-slave
//!    buffers — every cycle, must not block beyond the wire.
//! 3. `request_state(Init)` / `close()` — after the loop.

use thiserror::Error;

/// EtherCAT application-layer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusState {
    Init,
    PreOp,
    SafeOp,
    Op,
}

/// Errors surfaced by a master backend.
#[derive(Debug, Clone, Error)]
pub enum MasterError {
    /// Adapter could not be opened.
    #[error("failed to open adapter '{0}'")]
    AdapterOpen(String),

    /// Slave discovery failed or found fewer slaves than expected.
    #[error("slave discovery failed: {0}")]
    Discovery(String),

    /// SDO transfer failed.
    #[error("SDO {index:#06x}:{sub} on slave {slave} failed: {reason}")]
    Sdo {
        slave: usize,
        index: u16,
        sub: u8,
        reason: String,
    },

    /// Process data exchange failed.
    #[error("process data exchange failed: {0}")]
    ProcessData(String),

    /// Application-layer state request failed.
    #[error("state change failed: {0}")]
    StateChange(String),
}

/// Interface consumed from the EtherCAT master collaborator.
///
/// The loop thread owns the master exclusively; no other caller touches
/// it. SDO transfers happen only during init and shutdown, never in the
/// steady-state cycle.
pub trait EcatMaster: Send {
    /// Open the network adapter.
    fn open(&mut self, adapter: &str) -> Result<(), MasterError>;

    /// Enumerate slaves. Returns the number found.
    fn config_init(&mut self) -> Result<usize, MasterError>;

    /// Build the process image after PDO mapping. Returns its size in
    /// bytes.
    fn config_map(&mut self) -> Result<usize, MasterError>;

    /// Read an object dictionary entry. Returns the number of bytes read.
    fn sdo_read(
        &mut self,
        slave: usize,
        index: u16,
        sub: u8,
        buf: &mut [u8],
    ) -> Result<usize, MasterError>;

    /// Write an object dictionary entry.
    fn sdo_write(
        &mut self,
        slave: usize,
        index: u16,
        sub: u8,
        data: &[u8],
    ) -> Result<(), MasterError>;

    /// Enable or disable Distributed Clock sync0 on a slave.
    fn dc_sync(&mut self, slave: usize, enable: bool, period_ns: u64) -> Result<(), MasterError>;

    /// Request an application-layer state for all slaves.
    fn request_state(&mut self, state: BusState) -> Result<(), MasterError>;

    /// Re-read slave states and report whether all slaves are in `state`.
    fn all_slaves_in(&mut self, state: BusState) -> bool;

    /// Queue the output process image onto the wire.
    fn send_processdata(&mut self) -> Result<(), MasterError>;

    /// Fetch the input process image from the wire.
    fn receive_processdata(&mut self) -> Result<(), MasterError>;

    /// Input buffer (TxPDO image) of one slave.
    fn inputs(&self, slave: usize) -> &[u8];

    /// Output buffer (RxPDO image) of one slave.
    fn outputs_mut(&mut self, slave: usize) -> &mut [u8];

    /// Close the adapter. Idempotent.
    fn close(&mut self);
}
