//! # Tandem Control
//!
//! Real-time control core for a multi-axis EtherCAT motor controller in
//! Cyclic Synchronous Position mode. A single dedicated thread owns the
//! master, all per-axis runtime state and the PDO exchange; the user-facing
//! API talks to it through a bounded command channel and a locked snapshot
//! region.
//!
//! ## Cycle order
//!
//! drain commands → install batched moves → receive process data → sync
//! guard → fault supervisor → trajectory + CiA 402 per axis → cross
//! coupling → encode + send process data → publish snapshots → sleep.
//!
//! ## Zero-allocation loop
//!
//! All runtime state is allocated before OP entry; the steady-state cycle
//! performs no heap allocation and blocks only on the end-of-cycle sleep.

pub mod axis;
pub mod bus;
pub mod cia402;
pub mod coupling;
pub mod cycle;
pub mod error;
pub mod fault;
pub mod guard;
pub mod lifecycle;
pub mod master;
pub mod pdo;
pub mod shared;
pub mod sim;
pub mod sync;
pub mod trajectory;

pub use bus::{Bus, Motor};
pub use error::BusError;
pub use master::{BusState, EcatMaster, MasterError};
pub use sim::SimMaster;
