//! Bus-level error types.

use thiserror::Error;

use tandem_common::config::ConfigError;

use crate::master::MasterError;

/// Errors surfaced to the user-facing API.
#[derive(Debug, Clone, Error)]
pub enum BusError {
    /// Adapter open or slave discovery failed after the retry budget.
    #[error("initialization failed: {0}")]
    Init(String),

    /// Slaves failed to reach the requested application-layer state.
    #[error("state transition timeout: {0}")]
    StateTransition(String),

    /// Master I/O failure.
    #[error(transparent)]
    Master(#[from] MasterError),

    /// Configuration rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Operation requires a running loop.
    #[error("bus is not running")]
    NotRunning,

    /// The loop has already been started.
    #[error("bus is already running")]
    AlreadyRunning,
}
