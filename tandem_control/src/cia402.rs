//! CiA 402 power state machine driver.
//!
//! Stateless per cycle: given the statusword received this cycle, selects
//! the controlword for the next cycle so the drive walks up to Operation
//! Enabled and stays there. A latched fault gets Fault Reset every cycle
//! until it clears.

use tandem_common::consts::{
    CW_ENABLE_OPERATION, CW_FAULT_RESET, CW_SHUTDOWN, CW_SWITCH_ON,
};
use tandem_common::status::StatusBits;

/// Decoded CiA 402 power state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveState {
    /// Power stage off, drive idle.
    SwitchOnDisabled,
    /// Voltage may be applied.
    ReadyToSwitchOn,
    /// Power stage on, operation not yet enabled.
    SwitchedOn,
    /// Drive follows targets.
    OperationEnabled,
    /// Fault latched (statusword bit 3).
    Fault,
    /// Transitional or vendor state; treated like Switch On Disabled.
    Unknown,
}

impl DriveState {
    /// Decode a raw statusword.
    pub fn from_statusword(statusword: u16) -> Self {
        if statusword & 0x004F == 0x0040 {
            Self::SwitchOnDisabled
        } else if statusword & 0x006F == 0x0021 {
            Self::ReadyToSwitchOn
        } else if statusword & 0x006F == 0x0023 {
            Self::SwitchedOn
        } else if statusword & 0x006F == 0x0027 {
            Self::OperationEnabled
        } else if StatusBits::fault_in(statusword) {
            Self::Fault
        } else {
            Self::Unknown
        }
    }

    /// Controlword to emit this cycle for the observed state.
    #[inline]
    pub const fn controlword(self) -> u16 {
        match self {
            Self::SwitchOnDisabled => CW_SHUTDOWN,
            Self::ReadyToSwitchOn => CW_SWITCH_ON,
            Self::SwitchedOn | Self::OperationEnabled => CW_ENABLE_OPERATION,
            Self::Fault => CW_FAULT_RESET,
            Self::Unknown => CW_SHUTDOWN,
        }
    }

    /// Whether trajectory updates may be dispatched in this state.
    #[inline]
    pub const fn permits_motion(self) -> bool {
        matches!(self, Self::OperationEnabled)
    }
}
