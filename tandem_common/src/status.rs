//! CiA 402 statusword bit definitions.
//!
//! Bit names follow ETG6010 §5.3. State decoding masks live with the
//! driver in `tandem_control`; this module only names the raw bits.

use bitflags::bitflags;

bitflags! {
    /// CiA 402 statusword (0x6041) bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StatusBits: u16 {
        /// Ready to switch on.
        const READY_TO_SWITCH_ON = 0x0001;
        /// Switched on.
        const SWITCHED_ON        = 0x0002;
        /// Operation enabled.
        const OPERATION_ENABLED  = 0x0004;
        /// Fault latched by the drive.
        const FAULT              = 0x0008;
        /// Voltage enabled at the power stage.
        const VOLTAGE_ENABLED    = 0x0010;
        /// Quick stop NOT active (active low).
        const QUICK_STOP         = 0x0020;
        /// Switch on disabled.
        const SWITCH_ON_DISABLED = 0x0040;
        /// Manufacturer warning.
        const WARNING            = 0x0080;
        /// Remote control active.
        const REMOTE             = 0x0200;
        /// Target reached (mode specific).
        const TARGET_REACHED     = 0x0400;
        /// Internal limit active.
        const INTERNAL_LIMIT     = 0x0800;
    }
}

impl StatusBits {
    /// Whether the fault bit is set in a raw statusword.
    #[inline]
    pub const fn fault_in(statusword: u16) -> bool {
        statusword & Self::FAULT.bits() != 0
    }
}

impl Default for StatusBits {
    fn default() -> Self {
        Self::empty()
    }
}
