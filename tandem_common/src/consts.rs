//! System-wide constants for the tandem workspace.
//!
//! Single source of truth for CiA 402 command words, pulse scales and
//! protocol limits. Imported by both crates; no duplication permitted.

// ─── CiA 402 Controlwords ───────────────────────────────────────────

/// Shutdown: transition to Ready to Switch On.
pub const CW_SHUTDOWN: u16 = 0x0006;
/// Switch On: transition to Switched On (also "Disable Operation").
pub const CW_SWITCH_ON: u16 = 0x0007;
/// Enable Operation: power stage active, targets are followed.
pub const CW_ENABLE_OPERATION: u16 = 0x000F;
/// Disable Voltage: drop to Switch On Disabled.
pub const CW_DISABLE_VOLTAGE: u16 = 0x0000;
/// Fault Reset: rising edge clears a latched drive fault.
pub const CW_FAULT_RESET: u16 = 0x0080;

// ─── Pulse Scales ───────────────────────────────────────────────────

/// Encoder pulses per motor revolution (23-bit encoder).
pub const PULSES_PER_REV: i64 = 8_388_608;

/// Drive-side position factor. The drive reports and accepts positions
/// at twice the encoder scale; every on-wire value uses this scale.
pub const POSITION_FACTOR: i64 = 2;

/// Pulses per revolution on the driver scale (`PULSES_PER_REV × 2`).
pub const PULSES_PER_REV_DRIVER: i64 = PULSES_PER_REV * POSITION_FACTOR;

/// Leadscrew feed of the X axis [mm/rev].
pub const X_MM_PER_REV: f64 = 11.999_313_140_4;

/// Leadscrew feed of the Z axis [mm/rev].
pub const Z_MM_PER_REV: f64 = 5.999_656_570_19;

// ─── Motion Limits ──────────────────────────────────────────────────

/// Position window below which a segment counts as complete [driver pulses].
/// ≈ 0.018 mm on the Z axis.
pub const COMPLETION_WINDOW_PULSES: i64 = 50_000;

/// Minimum duration of any installed segment [s].
pub const MIN_SEGMENT_DURATION_S: f64 = 0.1;

/// Following Error Window written to 0x6065 [driver pulses]. Large enough
/// to absorb the target–actual gap at OP entry.
pub const FOLLOWING_ERROR_WINDOW_PULSES: u32 = 200_000_000;

/// Position Window written to 0x6067 [driver pulses].
pub const POSITION_WINDOW_PULSES: u32 = 200_000_000;

// ─── Cycle Defaults ─────────────────────────────────────────────────

/// Default control cycle period [ms].
pub const DEFAULT_CYCLE_TIME_MS: u64 = 10;

/// Default profile velocity [RPM].
pub const DEFAULT_VELOCITY_RPM: u32 = 60;

/// Default cross-coupling gain.
pub const DEFAULT_COUPLING_GAIN: f64 = 0.10;

/// Default adjacent-axis sync deviation threshold [mm].
pub const DEFAULT_MAX_SYNC_ERROR_MM: f64 = 0.5;

// ─── Lifecycle Budgets ──────────────────────────────────────────────

/// Bus init attempts before giving up.
pub const INIT_ATTEMPTS: u32 = 3;

/// Backoff between init attempts [s].
pub const INIT_BACKOFF_S: f64 = 1.0;

/// OP transition attempts before giving up.
pub const OP_ATTEMPTS: u32 = 3;

/// Backoff between OP attempts [s].
pub const OP_BACKOFF_S: f64 = 0.5;

/// Time budget for all slaves to reach OP within one attempt [s].
pub const OP_WAIT_S: f64 = 4.0;

// ─── Object Dictionary ──────────────────────────────────────────────

/// 0x6040 Controlword.
pub const OD_CONTROLWORD: u16 = 0x6040;
/// 0x6041 Statusword.
pub const OD_STATUSWORD: u16 = 0x6041;
/// 0x6060 Modes of Operation.
pub const OD_MODES_OF_OPERATION: u16 = 0x6060;
/// 0x6064 Position Actual Value.
pub const OD_POSITION_ACTUAL: u16 = 0x6064;
/// 0x6065 Following Error Window.
pub const OD_FOLLOWING_ERROR_WINDOW: u16 = 0x6065;
/// 0x6067 Position Window.
pub const OD_POSITION_WINDOW: u16 = 0x6067;
/// 0x607A Target Position.
pub const OD_TARGET_POSITION: u16 = 0x607A;
/// 0x6081 Profile Velocity.
pub const OD_PROFILE_VELOCITY: u16 = 0x6081;
/// 0x6083 Profile Acceleration.
pub const OD_PROFILE_ACCELERATION: u16 = 0x6083;
/// 0x6084 Profile Deceleration.
pub const OD_PROFILE_DECELERATION: u16 = 0x6084;
/// 0x1600 RxPDO mapping object.
pub const OD_RXPDO_MAP: u16 = 0x1600;
/// 0x1A00 TxPDO mapping object.
pub const OD_TXPDO_MAP: u16 = 0x1A00;
/// 0x1C12 Sync manager 2 PDO assignment.
pub const OD_SM2_ASSIGN: u16 = 0x1C12;
/// 0x1C13 Sync manager 3 PDO assignment.
pub const OD_SM3_ASSIGN: u16 = 0x1C13;

/// Modes of Operation value for Cyclic Synchronous Position.
pub const MODE_CSP: i8 = 8;

/// RxPDO entry: Controlword, 16 bit (`index:sub:len` packed).
pub const PDO_ENTRY_CONTROLWORD: u32 = 0x6040_0010;
/// RxPDO entry: Target Position, 32 bit.
pub const PDO_ENTRY_TARGET_POSITION: u32 = 0x607A_0020;
/// TxPDO entry: Statusword, 16 bit.
pub const PDO_ENTRY_STATUSWORD: u32 = 0x6041_0010;
/// TxPDO entry: Position Actual Value, 32 bit.
pub const PDO_ENTRY_POSITION_ACTUAL: u32 = 0x6064_0020;

/// RxPDO / TxPDO payload size per slave [bytes].
pub const PDO_FRAME_LEN: usize = 6;
