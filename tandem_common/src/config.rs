//! Bus and axis configuration.
//!
//! TOML-backed configuration with semantic validation, loaded once before
//! bus start and immutable while the loop runs.
//!
//! # TOML Example
//!
//! ```toml
//! adapter = "enp3s0"
//! cycle_time_ms = 10
//!
//! [coupling]
//! enabled = true
//! gain = 0.1
//!
//! [sync_guard]
//! max_error_mm = 0.5
//! trip_cycles = 1
//!
//! [[axes]]
//! kind = "z"
//! velocity_rpm = 50
//! accel_rpm_s = 50
//!
//! [[axes]]
//! kind = "z"
//! velocity_rpm = 50
//! accel_rpm_s = 50
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::{
    DEFAULT_COUPLING_GAIN, DEFAULT_CYCLE_TIME_MS, DEFAULT_MAX_SYNC_ERROR_MM,
    DEFAULT_VELOCITY_RPM,
};
use crate::units::AxisKind;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at the given path.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parsing failed.
    #[error("failed to parse configuration: {0}")]
    Parse(String),

    /// Semantic validation failed.
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

/// Per-axis configuration, immutable while the bus runs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AxisConfig {
    /// Mechanical axis kind (selects mm-per-rev).
    #[serde(default)]
    pub kind: AxisKind,

    /// Profile velocity [RPM]. Drives both the 0x6081 SDO and trajectory
    /// durations.
    #[serde(default = "default_velocity")]
    pub velocity_rpm: u32,

    /// Profile acceleration [RPM/s], written to 0x6083 when set.
    #[serde(default)]
    pub accel_rpm_s: Option<u32>,

    /// Profile deceleration [RPM/s], written to 0x6084. Defaults to the
    /// acceleration value when absent.
    #[serde(default)]
    pub decel_rpm_s: Option<u32>,
}

impl Default for AxisConfig {
    fn default() -> Self {
        Self {
            kind: AxisKind::X,
            velocity_rpm: DEFAULT_VELOCITY_RPM,
            accel_rpm_s: None,
            decel_rpm_s: None,
        }
    }
}

impl AxisConfig {
    /// Effective deceleration: explicit value or the acceleration.
    #[inline]
    pub fn effective_decel(&self) -> Option<u32> {
        self.decel_rpm_s.or(self.accel_rpm_s)
    }
}

/// Cross-coupling stage configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CouplingConfig {
    /// Whether the coupling stage starts enabled.
    #[serde(default)]
    pub enabled: bool,

    /// Correction gain, 0.0–1.0.
    #[serde(default = "default_gain")]
    pub gain: f64,
}

impl Default for CouplingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            gain: DEFAULT_COUPLING_GAIN,
        }
    }
}

/// Sync-deviation guard configuration.
///
/// Off by default: the guard assumes adjacent slaves are commanded as a
/// coupled pair and trips on intentional divergence otherwise.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SyncGuardConfig {
    /// Whether the guard monitors at all.
    #[serde(default)]
    pub enabled: bool,

    /// Maximum tolerated adjacent-axis position deviation [mm].
    #[serde(default = "default_sync_error")]
    pub max_error_mm: f64,

    /// Consecutive over-threshold cycles required to trip.
    #[serde(default = "default_trip_cycles")]
    pub trip_cycles: u32,
}

impl Default for SyncGuardConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_error_mm: DEFAULT_MAX_SYNC_ERROR_MM,
            trip_cycles: 1,
        }
    }
}

/// Real-time scheduling options for the loop thread.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RtConfig {
    /// CPU core to pin the loop thread to (no pinning when absent).
    #[serde(default)]
    pub cpu: Option<usize>,

    /// SCHED_FIFO priority (1–99).
    #[serde(default = "default_rt_priority")]
    pub priority: i32,
}

impl Default for RtConfig {
    fn default() -> Self {
        Self {
            cpu: None,
            priority: 80,
        }
    }
}

/// Top-level bus configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Network adapter name handed to the master.
    pub adapter: String,

    /// Control cycle period [ms].
    #[serde(default = "default_cycle_time")]
    pub cycle_time_ms: u64,

    /// Real-time scheduling of the loop thread.
    #[serde(default)]
    pub rt: RtConfig,

    /// Cross-coupling stage.
    #[serde(default)]
    pub coupling: CouplingConfig,

    /// Sync-deviation guard.
    #[serde(default)]
    pub sync_guard: SyncGuardConfig,

    /// One entry per expected slave, in bus order.
    pub axes: Vec<AxisConfig>,
}

fn default_velocity() -> u32 {
    DEFAULT_VELOCITY_RPM
}

fn default_gain() -> f64 {
    DEFAULT_COUPLING_GAIN
}

fn default_sync_error() -> f64 {
    DEFAULT_MAX_SYNC_ERROR_MM
}

fn default_trip_cycles() -> u32 {
    1
}

fn default_cycle_time() -> u64 {
    DEFAULT_CYCLE_TIME_MS
}

fn default_rt_priority() -> i32 {
    80
}

impl BusConfig {
    /// Load and validate a configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path.display().to_string()))?;
        let config: Self =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Expected slave count (one axis entry per slave).
    #[inline]
    pub fn slave_count(&self) -> usize {
        self.axes.len()
    }

    /// Semantic validation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.adapter.is_empty() {
            return Err(ConfigError::Validation("adapter cannot be empty".into()));
        }
        if self.axes.is_empty() {
            return Err(ConfigError::Validation(
                "at least one axis must be configured".into(),
            ));
        }
        if self.cycle_time_ms == 0 {
            return Err(ConfigError::Validation("cycle_time_ms must be > 0".into()));
        }
        for (idx, axis) in self.axes.iter().enumerate() {
            if axis.velocity_rpm == 0 {
                return Err(ConfigError::Validation(format!(
                    "axis {idx}: velocity_rpm must be > 0"
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.coupling.gain) {
            return Err(ConfigError::Validation(format!(
                "coupling gain {} outside 0.0–1.0",
                self.coupling.gain
            )));
        }
        if self.coupling.enabled {
            let first = self.axes[0].kind;
            if self.axes.iter().any(|a| a.kind != first) {
                return Err(ConfigError::Validation(
                    "coupling requires all axes to share one kind".into(),
                ));
            }
        }
        if self.sync_guard.max_error_mm <= 0.0 {
            return Err(ConfigError::Validation(
                "sync_guard.max_error_mm must be > 0".into(),
            ));
        }
        if self.sync_guard.trip_cycles == 0 {
            return Err(ConfigError::Validation(
                "sync_guard.trip_cycles must be ≥ 1".into(),
            ));
        }
        if !(1..=99).contains(&self.rt.priority) {
            return Err(ConfigError::Validation(format!(
                "rt.priority {} outside 1–99",
                self.rt.priority
            )));
        }
        Ok(())
    }
}
