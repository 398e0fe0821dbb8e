//! Tandem Common Library
//!
//! Shared leaf types for the tandem motion workspace: system constants,
//! CiA 402 word definitions, unit conversions, configuration loading,
//! and the command sum type consumed by the control loop.
//!
//! # Module Structure
//!
//! - [`consts`] - System-wide numeric constants and object dictionary indices
//! - [`status`] - CiA 402 statusword bit definitions
//! - [`units`] - mm ↔ pulse conversions on the driver scale
//! - [`config`] - TOML configuration types and validation
//! - [`command`] - Commands accepted by the control loop

pub mod command;
pub mod config;
pub mod consts;
pub mod status;
pub mod units;
