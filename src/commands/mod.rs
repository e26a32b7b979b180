//! CLI command implementations for herakles-device-probe.
//!
//! This module provides implementations for all CLI subcommands:
//! - `check`: Counter source and probe availability
//! - `config`: Configuration file generation
//! - `stats`: Probe statistics over a few snapshots

pub mod check;
pub mod config;
pub mod stats;

// Re-export command functions
pub use check::command_check;
pub use config::command_config;
pub use stats::command_stats;
