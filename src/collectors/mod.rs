//! Collectors module for device telemetry.
//!
//! This module contains the counter-backed collectors (CPU ticks, block I/O,
//! memory) and the node-backed probes for per-core frequency, SoC power,
//! GPU clock and thermal sensors.

pub mod block;
pub mod cpu_core;
pub mod cpu_stat;
pub mod gpu;
pub mod memory;
pub mod sensors;
pub mod soc;

/// Wall-clock time in milliseconds, as stored in samples.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
