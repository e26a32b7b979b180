//! Herakles Device Probe Library
//!
//! This library samples kernel counter pseudo-files (CPU ticks, memory
//! counters, block device I/O, thermal and power nodes) and renders a compact
//! status snapshot on demand.
//!
//! # Features
//!
//! - **Delta-based rates**: CPU utilization and block I/O are derived from two
//!   consecutive samples held in a preallocated double buffer
//! - **Privileged fallback**: nodes that refuse a normal read are retried once
//!   through a configurable helper command
//! - **Contained failures**: a probe that breaks is logged and dropped, never
//!   aborting the snapshot
//!
//! # Usage
//!
//! ```rust,no_run
//! use herakles_device_probe::{Config, DeviceContext, ProbeRegistry};
//!
//! let config = Config::default();
//! let ctx = DeviceContext::discover(&config);
//! let mut registry = ProbeRegistry::new(&ctx, &config);
//!
//! for _ in 0..3 {
//!     print!("{}", registry.render_snapshot());
//!     std::thread::sleep(std::time::Duration::from_millis(config.interval_ms()));
//! }
//! ```

pub mod collectors;
pub mod config;
pub mod device;
pub mod error;
pub mod extract;
pub mod probe;
pub mod registry;
pub mod render;
pub mod source;
pub mod stats;

// Re-export main types for convenience
pub use collectors::cpu_stat::CpuStat;
pub use config::Config;
pub use device::DeviceContext;
pub use error::{ErrorKind, ProbeError};
pub use probe::{Probe, RenderOutcome};
pub use registry::ProbeRegistry;
pub use render::{Fragment, OutputFormat};
pub use source::{CommandReader, CounterSource, PrivilegedReader, Unprivileged};
pub use stats::ProbeStats;
