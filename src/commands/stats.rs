//! Stats command implementation.
//!
//! Takes a few snapshots and prints the engine's probe statistics.

use std::thread;
use std::time::Duration;

use herakles_device_probe::config::Config;
use herakles_device_probe::{DeviceContext, ProbeRegistry};

pub fn command_stats(
    snapshots: u64,
    verbose: bool,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = DeviceContext::discover(config);
    let mut registry = ProbeRegistry::new(&ctx, config);
    let interval = Duration::from_millis(config.interval_ms());

    for i in 0..snapshots {
        if i > 0 {
            thread::sleep(interval);
        }
        let snapshot = registry.render_snapshot();
        if verbose {
            println!("{}", snapshot);
        }
    }

    print!("{}", registry.stats().render_table());
    Ok(())
}
