//! Check command implementation.
//!
//! Reports which counter sources and probes are available on this device.

use std::path::Path;

use herakles_device_probe::config::{validate_effective_config, Config};
use herakles_device_probe::{CounterSource, DeviceContext, ProbeRegistry};

/// Opens `path` the way a probe would and prints the outcome.
fn check_source(label: &str, path: &Path, ctx: &DeviceContext) -> bool {
    match CounterSource::open(path, ctx.privileged.clone()) {
        Ok(source) => {
            println!("   ✅ {} ({}, {:?})", label, path.display(), source.state());
            true
        }
        Err(e) => {
            println!("   ❌ {}: {}", label, e);
            false
        }
    }
}

/// Validates configuration and reports available probes.
pub fn command_check(verbose: bool, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Herakles Device Probe - System Check");
    println!("=======================================");

    // Check configuration
    println!("\n⚙️  Checking configuration...");
    let mut config_ok = true;
    match validate_effective_config(config) {
        Ok(_) => println!("   ✅ Configuration is valid"),
        Err(e) => {
            println!("   ❌ Configuration invalid: {}", e);
            config_ok = false;
        }
    }

    let ctx = DeviceContext::discover(config);

    println!("\n📁 Checking counter sources...");
    check_source("cpu ticks", &ctx.stat_path(), &ctx);
    check_source("memory", &ctx.meminfo_path(), &ctx);
    for device in &ctx.block_devices {
        check_source(&format!("block {}", device.name), &device.stat, &ctx);
    }

    println!("\n🧭 Device capabilities...");
    println!("   cores: {}", ctx.cores.len());
    println!("   thermal zones: {}", ctx.thermal_zones.len());
    for (label, node) in [
        ("SoC temperature", &ctx.soc_temperature),
        ("battery temperature", &ctx.battery_temperature),
        ("GPU temperature", &ctx.gpu_temperature),
    ] {
        match node {
            Some(path) => println!("   ✅ {} ({})", label, path.display()),
            None => println!("   ⚠️  {} not found", label),
        }
    }
    println!(
        "   model: {}  soc_id: {}",
        ctx.model.as_deref().unwrap_or("unknown"),
        ctx.soc_id.as_deref().unwrap_or("unknown")
    );

    println!("\n📊 Registered probes...");
    let mut registry = ProbeRegistry::new(&ctx, config);
    let present = registry.present();
    for name in &present {
        println!("   ✅ {}", name);
    }

    if verbose {
        println!("\n📝 Snapshot:");
        print!("{}", registry.render_snapshot());
    }

    println!("\n📋 Summary:");
    if config_ok && !present.is_empty() {
        println!("   ✅ {} probes available", present.len());
        Ok(())
    } else {
        println!("   ❌ Nothing to report on this device - please review warnings");
        std::process::exit(1);
    }
}
