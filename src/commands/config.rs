//! Config command implementation.
//!
//! Generates configuration files in various formats.

use std::fs;
use std::path::PathBuf;

use herakles_device_probe::config::{render_config, Config, ConfigFormat};

/// Generates configuration files.
pub fn command_config(
    output: Option<PathBuf>,
    format: ConfigFormat,
    commented: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();
    let output = match output {
        Some(path) => path,
        None => PathBuf::from(match format {
            ConfigFormat::Json => "herakles-device-probe.json",
            ConfigFormat::Toml => "herakles-device-probe.toml",
            ConfigFormat::Yaml => "herakles-device-probe.yaml",
        }),
    };

    let mut content = render_config(&config, format)?;
    if commented && matches!(format, ConfigFormat::Yaml) {
        content = add_config_comments(content);
    }

    if output.to_string_lossy() == "-" {
        print!("{}", content);
    } else {
        fs::write(&output, content)?;
        println!("✅ Configuration written to: {}", output.display());
    }

    Ok(())
}

/// Adds comments to YAML configuration.
fn add_config_comments(yaml: String) -> String {
    let comments = r#"# Herakles Device Probe Configuration
# ===================================
#
# Paths
# -----
# paths:
#   proc_root: /proc           # Root of the proc filesystem
#   sys_root: /sys             # Root of the sys filesystem
#
# Block Devices
# -------------
# block_mounts: ["/data", "/"] # Mount points resolved through /proc/mounts
# block_devices: []            # Extra device names under /sys/class/block
#
# Privileged Access
# -----------------
# privileged_command: null     # e.g. ["su", "-c", "cat {path}"]; {path} is
#                              # replaced by the node, appended when absent
#
# Probes
# ------
# enable_soc: true             # SoC temperature and battery power
# enable_gpu: true             # GPU clock and governor
# enable_sensors: false        # Thermal zone dump
#
# Sampling
# --------
# interval_ms: 1000            # Milliseconds between snapshots
# count: 0                     # Snapshots to print (0 = forever)
#
# Output
# ------
# output_format: text          # text or html
# separator: null              # Defaults to "\n" (text) or "<br/>" (html)
#
# Logging
# -------
# log_level: "info"            # off, error, warn, info, debug, trace
"#;

    format!("{comments}\n{yaml}")
}
