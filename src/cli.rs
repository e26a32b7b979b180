//! CLI arguments and subcommands for herakles-device-probe.
//!
//! This module defines the command-line interface structure using the clap library,
//! including all flags, options, and subcommands, and merges CLI overrides
//! into the loaded configuration.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use herakles_device_probe::config::{load_config, Config, ConfigFormat};
use herakles_device_probe::OutputFormat;

/// Log level options for CLI parsing
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "herakles-device-probe",
    about = "Compact device status snapshots from kernel counters",
    long_about = "Compact device status snapshots from kernel counters.\n\n\
                  Samples CPU ticks, memory counters, block device I/O and thermal/power \
                  nodes from /proc and /sys and prints a short status document at a fixed \
                  interval. Nodes that refuse a normal read can be retried through a \
                  privileged helper command.",
    author = "Michael Moll <exporter@herakles.now> - Herakles",
    version = "0.1.0",
    propagate_version = true,
    after_help = "More info: https://www.herakles.now"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Log level (overrides log_level from the config file)
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Milliseconds between snapshots
    #[arg(short = 'i', long)]
    pub interval_ms: Option<u64>,

    /// Number of snapshots to print (0 = run until interrupted)
    #[arg(short = 'n', long)]
    pub count: Option<u64>,

    /// Snapshot markup
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Text appended after every fragment
    #[arg(long)]
    pub separator: Option<String>,

    /// Root of the proc filesystem
    #[arg(long)]
    pub proc_root: Option<PathBuf>,

    /// Root of the sys filesystem
    #[arg(long)]
    pub sys_root: Option<PathBuf>,

    /// Mount point whose block device is monitored (repeatable)
    #[arg(long = "block-mount")]
    pub block_mounts: Vec<String>,

    /// Block device name to monitor, e.g. sda (repeatable)
    #[arg(long = "block-device")]
    pub block_devices: Vec<String>,

    /// Helper command for denied reads, e.g. "sudo -n cat {path}".
    /// Split on whitespace only; quotes are not interpreted
    #[arg(long, conflicts_with = "privileged_args")]
    pub privileged_command: Option<String>,

    /// One argument of the helper command per use, for arguments that
    /// contain spaces: --privileged-arg su --privileged-arg -c --privileged-arg "cat {path}"
    #[arg(long = "privileged-arg", allow_hyphen_values = true)]
    pub privileged_args: Vec<String>,

    /// Include the thermal zone dump
    #[arg(long)]
    pub enable_sensors: bool,

    /// Disable the SoC/battery probe
    #[arg(long)]
    pub disable_soc: bool,

    /// Disable the GPU probe
    #[arg(long)]
    pub disable_gpu: bool,
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Report which counter sources and probes are available
    Check {
        /// Also print one snapshot
        #[arg(long)]
        verbose: bool,
    },

    /// Generate configuration files
    Config {
        /// Output file path ("-" for stdout)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,

        /// Include comments and examples
        #[arg(long)]
        commented: bool,
    },

    /// Take snapshots and print probe statistics
    Stats {
        /// Number of snapshots to take
        #[arg(short = 'n', long, default_value_t = 5)]
        snapshots: u64,

        /// Print every snapshot as well
        #[arg(long)]
        verbose: bool,
    },
}

/// Loads the config file and applies CLI overrides (CLI > file > defaults).
pub fn resolve_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    if let Some(level) = args.log_level {
        config.log_level = Some(level.as_str().to_string());
    }

    // Sampling
    if args.interval_ms.is_some() {
        config.interval_ms = args.interval_ms;
    }
    if args.count.is_some() {
        config.count = args.count;
    }

    // Output
    if args.format.is_some() {
        config.output_format = args.format;
    }
    if let Some(separator) = &args.separator {
        config.separator = Some(unescape(separator));
    }

    // Paths
    if let Some(root) = &args.proc_root {
        config.paths.proc_root = root.clone();
    }
    if let Some(root) = &args.sys_root {
        config.paths.sys_root = root.clone();
    }

    if !args.block_mounts.is_empty() {
        config.block_mounts = Some(args.block_mounts.clone());
    }
    if !args.block_devices.is_empty() {
        config.block_devices = Some(args.block_devices.clone());
    }

    if let Some(command) = &args.privileged_command {
        config.privileged_command =
            Some(command.split_whitespace().map(str::to_string).collect());
    } else if !args.privileged_args.is_empty() {
        config.privileged_command = Some(args.privileged_args.clone());
    }

    // Probe enable flags
    if args.enable_sensors {
        config.enable_sensors = Some(true);
    }
    if args.disable_soc {
        config.enable_soc = Some(false);
    }
    if args.disable_gpu {
        config.enable_gpu = Some(false);
    }

    Ok(config)
}

/// Turns `\n` and `\t` typed on the command line into the real characters.
fn unescape(raw: &str) -> String {
    raw.replace("\\n", "\n").replace("\\t", "\t")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_defaults() {
        let args = Args::parse_from([
            "herakles-device-probe",
            "--no-config",
            "-i",
            "250",
            "-n",
            "3",
            "--format",
            "html",
            "--block-device",
            "sda",
            "--block-device",
            "nvme0n1",
            "--privileged-command",
            "sudo -n cat {path}",
            "--disable-gpu",
            "--separator",
            " | ",
        ]);
        let config = resolve_config(&args).expect("resolve");

        assert_eq!(config.interval_ms, Some(250));
        assert_eq!(config.count, Some(3));
        assert_eq!(config.output_format(), OutputFormat::Html);
        assert_eq!(
            config.block_devices,
            Some(vec!["sda".to_string(), "nvme0n1".to_string()])
        );
        assert_eq!(
            config.privileged_command,
            Some(vec![
                "sudo".to_string(),
                "-n".to_string(),
                "cat".to_string(),
                "{path}".to_string()
            ])
        );
        assert_eq!(config.enable_gpu, Some(false));
        assert_eq!(config.enable_soc, Some(true));
        assert_eq!(config.separator(), " | ");
    }

    #[test]
    fn test_privileged_args_keep_spaces() {
        let args = Args::parse_from([
            "herakles-device-probe",
            "--no-config",
            "--privileged-arg",
            "su",
            "--privileged-arg",
            "-c",
            "--privileged-arg",
            "cat {path}",
        ]);
        let config = resolve_config(&args).expect("resolve");
        assert_eq!(
            config.privileged_command,
            Some(vec![
                "su".to_string(),
                "-c".to_string(),
                "cat {path}".to_string()
            ])
        );
    }

    #[test]
    fn test_privileged_forms_conflict() {
        let result = Args::try_parse_from([
            "herakles-device-probe",
            "--privileged-command",
            "sudo -n cat",
            "--privileged-arg",
            "su",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_separator_escapes() {
        assert_eq!(unescape("\\n"), "\n");
        assert_eq!(unescape("a\\tb"), "a\tb");
    }

    #[test]
    fn test_subcommand_parsing() {
        let args = Args::parse_from(["herakles-device-probe", "stats", "-n", "2"]);
        assert!(matches!(
            args.command,
            Some(Commands::Stats {
                snapshots: 2,
                verbose: false
            })
        ));
    }
}
