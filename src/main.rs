//! herakles-device-probe - version 0.1.0
//!
//! Device status snapshots with tracing logging.
//! This is the main entry point that runs the snapshot loop and handles subcommands.

mod cli;
mod commands;
mod startup_checks;

use clap::Parser;
use std::thread;
use std::time::Duration;
use tracing::level_filters::LevelFilter;
use tracing::{debug, error, info};

use cli::{resolve_config, Args, Commands};
use commands::{command_check, command_config, command_stats};
use herakles_device_probe::config::{render_config, validate_effective_config, Config};
use herakles_device_probe::{DeviceContext, ProbeRegistry};

/// Initializes tracing logging subsystem with configured log level.
///
/// Logs go to stderr so stdout carries only snapshot text.
fn setup_logging(config: &Config) {
    let log_level = match config.log_level.as_deref().unwrap_or("info") {
        "off" => LevelFilter::OFF,
        "error" => LevelFilter::ERROR,
        "warn" => LevelFilter::WARN,
        "debug" => LevelFilter::DEBUG,
        "trace" => LevelFilter::TRACE,
        _ => LevelFilter::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    debug!("Logging initialized with level: {}", log_level);
}

/// Helper function to load and validate configuration.
/// Exits the process with error code 1 if validation fails.
fn load_validated_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let config = resolve_config(args)?;
    if let Err(e) = validate_effective_config(&config) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }
    Ok(config)
}

/// Prints snapshots every `interval_ms`, `count` times (0 = forever).
fn run_snapshots(config: &Config) {
    let ctx = DeviceContext::discover(config);
    let mut registry = ProbeRegistry::new(&ctx, config);
    let interval = Duration::from_millis(config.interval_ms());
    let count = config.count.unwrap_or(0);

    let mut taken = 0u64;
    loop {
        println!("{}", registry.render_snapshot());
        taken += 1;
        if count != 0 && taken >= count {
            break;
        }
        thread::sleep(interval);
    }

    debug!(
        "{} snapshots, {} render failures",
        taken,
        registry.stats().failures()
    );
}

/// Main application entry point.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Early config resolution for show/check modes
    if args.show_config || args.check_config {
        let config = resolve_config(&args)?;

        if args.check_config {
            if let Err(e) = validate_effective_config(&config) {
                eprintln!("❌ Configuration invalid: {}", e);
                std::process::exit(1);
            }
            println!("✅ Configuration is valid");
            return Ok(());
        }

        println!("{}", render_config(&config, args.config_format)?);
        return Ok(());
    }

    // Config generation needs no device access
    if let Some(Commands::Config {
        output,
        format,
        commented,
    }) = &args.command
    {
        return command_config(output.clone(), *format, *commented);
    }

    let config = load_validated_config(&args)?;
    setup_logging(&config);

    if let Some(command) = &args.command {
        return match command {
            Commands::Check { verbose } => command_check(*verbose, &config),
            Commands::Stats { snapshots, verbose } => command_stats(*snapshots, *verbose, &config),
            Commands::Config { .. } => unreachable!("Config handled above"),
        };
    }

    info!("Starting herakles-device-probe");
    if let Err(e) = startup_checks::validate_requirements(&config) {
        error!("❌ Startup validation failed: {}", e);
        std::process::exit(1);
    }

    run_snapshots(&config);
    Ok(())
}
