//! Configuration management for herakles-device-probe.
//!
//! This module handles loading and validating configuration from files.
//! It supports YAML, JSON, and TOML formats; CLI overrides are merged on top
//! by the binary.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::render::OutputFormat;
use crate::source::{CommandReader, SharedReader, Unprivileged};

// Default configuration constants
pub const DEFAULT_PROC_ROOT: &str = "/proc";
pub const DEFAULT_SYS_ROOT: &str = "/sys";
pub const DEFAULT_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_BLOCK_MOUNTS: [&str; 2] = ["/data", "/"];

/// Configuration format options for output
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Roots of the kernel pseudo filesystems.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_proc_root", alias = "proc-root")]
    pub proc_root: PathBuf,

    #[serde(default = "default_sys_root", alias = "sys-root")]
    pub sys_root: PathBuf,
}

fn default_proc_root() -> PathBuf {
    PathBuf::from(DEFAULT_PROC_ROOT)
}
fn default_sys_root() -> PathBuf {
    PathBuf::from(DEFAULT_SYS_ROOT)
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            proc_root: default_proc_root(),
            sys_root: default_sys_root(),
        }
    }
}

/// Probe configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Block devices
    #[serde(alias = "block-mounts")]
    pub block_mounts: Option<Vec<String>>,
    #[serde(alias = "block-devices")]
    pub block_devices: Option<Vec<String>>,

    /// argv of the privileged helper, `{path}` is replaced by the node path
    #[serde(alias = "privileged-command")]
    pub privileged_command: Option<Vec<String>>,

    // Probe enable flags
    #[serde(alias = "enable-soc")]
    pub enable_soc: Option<bool>,
    #[serde(alias = "enable-gpu")]
    pub enable_gpu: Option<bool>,
    #[serde(alias = "enable-sensors")]
    pub enable_sensors: Option<bool>,

    // Sampling
    #[serde(alias = "interval-ms")]
    pub interval_ms: Option<u64>,
    pub count: Option<u64>,

    // Output
    #[serde(alias = "output-format")]
    pub output_format: Option<OutputFormat>,
    pub separator: Option<String>,

    // Logging
    #[serde(alias = "log-level")]
    pub log_level: Option<String>,

    // TOML output requires tables after plain values
    #[serde(default)]
    pub paths: PathsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            block_mounts: Some(DEFAULT_BLOCK_MOUNTS.iter().map(|m| m.to_string()).collect()),
            block_devices: Some(Vec::new()),
            privileged_command: None,
            enable_soc: Some(true),
            enable_gpu: Some(true),
            enable_sensors: Some(false),
            interval_ms: Some(DEFAULT_INTERVAL_MS),
            count: Some(0),
            output_format: Some(OutputFormat::Text),
            separator: None,
            log_level: Some("info".into()),
            paths: PathsConfig::default(),
        }
    }
}

impl Config {
    pub fn output_format(&self) -> OutputFormat {
        self.output_format.unwrap_or_default()
    }

    /// Separator appended after every fragment.
    pub fn separator(&self) -> String {
        self.separator
            .clone()
            .unwrap_or_else(|| self.output_format().separator().to_string())
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms.unwrap_or(DEFAULT_INTERVAL_MS)
    }

    /// Privileged fallback for denied reads; denies everything when unset.
    pub fn privileged_reader(&self) -> SharedReader {
        match self
            .privileged_command
            .clone()
            .and_then(CommandReader::new)
        {
            Some(reader) => Arc::new(reader),
            None => Arc::new(Unprivileged),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("interval_ms must be greater than 0 when taking more than one snapshot")]
    ZeroInterval,

    #[error("privileged_command is set but empty")]
    EmptyPrivilegedCommand,

    #[error("paths.{0} must not be empty")]
    EmptyRoot(&'static str),

    #[error("invalid log_level '{0}', expected off, error, warn, info, debug or trace")]
    InvalidLogLevel(String),
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.interval_ms == Some(0) && cfg.count != Some(1) {
        return Err(ConfigError::ZeroInterval);
    }

    if let Some(argv) = &cfg.privileged_command {
        if CommandReader::new(argv.clone()).is_none() {
            return Err(ConfigError::EmptyPrivilegedCommand);
        }
    }

    if cfg.paths.proc_root.as_os_str().is_empty() {
        return Err(ConfigError::EmptyRoot("proc_root"));
    }
    if cfg.paths.sys_root.as_os_str().is_empty() {
        return Err(ConfigError::EmptyRoot("sys_root"));
    }

    if let Some(level) = cfg.log_level.as_deref() {
        match level {
            "off" | "error" | "warn" | "info" | "debug" | "trace" => {}
            other => return Err(ConfigError::InvalidLogLevel(other.to_string())),
        }
    }

    Ok(())
}

/// Configuration loading with multiple format support
pub fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let path = if let Some(p) = path {
        PathBuf::from(p)
    } else {
        // Try default locations
        let defaults = [
            "/etc/herakles/device-probe.yaml",
            "/etc/herakles/device-probe.yml",
            "/etc/herakles/device-probe.json",
            "/etc/herakles/device-probe.toml",
            "./herakles-device-probe.yaml",
            "./herakles-device-probe.yml",
            "./herakles-device-probe.json",
            "./herakles-device-probe.toml",
        ];

        defaults
            .iter()
            .find(|p| Path::new(p).exists())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(""))
    };

    if path.as_os_str().is_empty() || !path.exists() {
        return Ok(Config::default());
    }

    let content = fs::read_to_string(&path)?;

    match path.extension().and_then(|s| s.to_str()) {
        Some("json") => {
            let config: Config = serde_json::from_str(&content)?;
            info!("Loaded JSON configuration from: {}", path.display());
            Ok(config)
        }
        Some("toml") => {
            let config: Config = toml::from_str(&content)?;
            info!("Loaded TOML configuration from: {}", path.display());
            Ok(config)
        }
        _ => {
            // Default to YAML
            let config: Config = serde_yaml::from_str(&content)?;
            info!("Loaded YAML configuration from: {}", path.display());
            Ok(config)
        }
    }
}

/// Serializes configuration in the requested format
pub fn render_config(
    config: &Config,
    format: ConfigFormat,
) -> Result<String, Box<dyn std::error::Error>> {
    Ok(match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(validate_effective_config(&config).is_ok());
        assert_eq!(config.separator(), "\n");
        assert_eq!(config.interval_ms(), 1000);
    }

    #[test]
    fn test_zero_interval_rejected_for_loops() {
        let mut config = Config {
            interval_ms: Some(0),
            ..Config::default()
        };
        assert!(matches!(
            validate_effective_config(&config),
            Err(ConfigError::ZeroInterval)
        ));

        config.count = Some(1);
        assert!(validate_effective_config(&config).is_ok());
    }

    #[test]
    fn test_empty_privileged_command_rejected() {
        let config = Config {
            privileged_command: Some(vec![]),
            ..Config::default()
        };
        assert!(matches!(
            validate_effective_config(&config),
            Err(ConfigError::EmptyPrivilegedCommand)
        ));
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let config = Config {
            log_level: Some("loud".into()),
            ..Config::default()
        };
        assert!(validate_effective_config(&config).is_err());
    }

    #[test]
    fn test_load_yaml_with_aliases() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("probe.yaml");
        fs::write(
            &path,
            "paths:\n  proc-root: /tmp/proc\nblock-devices: [sda]\nenable-sensors: true\noutput_format: html\n",
        )
        .expect("write");

        let config = load_config(Some(&path)).expect("load yaml");
        assert_eq!(config.paths.proc_root, PathBuf::from("/tmp/proc"));
        assert_eq!(config.paths.sys_root, PathBuf::from("/sys"));
        assert_eq!(config.block_devices, Some(vec!["sda".to_string()]));
        assert_eq!(config.enable_sensors, Some(true));
        assert_eq!(config.output_format(), OutputFormat::Html);
        assert_eq!(config.separator(), "<br/>");
    }

    #[test]
    fn test_load_json_and_toml() {
        let dir = tempdir().expect("Failed to create temp dir");

        let json = dir.path().join("probe.json");
        fs::write(&json, r#"{"interval_ms": 250, "privileged_command": ["sudo", "-n", "cat"]}"#)
            .expect("write");
        let config = load_config(Some(&json)).expect("load json");
        assert_eq!(config.interval_ms(), 250);

        let toml_path = dir.path().join("probe.toml");
        fs::write(&toml_path, "count = 3\nseparator = \" | \"\n").expect("write");
        let config = load_config(Some(&toml_path)).expect("load toml");
        assert_eq!(config.count, Some(3));
        assert_eq!(config.separator(), " | ");
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempdir().expect("Failed to create temp dir");
        let config = load_config(Some(&dir.path().join("absent.yaml"))).expect("defaults");
        assert_eq!(config.enable_sensors, Some(false));
    }

    #[test]
    fn test_render_config_formats() {
        let config = Config::default();
        for format in [ConfigFormat::Yaml, ConfigFormat::Json, ConfigFormat::Toml] {
            let text = render_config(&config, format).expect("render");
            assert!(text.contains("interval_ms"));
        }
    }
}
