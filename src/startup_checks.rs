//! Startup requirement validation for herakles-device-probe.
//!
//! This module checks that the counter roots exist and warns when the
//! process runs without privileges and without a privileged helper.

use nix::unistd::geteuid;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use herakles_device_probe::config::Config;

/// Validate all runtime requirements
pub fn validate_requirements(config: &Config) -> Result<(), ValidationError> {
    debug!("Validating runtime requirements...");

    check_user_privileges(config);
    check_root(&config.paths.proc_root)?;
    check_root(&config.paths.sys_root)?;
    check_stat_access(&config.paths.proc_root.join("stat"))?;

    debug!("Runtime requirements validated");
    Ok(())
}

/// Check if running with sufficient privileges
fn check_user_privileges(config: &Config) {
    if geteuid().is_root() {
        debug!("Running as root (uid=0)");
        return;
    }
    if config.privileged_command.is_none() {
        warn!("⚠️  Not running as root and no privileged_command configured");
        warn!("   Nodes that deny access (some thermal and power nodes) will be skipped");
    }
}

fn check_root(root: &Path) -> Result<(), ValidationError> {
    if root.is_dir() {
        Ok(())
    } else {
        error!("❌ {} is not a directory", root.display());
        Err(ValidationError::RootMissing(root.to_path_buf()))
    }
}

/// Checks that the CPU tick counters can be read.
fn check_stat_access(stat: &Path) -> Result<(), ValidationError> {
    match fs::metadata(stat) {
        Ok(_) => {
            info!("✅ {} accessible", stat.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            error!("❌ Cannot read {} - insufficient permissions", stat.display());
            Err(ValidationError::InsufficientPermissions(e.to_string()))
        }
        Err(e) => {
            warn!("⚠️  Could not test {}: {}", stat.display(), e);
            Ok(())
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Insufficient permissions: {0}")]
    InsufficientPermissions(String),

    #[error("counter root {0} not found")]
    RootMissing(PathBuf),
}
