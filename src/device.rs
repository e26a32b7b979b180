//! Platform facts gathered once per session.
//!
//! [`DeviceContext::discover`] walks the sysfs and procfs trees below the
//! configured roots and records which nodes exist: CPU cores and their
//! cpufreq/thermal nodes, thermal zones, power-supply nodes, the block
//! devices behind the configured mount points and a few identity strings.
//! Every probe constructor receives the context by reference.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::render::celsius_from_raw;
use crate::source::{read_node, read_node_i64, SharedReader};

/// One CPU core as exposed under `devices/system/cpu/cpuN`.
#[derive(Debug, Clone)]
pub struct CoreInfo {
    pub id: usize,
    pub dir: PathBuf,
    pub cluster: Option<i64>,
    pub policy: Option<usize>,
    /// `temp` node of the thermal zone that names this core.
    pub temperature: Option<PathBuf>,
}

impl CoreInfo {
    pub fn online_path(&self) -> PathBuf {
        self.dir.join("online")
    }

    pub fn governor_path(&self) -> PathBuf {
        self.dir.join("cpufreq/scaling_governor")
    }

    pub fn cur_freq_path(&self) -> PathBuf {
        self.dir.join("cpufreq/scaling_cur_freq")
    }

    pub fn max_freq_path(&self) -> PathBuf {
        self.dir.join("cpufreq/cpuinfo_max_freq")
    }
}

#[derive(Debug, Clone)]
pub struct ThermalZone {
    pub index: usize,
    /// Contents of the zone's `type` node, empty when unreadable.
    pub kind: String,
    pub temp: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDevice {
    pub name: String,
    pub stat: PathBuf,
}

/// Capabilities of the running device.
pub struct DeviceContext {
    pub proc_root: PathBuf,
    pub sys_root: PathBuf,
    pub privileged: SharedReader,
    pub cores: Vec<CoreInfo>,
    pub thermal_zones: Vec<ThermalZone>,
    pub soc_temperature: Option<PathBuf>,
    pub battery_temperature: Option<PathBuf>,
    pub gpu_temperature: Option<PathBuf>,
    pub block_devices: Vec<BlockDevice>,
    pub soc_id: Option<String>,
    pub model: Option<String>,
}

const SOC_ZONE_MARKERS: [&str; 4] = ["soc", "tsens", "cpu-thermal", "x86_pkg_temp"];

impl DeviceContext {
    pub fn discover(config: &Config) -> Self {
        Self::discover_with(config, config.privileged_reader())
    }

    /// Discovery with an explicit privileged reader.
    pub fn discover_with(config: &Config, privileged: SharedReader) -> Self {
        let proc_root = config.paths.proc_root.clone();
        let sys_root = config.paths.sys_root.clone();

        let thermal_zones = discover_thermal_zones(&sys_root.join("class/thermal"));
        let cores = discover_cores(&proc_root, &sys_root, &thermal_zones);
        for core in &cores {
            info!(
                "cpu{} in cluster {} policy {} detected",
                core.id,
                core.cluster.map_or_else(|| "?".to_string(), |c| c.to_string()),
                core.policy.map_or_else(|| "?".to_string(), |p| p.to_string())
            );
        }

        let soc_temperature = find_zone(&thermal_zones, |kind| {
            SOC_ZONE_MARKERS.iter().any(|m| kind.contains(m))
        });
        let gpu_temperature = find_zone(&thermal_zones, |kind| kind.contains("gpu"));

        let battery = sys_root.join("class/power_supply/battery/temp");
        let battery_temperature = battery.exists().then_some(battery);

        let mut names: Vec<String> = Vec::new();
        let mounts = config.block_mounts.clone().unwrap_or_default();
        if !mounts.is_empty() {
            let table = fs::read_to_string(proc_root.join("mounts")).unwrap_or_else(|e| {
                warn!("cannot read {}: {}", proc_root.join("mounts").display(), e);
                String::new()
            });
            for mount in &mounts {
                match block_device_for_mount(&table, mount) {
                    Some(name) => names.push(name),
                    None => warn!("mount point not found: {}", mount),
                }
            }
        }
        names.extend(config.block_devices.clone().unwrap_or_default());

        let mut block_devices: Vec<BlockDevice> = Vec::new();
        for name in names {
            if block_devices.iter().any(|d| d.name == name) {
                continue;
            }
            let stat = sys_root.join("class/block").join(&name).join("stat");
            debug!("block device {} -> {}", name, stat.display());
            block_devices.push(BlockDevice { name, stat });
        }

        let soc_id = read_node(&sys_root.join("devices/soc0/soc_id"), &*privileged).ok();
        let model = read_model(&sys_root, &privileged);

        Self {
            proc_root,
            sys_root,
            privileged,
            cores,
            thermal_zones,
            soc_temperature,
            battery_temperature,
            gpu_temperature,
            block_devices,
            soc_id,
            model,
        }
    }

    pub fn stat_path(&self) -> PathBuf {
        self.proc_root.join("stat")
    }

    pub fn meminfo_path(&self) -> PathBuf {
        self.proc_root.join("meminfo")
    }

    pub fn sys_path(&self, rel: &str) -> PathBuf {
        self.sys_root.join(rel)
    }

    /// Reads a thermal node in degrees Celsius.
    pub fn read_temperature(&self, path: &Path) -> Result<f64> {
        read_node_i64(path, &*self.privileged).map(celsius_from_raw)
    }

    /// Size of the per-core table: highest core id plus one.
    pub fn core_slots(&self) -> usize {
        self.cores.iter().map(|c| c.id + 1).max().unwrap_or(0)
    }
}

/// Parses a kernel cpu list such as `0-3,6`.
pub fn parse_cpu_list(text: &str) -> Vec<usize> {
    let mut ids = Vec::new();
    for part in text.trim().split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.split_once('-') {
            Some((lo, hi)) => {
                if let (Ok(lo), Ok(hi)) = (lo.parse::<usize>(), hi.parse::<usize>()) {
                    ids.extend(lo..=hi);
                }
            }
            None => {
                if let Ok(id) = part.parse::<usize>() {
                    ids.push(id);
                }
            }
        }
    }
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// Core ids listed as `cpuN` lines in /proc/stat.
fn core_ids_from_stat(text: &str) -> Vec<usize> {
    let mut ids: Vec<usize> = text
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .filter_map(|label| label.strip_prefix("cpu"))
        .filter_map(|n| n.parse::<usize>().ok())
        .collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

fn discover_cores(proc_root: &Path, sys_root: &Path, zones: &[ThermalZone]) -> Vec<CoreInfo> {
    let cpu_root = sys_root.join("devices/system/cpu");
    let mut ids = fs::read_to_string(cpu_root.join("possible"))
        .map(|text| parse_cpu_list(&text))
        .unwrap_or_default();
    if ids.is_empty() {
        debug!("no cpu possible list, counting cpu lines in /proc/stat");
        ids = fs::read_to_string(proc_root.join("stat"))
            .map(|text| core_ids_from_stat(&text))
            .unwrap_or_default();
    }

    ids.into_iter()
        .map(|id| {
            let dir = cpu_root.join(format!("cpu{}", id));
            let cluster = read_trimmed(&dir.join("topology/cluster_id"))
                .or_else(|| read_trimmed(&dir.join("topology/physical_package_id")))
                .and_then(|s| s.parse::<i64>().ok());
            let policy = read_trimmed(&dir.join("cpufreq/related_cpus"))
                .and_then(|s| parse_cpu_list(&s.replace(' ', ",")).first().copied());
            let temperature = zones
                .iter()
                .find(|z| core_of_zone(&z.kind) == Some(id))
                .map(|z| z.temp.clone());
            CoreInfo {
                id,
                dir,
                cluster,
                policy,
                temperature,
            }
        })
        .collect()
}

/// Core index named by a thermal zone type (`cpu0-silver-usr`, `cpu-1-0`).
fn core_of_zone(kind: &str) -> Option<usize> {
    let lower = kind.to_ascii_lowercase();
    let mut tokens = lower.split(['-', '_']);
    let first = tokens.next()?;
    if first == "cpu" {
        tokens.next()?.parse().ok()
    } else {
        first.strip_prefix("cpu")?.parse().ok()
    }
}

/// `temp` node of the first zone whose lowercased type matches.
fn find_zone(zones: &[ThermalZone], matches: impl Fn(&str) -> bool) -> Option<PathBuf> {
    zones
        .iter()
        .find(|z| matches(&z.kind.to_ascii_lowercase()))
        .map(|z| z.temp.clone())
}

/// Enumerates `thermal_zoneN` from 0 until the first missing index.
fn discover_thermal_zones(thermal_root: &Path) -> Vec<ThermalZone> {
    let mut zones = Vec::new();
    for index in 0.. {
        let dir = thermal_root.join(format!("thermal_zone{}", index));
        let temp = dir.join("temp");
        if !temp.exists() {
            break;
        }
        let kind = read_trimmed(&dir.join("type")).unwrap_or_default();
        zones.push(ThermalZone { index, kind, temp });
    }
    debug!("{} thermal zones found", zones.len());
    zones
}

/// Resolves a mount point to a block device name through a mounts table.
///
/// The last matching entry wins, as later mounts shadow earlier ones.
pub fn block_device_for_mount(mounts: &str, mount_point: &str) -> Option<String> {
    let device = mounts
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            Some((fields.next()?, fields.next()?))
        })
        .filter(|(_, target)| *target == mount_point)
        .map(|(device, _)| device)
        .last()?;

    if !device.starts_with('/') {
        return None;
    }
    let resolved = fs::canonicalize(device).unwrap_or_else(|_| PathBuf::from(device));
    resolved
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

fn read_model(sys_root: &Path, privileged: &SharedReader) -> Option<String> {
    read_node(&sys_root.join("firmware/devicetree/base/model"), &**privileged)
        .ok()
        .map(|m| m.trim_end_matches('\0').to_string())
        .or_else(|| read_node(&sys_root.join("devices/virtual/dmi/id/product_name"), &**privileged).ok())
        .filter(|m| !m.is_empty())
}

fn read_trimmed(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}
