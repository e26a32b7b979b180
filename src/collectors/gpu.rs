//! GPU clock, governor and temperature.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::device::DeviceContext;
use crate::render::{celsius_from_raw, format_celsius, frequency_to_mhz, Fragment};
use crate::source::{read_node, read_node_i64, SharedReader};

const KGSL_CUR_FREQ: &str = "class/kgsl/kgsl-3d0/devfreq/cur_freq";
const KGSL_GPUCLK: &str = "class/kgsl/kgsl-3d0/gpuclk";
const KGSL_GOVERNOR: &str = "class/kgsl/kgsl-3d0/devfreq/governor";

pub struct GpuProbe {
    freq: Option<PathBuf>,
    governor: Option<PathBuf>,
    temperature: Option<PathBuf>,
    privileged: SharedReader,
}

impl GpuProbe {
    pub fn new(ctx: &DeviceContext) -> Self {
        let reader = &*ctx.privileged;
        let devfreq = devfreq_gpu_dir(&ctx.sys_path("class/devfreq"));

        let mut freq_candidates = vec![ctx.sys_path(KGSL_CUR_FREQ), ctx.sys_path(KGSL_GPUCLK)];
        let mut governor_candidates = vec![ctx.sys_path(KGSL_GOVERNOR)];
        if let Some(dir) = &devfreq {
            freq_candidates.push(dir.join("cur_freq"));
            governor_candidates.push(dir.join("governor"));
        }

        let freq = freq_candidates
            .into_iter()
            .find(|p| p.exists())
            .filter(|p| read_node_i64(p, reader).is_ok());
        let governor = governor_candidates
            .into_iter()
            .find(|p| p.exists())
            .filter(|p| read_node(p, reader).is_ok());
        let temperature = ctx
            .gpu_temperature
            .clone()
            .filter(|p| read_node_i64(p, reader).is_ok());
        debug!(
            "gpu: freq {:?} governor {:?} temperature {:?}",
            freq, governor, temperature
        );

        Self {
            freq,
            governor,
            temperature,
            privileged: ctx.privileged.clone(),
        }
    }

    pub fn has_any(&self) -> bool {
        self.freq.is_some() || self.governor.is_some() || self.temperature.is_some()
    }

    /// Renders `gpu: [T℃ ][governor:]MHz`; a node that fails is dropped.
    ///
    /// `None` when no node could be read this time.
    pub fn render(&mut self) -> Option<Fragment> {
        let reader = &*self.privileged;
        let mut out = String::from("gpu: ");
        let mut shown = false;

        if let Some(path) = &self.temperature {
            if let Ok(raw) = read_node_i64(path, reader) {
                out.push_str(&format_celsius(celsius_from_raw(raw)));
                out.push(' ');
                shown = true;
            }
        }

        if let Some(path) = &self.governor {
            match read_node(path, reader) {
                Ok(governor) => {
                    out.push_str(&governor);
                    out.push(':');
                    shown = true;
                }
                Err(e) => {
                    debug!("gpu: dropping governor: {}", e);
                    self.governor = None;
                }
            }
        }

        if let Some(path) = &self.freq {
            match read_node_i64(path, reader) {
                Ok(raw) => {
                    out.push_str(&frequency_to_mhz(raw.max(0) as u64).to_string());
                    shown = true;
                }
                Err(e) => {
                    debug!("gpu: dropping frequency: {}", e);
                    self.freq = None;
                }
            }
        }

        shown.then(|| Fragment::new(out))
    }
}

/// First `class/devfreq` entry whose name mentions the GPU.
fn devfreq_gpu_dir(devfreq_root: &Path) -> Option<PathBuf> {
    let mut dirs: Vec<PathBuf> = fs::read_dir(devfreq_root)
        .ok()?
        .flatten()
        .filter(|e| e.file_name().to_string_lossy().to_ascii_lowercase().contains("gpu"))
        .map(|e| e.path())
        .collect();
    dirs.sort();
    dirs.into_iter().next()
}
