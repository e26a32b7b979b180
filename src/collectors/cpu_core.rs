//! Per-core frequency, governor and utilization.

use tracing::debug;

use crate::device::{CoreInfo, DeviceContext};
use crate::error::{ProbeError, Result};
use crate::render::{celsius_from_raw, format_celsius, percent, Fragment, OutputFormat};
use crate::source::{read_node_i64, SharedReader, SysNode};

use super::cpu_stat::CpuStat;

const ONLINE_COLOR: &str = "#00ff00";
const OFFLINE_COLOR: &str = "#ff0000";

/// One CPU core. Always present; an offline core renders as such.
pub struct CpuCoreProbe {
    id: usize,
    online: SysNode,
    governor: SysNode,
    cur_freq: SysNode,
    temperature: Option<SysNode>,
    /// kHz, raised whenever a higher current frequency shows up.
    max_freq_khz: u64,
    privileged: SharedReader,
}

impl CpuCoreProbe {
    pub fn new(core: &CoreInfo, ctx: &DeviceContext) -> Self {
        let max_freq_khz = match read_node_i64(&core.max_freq_path(), &*ctx.privileged) {
            Ok(khz) if khz > 0 => khz as u64,
            Ok(_) | Err(_) => {
                debug!("cpu{}: max frequency unknown", core.id);
                1
            }
        };
        Self {
            id: core.id,
            online: SysNode::new(core.online_path()),
            governor: SysNode::new(core.governor_path()),
            cur_freq: SysNode::new(core.cur_freq_path()),
            temperature: core.temperature.clone().map(SysNode::new),
            max_freq_khz,
            privileged: ctx.privileged.clone(),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Only an explicit `0` in the `online` node means offline; cores
    /// without the node (typically cpu0) cannot be unplugged.
    pub fn is_online(&mut self) -> bool {
        match self.online.read(&*self.privileged) {
            Ok(state) => state != "0",
            Err(ProbeError::NotFound(_)) => true,
            Err(e) => {
                debug!("cpu{}: {}", self.id, e);
                true
            }
        }
    }

    fn current_khz(&mut self) -> Result<u64> {
        let raw = self.cur_freq.read_i64(&*self.privileged)?;
        u64::try_from(raw).map_err(|_| {
            ProbeError::parse(self.cur_freq.path().display().to_string(), "negative frequency")
        })
    }

    pub fn render(&mut self, stat: &mut CpuStat, format: OutputFormat) -> Fragment {
        let online = self.is_online();
        let mut body = format!("cpu{}: ", self.id);

        if let Some(node) = self.temperature.as_mut() {
            if let Ok(raw) = node.read_i64(&*self.privileged) {
                body.push_str(&format_celsius(celsius_from_raw(raw)));
                body.push(' ');
            }
        }

        if online {
            match self.governor.read(&*self.privileged) {
                Ok(governor) if !governor.is_empty() => body.push_str(&governor),
                _ => body.push_str("unknown"),
            }

            let cur_khz = match self.current_khz() {
                Ok(khz) => {
                    self.max_freq_khz = self.max_freq_khz.max(khz);
                    body.push(':');
                    body.push_str(&(khz / 1000).to_string());
                    khz
                }
                Err(_) => 0,
            };

            if stat.has_any() {
                let ratio = cur_khz as f64 / self.max_freq_khz as f64;
                let util = stat.get_core_util(self.id, ratio);
                body.push_str(&format!(" {}%", percent(util)));
            }
        } else {
            body.push_str("offline");
        }

        let color = if online { ONLINE_COLOR } else { OFFLINE_COLOR };
        Fragment::new(format.colored(color, &body))
    }
}
