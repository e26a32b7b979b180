//! Probe registry and snapshot rendering.
//!
//! The registry is built once per session from a [`DeviceContext`]. Probes
//! with nothing to report on this device are left out at construction; the
//! rest are rendered in a fixed order on every snapshot:
//! SoC, CPU cores by index, GPU, aggregate CPU, memory, block devices,
//! sensors.

use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::collectors::block::BlockStat;
use crate::collectors::cpu_core::CpuCoreProbe;
use crate::collectors::cpu_stat::CpuStat;
use crate::collectors::gpu::GpuProbe;
use crate::collectors::memory::MemoryStat;
use crate::collectors::sensors::SensorsProbe;
use crate::collectors::soc::SocProbe;
use crate::config::Config;
use crate::device::DeviceContext;
use crate::probe::{Probe, RenderOutcome};
use crate::render::OutputFormat;
use crate::stats::ProbeStats;

pub struct ProbeRegistry {
    stat: CpuStat,
    probes: Vec<Probe>,
    format: OutputFormat,
    separator: String,
    stats: ProbeStats,
}

impl ProbeRegistry {
    pub fn new(ctx: &DeviceContext, config: &Config) -> Self {
        let mut probes = Vec::new();

        if config.enable_soc.unwrap_or(true) {
            let soc = SocProbe::new(ctx);
            if soc.has_any() {
                probes.push(Probe::Soc(soc));
            } else {
                debug!("no SoC or battery nodes");
            }
        }

        for core in &ctx.cores {
            probes.push(Probe::CpuCore(CpuCoreProbe::new(core, ctx)));
        }

        let mut stat = CpuStat::new();
        stat.initialize(ctx.core_slots(), &ctx.stat_path(), ctx.privileged.clone());

        if config.enable_gpu.unwrap_or(true) {
            let gpu = GpuProbe::new(ctx);
            if gpu.has_any() {
                probes.push(Probe::Gpu(gpu));
            } else {
                debug!("no GPU nodes");
            }
        }

        probes.push(Probe::CpuStat);

        match MemoryStat::open(&ctx.meminfo_path(), ctx.privileged.clone()) {
            Ok(memory) => probes.push(Probe::Memory(memory)),
            Err(e) => warn!("memory probe unavailable: {}", e),
        }

        for device in &ctx.block_devices {
            match BlockStat::open(&device.name, &device.stat, ctx.privileged.clone()) {
                Ok(block) => probes.push(Probe::Block(block)),
                Err(e) => warn!("block device {} unavailable: {}", device.name, e),
            }
        }

        if config.enable_sensors.unwrap_or(false) {
            let sensors = SensorsProbe::new(ctx);
            if sensors.has_any() {
                probes.push(Probe::Sensors(sensors));
            } else {
                debug!("no readable thermal zones");
            }
        }

        info!("{} probes registered", probes.len());

        Self {
            stat,
            probes,
            format: config.output_format(),
            separator: config.separator(),
            stats: ProbeStats::new(),
        }
    }

    pub fn probes(&self) -> &[Probe] {
        &self.probes
    }

    pub fn cpu_stat(&self) -> &CpuStat {
        &self.stat
    }

    pub fn stats(&self) -> &ProbeStats {
        &self.stats
    }

    /// Names of the probes that would render right now.
    pub fn present(&self) -> Vec<String> {
        self.probes
            .iter()
            .filter(|p| p.is_present(&self.stat))
            .map(|p| p.to_string())
            .collect()
    }

    /// Samples the CPU aggregator once and renders every present probe.
    ///
    /// A probe that fails is logged and skipped; the rest of the snapshot is
    /// unaffected.
    pub fn render_snapshot(&mut self) -> String {
        let started = Instant::now();
        self.stat.sample();

        let mut out = String::new();
        let mut fragments = 0u64;
        for probe in self.probes.iter_mut() {
            if !probe.is_present(&self.stat) {
                continue;
            }
            match probe.render(&mut self.stat, self.format) {
                Ok(RenderOutcome::Rendered(fragment)) => {
                    out.push_str(fragment.as_str());
                    out.push_str(&self.separator);
                    fragments += 1;
                }
                Ok(RenderOutcome::Unavailable) => {
                    debug!("{}: nothing to render", probe);
                }
                Err(e) => {
                    error!("{}: {}", probe, e);
                    self.stats.record_failure(e.kind());
                    if !probe.is_present(&self.stat) {
                        warn!("{} disabled", probe);
                        self.stats.record_disabled();
                    }
                }
            }
        }

        self.stats
            .record_snapshot(started.elapsed().as_secs_f64() * 1000.0, fragments);
        out
    }
}
