//! The probe sum type.
//!
//! Every metric shown in a snapshot is one [`Probe`] variant exposing the
//! same two capabilities: [`Probe::is_present`] and [`Probe::render`]. The
//! aggregate CPU line has no state of its own; it renders the shared
//! [`CpuStat`] owned by the registry.

use std::fmt;

use crate::collectors::block::BlockStat;
use crate::collectors::cpu_core::CpuCoreProbe;
use crate::collectors::cpu_stat::CpuStat;
use crate::collectors::gpu::GpuProbe;
use crate::collectors::memory::MemoryStat;
use crate::collectors::sensors::SensorsProbe;
use crate::collectors::soc::SocProbe;
use crate::error::ProbeError;
use crate::render::{Fragment, OutputFormat};

/// Outcome of asking a probe to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    Rendered(Fragment),
    /// Nothing to show this time; not an error.
    Unavailable,
}

pub enum Probe {
    Soc(SocProbe),
    CpuCore(CpuCoreProbe),
    Gpu(GpuProbe),
    CpuStat,
    Memory(MemoryStat),
    Block(BlockStat),
    Sensors(SensorsProbe),
}

impl Probe {
    /// Whether the probe still has something to report.
    ///
    /// Side-effect free; only counter-backed probes can change their
    /// answer, and only through a failing `render`/`sample`.
    pub fn is_present(&self, stat: &CpuStat) -> bool {
        match self {
            Probe::Soc(p) => p.has_any(),
            Probe::CpuCore(_) => true,
            Probe::Gpu(p) => p.has_any(),
            Probe::CpuStat => stat.has_any(),
            Probe::Memory(p) => p.has_any(),
            Probe::Block(p) => p.has_any(),
            Probe::Sensors(p) => p.has_any(),
        }
    }

    pub fn render(
        &mut self,
        stat: &mut CpuStat,
        format: OutputFormat,
    ) -> Result<RenderOutcome, ProbeError> {
        if !self.is_present(stat) {
            return Ok(RenderOutcome::Unavailable);
        }
        let fragment = match self {
            Probe::Soc(p) => match p.render() {
                Some(fragment) => fragment,
                None => return Ok(RenderOutcome::Unavailable),
            },
            Probe::CpuCore(p) => p.render(stat, format),
            Probe::Gpu(p) => match p.render() {
                Some(fragment) => fragment,
                None => return Ok(RenderOutcome::Unavailable),
            },
            Probe::CpuStat => stat.render()?,
            Probe::Memory(p) => p.render()?,
            Probe::Block(p) => p.render()?,
            Probe::Sensors(p) => match p.render(format) {
                Some(fragment) => fragment,
                None => return Ok(RenderOutcome::Unavailable),
            },
        };
        Ok(RenderOutcome::Rendered(fragment))
    }
}

impl fmt::Display for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Probe::Soc(_) => f.write_str("soc"),
            Probe::CpuCore(p) => write!(f, "cpu{}", p.id()),
            Probe::Gpu(_) => f.write_str("gpu"),
            Probe::CpuStat => f.write_str("cpu"),
            Probe::Memory(_) => f.write_str("memory"),
            Probe::Block(p) => write!(f, "block {}", p.name()),
            Probe::Sensors(_) => f.write_str("sensors"),
        }
    }
}
