//! System-wide and per-core CPU utilization from /proc/stat.
//!
//! Column order of a `cpu` line: user nice system idle iowait irq softirq
//! (steal, guest and guest_nice follow on newer kernels and are ignored).
//!
//! iowait is only an approximation: the task waiting for I/O is not running
//! on any CPU, and the kernel may even decrease the counter. Intervals where
//! any tracked counter goes backwards are reported as zero.

use std::path::Path;

use serde::Serialize;
use tracing::{debug, error};

use crate::error::ProbeError;
use crate::extract::FieldExtractor;
use crate::render::{percent, Fragment};
use crate::source::{CounterSource, SharedReader};

use super::now_ms;

/// Cumulative tick counters of one `cpu` line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickCounters {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
}

impl From<[u64; 7]> for TickCounters {
    fn from(f: [u64; 7]) -> Self {
        Self {
            user: f[0],
            nice: f[1],
            system: f[2],
            idle: f[3],
            iowait: f[4],
            irq: f[5],
            softirq: f[6],
        }
    }
}

impl TickCounters {
    /// Sum of all tracked ticks, with `user` counted twice.
    pub fn total(&self) -> u64 {
        self.user
            .saturating_mul(2)
            .saturating_add(self.nice)
            .saturating_add(self.system)
            .saturating_add(self.idle)
            .saturating_add(self.iowait)
            .saturating_add(self.irq)
            .saturating_add(self.softirq)
    }
}

/// Tick deltas between two consecutive samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickDelta {
    pub total: u64,
    pub idle: u64,
    pub iowait: u64,
}

impl TickDelta {
    /// Deltas from `prev` to `cur`, or all zero if any counter went backwards.
    pub fn between(prev: &TickCounters, cur: &TickCounters) -> Self {
        match (
            cur.total().checked_sub(prev.total()),
            cur.idle.checked_sub(prev.idle),
            cur.iowait.checked_sub(prev.iowait),
        ) {
            (Some(total), Some(idle), Some(iowait)) => Self {
                total,
                idle,
                iowait,
            },
            _ => Self::default(),
        }
    }

    fn fraction(&self, part: u64) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (part as f64 / self.total as f64).clamp(0.0, 1.0)
    }

    /// `1 - (idle + iowait) / total`, clamped to [0, 1].
    pub fn utilization(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (1.0 - (self.idle + self.iowait) as f64 / self.total as f64).clamp(0.0, 1.0)
    }
}

/// Percentages shown by the aggregate CPU probe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CpuUsage {
    /// Busy fraction weighted by the average frequency ratio of the cores.
    pub util_percent: u32,
    pub busy_percent: u32,
    pub iowait_percent: u32,
}

#[derive(Debug, Clone, Default)]
struct CpuSample {
    taken_at_ms: i64,
    all: TickCounters,
    cores: Vec<TickCounters>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuStatState {
    Uninitialized,
    Ready,
    Disabled,
}

/// Double-buffered /proc/stat aggregator shared by all CPU probes.
pub struct CpuStat {
    state: CpuStatState,
    source: Option<CounterSource>,
    aggregate: FieldExtractor<7>,
    cores: Vec<FieldExtractor<7>>,
    samples: [CpuSample; 2],
    current: usize,
    all_delta: TickDelta,
    core_deltas: Vec<TickDelta>,
    freq_ratio_sum: f64,
}

impl Default for CpuStat {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuStat {
    pub fn new() -> Self {
        Self {
            state: CpuStatState::Uninitialized,
            source: None,
            aggregate: FieldExtractor::labelled("cpu"),
            cores: Vec::new(),
            samples: [CpuSample::default(), CpuSample::default()],
            current: 0,
            all_delta: TickDelta::default(),
            core_deltas: Vec::new(),
            freq_ratio_sum: 0.0,
        }
    }

    /// Prepares buffers for `core_count` cores and opens `stat_path`.
    ///
    /// A source that cannot be opened leaves the aggregator disabled.
    pub fn initialize(&mut self, core_count: usize, stat_path: &Path, privileged: SharedReader) {
        match CounterSource::open(stat_path, privileged) {
            Ok(source) => self.initialize_with(core_count, source),
            Err(e) => {
                error!("cannot access {}: {}", stat_path.display(), e);
                self.state = CpuStatState::Disabled;
            }
        }
    }

    pub fn initialize_with(&mut self, core_count: usize, source: CounterSource) {
        self.cores = (0..core_count)
            .map(|id| FieldExtractor::labelled(&format!("cpu{}", id)))
            .collect();
        for sample in self.samples.iter_mut() {
            *sample = CpuSample {
                taken_at_ms: 0,
                all: TickCounters::default(),
                cores: vec![TickCounters::default(); core_count],
            };
        }
        self.core_deltas = vec![TickDelta::default(); core_count];
        self.current = 0;
        self.all_delta = TickDelta::default();
        self.freq_ratio_sum = 0.0;
        self.source = Some(source);
        self.state = CpuStatState::Ready;
        debug!("CpuStat initialized for {} cores", core_count);
    }

    pub fn state(&self) -> CpuStatState {
        self.state
    }

    pub fn has_any(&self) -> bool {
        self.state == CpuStatState::Ready
    }

    pub fn core_count(&self) -> usize {
        self.cores.len()
    }

    pub fn sample(&mut self) {
        self.sample_at(now_ms());
    }

    /// Reads /proc/stat once and advances the sample pair.
    pub fn sample_at(&mut self, now_ms: i64) {
        if self.state != CpuStatState::Ready {
            return;
        }

        let Self {
            state,
            source,
            aggregate,
            cores,
            samples,
            current,
            all_delta,
            core_deltas,
            ..
        } = self;
        let Some(source) = source.as_mut() else {
            *state = CpuStatState::Disabled;
            return;
        };

        let text = match source.read_all() {
            Ok(text) => text,
            Err(e) => {
                error!("CpuStat: {}", e);
                *state = CpuStatState::Disabled;
                return;
            }
        };

        let all = match aggregate.extract(text) {
            Ok(fields) => TickCounters::from(fields),
            Err(e) => {
                error!("{}: no matching \"cpu\" line: {}", source.path().display(), e);
                source.invalidate();
                *state = CpuStatState::Disabled;
                return;
            }
        };

        let (prev, next) = pair_mut(samples, *current);
        next.taken_at_ms = now_ms;
        next.all = all;
        *all_delta = TickDelta::between(&prev.all, &next.all);

        for (id, extractor) in cores.iter_mut().enumerate() {
            match extractor.extract(text) {
                Ok(fields) => {
                    next.cores[id] = TickCounters::from(fields);
                    core_deltas[id] = TickDelta::between(&prev.cores[id], &next.cores[id]);
                }
                // unplugged core: keep its baseline, report it idle
                Err(_) => {
                    next.cores[id] = prev.cores[id];
                    core_deltas[id] = TickDelta::default();
                }
            }
        }

        *current = 1 - *current;
    }

    /// Timestamp of the latest successful sample in milliseconds.
    pub fn last_sample_ms(&self) -> i64 {
        self.samples[self.current].taken_at_ms
    }

    pub fn aggregate_delta(&self) -> TickDelta {
        self.all_delta
    }

    pub fn core_delta(&self, core_id: usize) -> Option<TickDelta> {
        self.core_deltas.get(core_id).copied()
    }

    /// Utilization of one core over the last interval.
    ///
    /// `frequency_ratio` is current/max frequency; a non-positive ratio means
    /// the core is offline or its frequency is unknown. Positive ratios are
    /// summed for the frequency-weighted aggregate of the current pass.
    pub fn get_core_util(&mut self, core_id: usize, frequency_ratio: f64) -> f64 {
        if !(frequency_ratio > 0.0) {
            return 0.0;
        }
        self.freq_ratio_sum += frequency_ratio;
        self.core_deltas
            .get(core_id)
            .map(TickDelta::utilization)
            .unwrap_or(0.0)
    }

    /// Aggregate percentages for the last interval.
    pub fn usage(&self) -> CpuUsage {
        let delta = self.all_delta;
        if delta.total == 0 {
            return CpuUsage::default();
        }

        let idle = delta.fraction(delta.idle);
        let iowait = delta.fraction(delta.iowait);
        let busy = (1.0 - idle - iowait).max(0.0);
        let avg_ratio = if self.cores.is_empty() {
            0.0
        } else {
            self.freq_ratio_sum / self.cores.len() as f64
        };
        let util = (1.0 - idle) * avg_ratio;

        CpuUsage {
            util_percent: percent(util),
            busy_percent: percent(busy),
            iowait_percent: percent(iowait),
        }
    }

    /// Renders the aggregate line and starts a new frequency-weighting pass.
    pub fn render(&mut self) -> Result<Fragment, ProbeError> {
        let usage = self.usage();
        self.freq_ratio_sum = 0.0;
        Ok(Fragment::new(format!(
            "util: {}% busy: {}% iowait: {}%",
            usage.util_percent, usage.busy_percent, usage.iowait_percent
        )))
    }
}

/// Splits the double buffer into (current, other) around `current`.
fn pair_mut(samples: &mut [CpuSample; 2], current: usize) -> (&CpuSample, &mut CpuSample) {
    let [a, b] = samples;
    if current == 0 {
        (&*a, b)
    } else {
        (&*b, a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Unprivileged;
    use std::fs;
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};

    fn stat_file(content: &str) -> (TempDir, std::path::PathBuf) {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("stat");
        fs::write(&path, content).expect("Failed to write stat file");
        (dir, path)
    }

    fn ready(cores: usize, path: &Path) -> CpuStat {
        let mut stat = CpuStat::new();
        stat.initialize(cores, path, Arc::new(Unprivileged));
        assert!(stat.has_any());
        stat
    }

    #[test]
    fn test_total_counts_user_twice() {
        let c = TickCounters::from([10, 1, 2, 3, 4, 5, 6]);
        assert_eq!(c.total(), 10 + 10 + 1 + 2 + 3 + 4 + 5 + 6);
    }

    #[test]
    fn test_uninitialized_has_nothing() {
        let mut stat = CpuStat::new();
        assert!(!stat.has_any());
        stat.sample_at(1);
        assert_eq!(stat.state(), CpuStatState::Uninitialized);
    }

    #[test]
    fn test_identical_samples_render_zero_busy() {
        let (_dir, path) = stat_file("cpu  100 0 50 800 20 5 5\ncpu0 100 0 50 800 20 5 5\n");
        let mut stat = ready(1, &path);

        stat.sample_at(1000);
        stat.sample_at(1000);

        assert_eq!(stat.aggregate_delta(), TickDelta::default());
        let usage = stat.usage();
        assert_eq!(usage.busy_percent, 0);
        assert_eq!(usage.iowait_percent, 0);
        assert_eq!(usage.util_percent, 0);
        assert_eq!(
            stat.render().expect("render").as_str(),
            "util: 0% busy: 0% iowait: 0%"
        );
        assert!(stat.has_any());
    }

    #[test]
    fn test_aggregate_percentages() {
        let (_dir, path) = stat_file("cpu  0 0 0 0 0 0 0\ncpu0 0 0 0 0 0 0 0\ncpu1 0 0 0 0 0 0 0\n");
        let mut stat = ready(2, &path);
        stat.sample_at(0);

        // total = 2*10 + 20 + 50 + 10 = 100
        fs::write(
            &path,
            "cpu  10 0 20 50 10 0 0\ncpu0 5 0 10 25 5 0 0\ncpu1 5 0 10 25 5 0 0\n",
        )
        .expect("rewrite");
        stat.sample_at(1000);

        let delta = stat.aggregate_delta();
        assert_eq!(delta.total, 100);
        assert_eq!(delta.idle, 50);
        assert_eq!(delta.iowait, 10);

        assert!((stat.get_core_util(0, 1.0) - 0.4).abs() < 1e-9);
        assert!((stat.get_core_util(1, 0.5) - 0.4).abs() < 1e-9);

        let usage = stat.usage();
        assert_eq!(usage.busy_percent, 40);
        assert_eq!(usage.iowait_percent, 10);
        // (1 - 0.5) * (1.5 / 2)
        assert_eq!(usage.util_percent, 38);

        stat.render().expect("render");
        assert_eq!(stat.usage().util_percent, 0);
    }

    #[test]
    fn test_backwards_counter_zeroes_interval_and_advances() {
        let (_dir, path) = stat_file("cpu  10 0 10 100 10 0 0\ncpu0 10 0 10 100 10 0 0\n");
        let mut stat = ready(1, &path);
        stat.sample_at(0);

        // idle goes backwards
        fs::write(&path, "cpu  20 0 20 90 10 0 0\ncpu0 20 0 20 90 10 0 0\n").expect("rewrite");
        stat.sample_at(1000);
        assert_eq!(stat.aggregate_delta(), TickDelta::default());
        assert_eq!(stat.core_delta(0), Some(TickDelta::default()));
        assert_eq!(stat.get_core_util(0, 1.0), 0.0);
        assert_eq!(stat.usage(), CpuUsage::default());

        // the glitched sample is the new baseline
        fs::write(&path, "cpu  20 0 20 100 10 0 0\ncpu0 20 0 20 100 10 0 0\n").expect("rewrite");
        stat.sample_at(2000);
        assert_eq!(
            stat.aggregate_delta(),
            TickDelta {
                total: 10,
                idle: 10,
                iowait: 0
            }
        );
        assert_eq!(stat.last_sample_ms(), 2000);
    }

    #[test]
    fn test_missing_core_line_keeps_baseline() {
        let (_dir, path) = stat_file("cpu  0 0 0 0 0 0 0\ncpu0 0 0 0 0 0 0 0\ncpu1 0 0 0 0 0 0 0\n");
        let mut stat = ready(2, &path);
        stat.sample_at(0);

        fs::write(&path, "cpu  10 0 0 10 0 0 0\ncpu0 10 0 0 10 0 0 0\ncpu1 10 0 0 90 0 0 0\n")
            .expect("rewrite");
        stat.sample_at(1000);

        // cpu1 unplugged
        fs::write(&path, "cpu  20 0 0 20 0 0 0\ncpu0 20 0 0 20 0 0 0\n").expect("rewrite");
        stat.sample_at(2000);
        assert!(stat.has_any());
        assert_eq!(stat.core_delta(1), Some(TickDelta::default()));
        assert_eq!(stat.core_delta(0).map(|d| d.total), Some(30));

        // cpu1 back: delta is measured from its last seen counters
        fs::write(
            &path,
            "cpu  30 0 0 30 0 0 0\ncpu0 30 0 0 30 0 0 0\ncpu1 10 0 0 100 0 0 0\n",
        )
        .expect("rewrite");
        stat.sample_at(3000);
        assert_eq!(
            stat.core_delta(1),
            Some(TickDelta {
                total: 10,
                idle: 10,
                iowait: 0
            })
        );
    }

    #[test]
    fn test_offline_core_ratio_does_not_accumulate() {
        let (_dir, path) = stat_file("cpu  10 0 0 10 0 0 0\ncpu0 10 0 0 10 0 0 0\n");
        let mut stat = ready(1, &path);
        stat.sample_at(0);

        assert_eq!(stat.get_core_util(0, 0.0), 0.0);
        assert_eq!(stat.get_core_util(0, -1.0), 0.0);
        assert_eq!(stat.get_core_util(0, f64::NAN), 0.0);
        assert_eq!(stat.usage().util_percent, 0);
        assert_eq!(stat.get_core_util(7, 1.0), 0.0);
    }

    #[test]
    fn test_core_util_bounded() {
        let (_dir, path) = stat_file("cpu  0 0 0 0 0 0 0\ncpu0 0 0 0 0 0 0 0\n");
        let mut stat = ready(1, &path);
        let lines = [
            "cpu  5 3 2 0 0 0 0\ncpu0 5 3 2 0 0 0 0\n",
            "cpu  5 3 2 900 100 0 0\ncpu0 5 3 2 900 100 0 0\n",
            "cpu  5000 3 2 900 100 7 7\ncpu0 5000 3 2 900 100 7 7\n",
        ];
        for (i, content) in lines.iter().enumerate() {
            fs::write(&path, content).expect("rewrite");
            stat.sample_at(i as i64 * 1000);
            let util = stat.get_core_util(0, 1.0);
            assert!((0.0..=1.0).contains(&util), "util {} out of range", util);
        }
    }

    #[test]
    fn test_missing_aggregate_line_disables_permanently() {
        let (_dir, path) = stat_file("cpu0 1 2 3 4 5 6 7\n");
        let mut stat = ready(1, &path);
        stat.sample_at(0);
        assert_eq!(stat.state(), CpuStatState::Disabled);
        assert!(!stat.has_any());

        fs::write(&path, "cpu  1 2 3 4 5 6 7\n").expect("rewrite");
        stat.sample_at(1000);
        assert!(!stat.has_any());
    }

    #[test]
    fn test_missing_stat_file_disables() {
        let dir = tempdir().expect("Failed to create temp dir");
        let mut stat = CpuStat::new();
        stat.initialize(4, &dir.path().join("stat"), Arc::new(Unprivileged));
        assert_eq!(stat.state(), CpuStatState::Disabled);
    }

    #[test]
    fn test_has_any_is_idempotent() {
        let (_dir, path) = stat_file("cpu  1 2 3 4 5 6 7\n");
        let stat = ready(0, &path);
        assert_eq!(stat.has_any(), stat.has_any());
    }
}
