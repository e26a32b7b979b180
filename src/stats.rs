//! Probe statistics for the sampling engine.
//!
//! Tracks snapshot timing, rendered fragments and contained failures so the
//! `stats` subcommand can report how the probes behave on a device.

use std::fmt::Write as FmtWrite;
use std::time::Instant;

use crate::error::ErrorKind;

/// Last/avg/max/min over every value added so far.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunningStat {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    last: f64,
}

impl RunningStat {
    pub fn add(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.sum += value;
        self.last = value;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    /// (last, avg, max, min)
    pub fn summary(&self) -> (f64, f64, f64, f64) {
        (self.last, self.avg(), self.max, self.min)
    }
}

/// Counters kept by the registry across snapshots.
#[derive(Debug)]
pub struct ProbeStats {
    pub snapshot_duration_ms: RunningStat,
    pub fragments_per_snapshot: RunningStat,
    pub snapshots: u64,
    pub fragments_rendered: u64,

    // contained failures by kind
    pub io_errors: u64,
    pub parse_errors: u64,
    pub access_denied: u64,
    pub probes_disabled: u64,

    pub start_time: Instant,
}

impl Default for ProbeStats {
    fn default() -> Self {
        Self {
            snapshot_duration_ms: RunningStat::default(),
            fragments_per_snapshot: RunningStat::default(),
            snapshots: 0,
            fragments_rendered: 0,
            io_errors: 0,
            parse_errors: 0,
            access_denied: 0,
            probes_disabled: 0,
            start_time: Instant::now(),
        }
    }
}

impl ProbeStats {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn record_snapshot(&mut self, duration_ms: f64, fragments: u64) {
        self.snapshot_duration_ms.add(duration_ms);
        self.fragments_per_snapshot.add(fragments as f64);
        self.snapshots += 1;
        self.fragments_rendered += fragments;
    }

    pub fn record_failure(&mut self, kind: ErrorKind) {
        match kind {
            ErrorKind::ParseMismatch => self.parse_errors += 1,
            ErrorKind::AccessDenied => self.access_denied += 1,
            ErrorKind::NotFound | ErrorKind::Io | ErrorKind::Unavailable => self.io_errors += 1,
        }
    }

    pub fn record_disabled(&mut self) {
        self.probes_disabled += 1;
    }

    pub fn failures(&self) -> u64 {
        self.io_errors + self.parse_errors + self.access_denied
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn render_table(&self) -> String {
        let (sd_cur, sd_avg, sd_max, sd_min) = self.snapshot_duration_ms.summary();
        let (fr_cur, fr_avg, fr_max, fr_min) = self.fragments_per_snapshot.summary();

        let left_col = 26usize;
        let col_w = 12usize;

        let mut out = String::new();

        writeln!(out, "PROBE STATISTICS").ok();
        writeln!(out, "================").ok();
        writeln!(out).ok();

        writeln!(
            out,
            "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
            "",
            "current",
            "average",
            "max",
            "min",
            left = left_col,
            col = col_w
        )
        .ok();

        writeln!(out).ok();
        writeln!(out, "SNAPSHOTS").ok();
        writeln!(out, "---------").ok();

        writeln!(
            out,
            "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
            "snapshot_duration (ms)",
            format!("{:.3}", sd_cur),
            format!("{:.3}", sd_avg),
            format!("{:.3}", sd_max),
            format!("{:.3}", sd_min),
            left = left_col,
            col = col_w
        )
        .ok();

        writeln!(
            out,
            "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
            "fragments",
            format!("{:.0}", fr_cur),
            format!("{:.1}", fr_avg),
            format!("{:.0}", fr_max),
            format!("{:.0}", fr_min),
            left = left_col,
            col = col_w
        )
        .ok();

        writeln!(out).ok();
        writeln!(out, "COUNTERS").ok();
        writeln!(out, "--------").ok();

        let counters = [
            ("snapshots_total", self.snapshots),
            ("fragments_rendered_total", self.fragments_rendered),
            ("io_errors", self.io_errors),
            ("parse_errors", self.parse_errors),
            ("access_denied", self.access_denied),
            ("probes_disabled", self.probes_disabled),
            ("uptime_seconds", self.get_uptime_seconds()),
        ];
        for (name, value) in counters {
            writeln!(out, "{:left$} | {:^col$}", name, value, left = left_col, col = col_w).ok();
        }

        out
    }
}
