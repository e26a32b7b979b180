//! Block device I/O statistics collector.
//!
//! Reads `/sys/class/block/<dev>/stat` and derives per-interval I/O counts
//! and the busy percentage from two consecutive samples.
//!
//! Column layout of the stat file:
//!
//! | Name            | units        | description                          |
//! |-----------------|--------------|--------------------------------------|
//! | read I/Os       | requests     | read I/Os processed                  |
//! | read merges     | requests     | read I/Os merged with in-queue I/O   |
//! | read sectors    | sectors      | sectors read                         |
//! | read ticks      | milliseconds | total wait time for read requests    |
//! | write I/Os      | requests     | write I/Os processed                 |
//! | write merges    | requests     | write I/Os merged with in-queue I/O  |
//! | write sectors   | sectors      | sectors written                      |
//! | write ticks     | milliseconds | total wait time for write requests   |
//! | in_flight       | requests     | I/Os currently in flight             |
//! | io_ticks        | milliseconds | time this device has been active     |
//! | time_in_queue   | milliseconds | total wait time for all requests     |

use std::path::Path;

use serde::Serialize;
use tracing::debug;

use crate::error::{ProbeError, Result};
use crate::extract::FieldExtractor;
use crate::render::Fragment;
use crate::source::{CounterSource, SharedReader};

use super::now_ms;

/// Disk statistics for a single device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockCounters {
    pub reads_completed: u64,
    pub reads_merged: u64,
    pub sectors_read: u64,
    pub time_reading_ms: u64,
    pub writes_completed: u64,
    pub writes_merged: u64,
    pub sectors_written: u64,
    pub time_writing_ms: u64,
    pub ios_in_progress: u64,
    pub time_io_ms: u64,
    pub weighted_time_io_ms: u64,
}

impl From<[u64; 11]> for BlockCounters {
    fn from(f: [u64; 11]) -> Self {
        Self {
            reads_completed: f[0],
            reads_merged: f[1],
            sectors_read: f[2],
            time_reading_ms: f[3],
            writes_completed: f[4],
            writes_merged: f[5],
            sectors_written: f[6],
            time_writing_ms: f[7],
            ios_in_progress: f[8],
            time_io_ms: f[9],
            weighted_time_io_ms: f[10],
        }
    }
}

/// Derived figures for one sampling interval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BlockRates {
    pub read_ios: u64,
    pub read_wait_ms: u64,
    pub write_ios: u64,
    pub busy_percent: u64,
}

impl BlockRates {
    /// Counters that went backwards and empty intervals yield zero.
    pub fn between(prev: &BlockCounters, prev_ms: i64, cur: &BlockCounters, cur_ms: i64) -> Self {
        let elapsed_ms = cur_ms.saturating_sub(prev_ms);
        let busy_percent = if elapsed_ms > 0 {
            cur.time_io_ms.saturating_sub(prev.time_io_ms).saturating_mul(100) / elapsed_ms as u64
        } else {
            0
        };

        Self {
            read_ios: cur.reads_completed.saturating_sub(prev.reads_completed),
            read_wait_ms: cur.time_reading_ms.saturating_sub(prev.time_reading_ms),
            write_ios: cur.writes_completed.saturating_sub(prev.writes_completed),
            busy_percent,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct BlockSample {
    taken_at_ms: i64,
    counters: BlockCounters,
}

/// I/O activity of one block device.
pub struct BlockStat {
    name: String,
    source: CounterSource,
    extractor: FieldExtractor<11>,
    samples: [BlockSample; 2],
    current: usize,
}

impl BlockStat {
    /// Opens the device's stat node and takes the baseline sample.
    pub fn open(name: &str, stat_path: &Path, privileged: SharedReader) -> Result<Self> {
        Self::open_at(name, stat_path, privileged, now_ms())
    }

    pub fn open_at(
        name: &str,
        stat_path: &Path,
        privileged: SharedReader,
        now_ms: i64,
    ) -> Result<Self> {
        let source = CounterSource::open(stat_path, privileged)?;
        let mut stat = Self {
            name: name.to_string(),
            source,
            extractor: FieldExtractor::leading(&format!("{} stat", name)),
            samples: [BlockSample::default(); 2],
            current: 0,
        };
        stat.sample_into_next(now_ms)?;
        stat.current = 1 - stat.current;
        debug!("block monitor for {} ready", name);
        Ok(stat)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_any(&self) -> bool {
        self.source.is_available()
    }

    fn sample_into_next(&mut self, now_ms: i64) -> Result<()> {
        let text = self.source.read_all()?;
        match self.extractor.extract(text) {
            Ok(fields) => {
                let next = &mut self.samples[1 - self.current];
                next.counters = BlockCounters::from(fields);
                next.taken_at_ms = now_ms;
                Ok(())
            }
            Err(e) => {
                self.source.invalidate();
                Err(e)
            }
        }
    }

    /// Samples the device and returns the figures for the elapsed interval.
    pub fn sample_rates_at(&mut self, now_ms: i64) -> Result<BlockRates> {
        if !self.has_any() {
            return Err(ProbeError::Unavailable(self.source.path().to_path_buf()));
        }
        self.sample_into_next(now_ms)?;

        let prev = &self.samples[self.current];
        let cur = &self.samples[1 - self.current];
        let rates = BlockRates::between(
            &prev.counters,
            prev.taken_at_ms,
            &cur.counters,
            cur.taken_at_ms,
        );
        self.current = 1 - self.current;
        Ok(rates)
    }

    pub fn render(&mut self) -> Result<Fragment> {
        self.render_at(now_ms())
    }

    pub fn render_at(&mut self, now_ms: i64) -> Result<Fragment> {
        let rates = self.sample_rates_at(now_ms)?;
        Ok(Fragment::new(format!(
            "{} R:{}iops {}ms W:{}iops {}%",
            self.name, rates.read_ios, rates.read_wait_ms, rates.write_ios, rates.busy_percent
        )))
    }
}
