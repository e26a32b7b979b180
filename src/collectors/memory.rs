//! Memory figures from /proc/meminfo.
//!
//! No deltas are involved; every render re-reads the file and reports the
//! absolute values in MiB.

use std::path::Path;

use serde::Serialize;

use crate::error::{ProbeError, Result};
use crate::extract::FieldExtractor;
use crate::render::Fragment;
use crate::source::{CounterSource, SharedReader};

/// Memory counters in KiB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemoryCounters {
    pub total_kb: u64,
    /// `MemAvailable`, or `MemFree` on kernels without it.
    pub available_kb: u64,
    pub active_kb: u64,
    pub inactive_kb: u64,
}

impl MemoryCounters {
    pub fn total_mib(&self) -> u64 {
        self.total_kb / 1024
    }

    pub fn available_mib(&self) -> u64 {
        self.available_kb / 1024
    }

    pub fn active_mib(&self) -> u64 {
        self.active_kb / 1024
    }

    pub fn inactive_mib(&self) -> u64 {
        self.inactive_kb / 1024
    }
}

struct MeminfoKeys {
    total: FieldExtractor<1>,
    available: FieldExtractor<1>,
    free: FieldExtractor<1>,
    active: FieldExtractor<1>,
    inactive: FieldExtractor<1>,
}

impl MeminfoKeys {
    fn new() -> Self {
        Self {
            total: FieldExtractor::keyed("MemTotal"),
            available: FieldExtractor::keyed("MemAvailable"),
            free: FieldExtractor::keyed("MemFree"),
            active: FieldExtractor::keyed("Active"),
            inactive: FieldExtractor::keyed("Inactive"),
        }
    }

    fn parse(&mut self, text: &str) -> Result<MemoryCounters> {
        let total_kb = self.total.extract_one(text)?;
        let available_kb = match self.available.extract_one(text) {
            Ok(v) => v,
            Err(_) => self.free.extract_one(text).map_err(|_| {
                ProbeError::parse("/proc/meminfo", "neither MemAvailable nor MemFree present")
            })?,
        };
        let active_kb = self.active.extract_one(text)?;
        let inactive_kb = self.inactive.extract_one(text)?;

        Ok(MemoryCounters {
            total_kb,
            available_kb,
            active_kb,
            inactive_kb,
        })
    }
}

/// Memory probe backed by one meminfo source.
pub struct MemoryStat {
    source: CounterSource,
    keys: MeminfoKeys,
}

impl MemoryStat {
    pub fn open(meminfo_path: &Path, privileged: SharedReader) -> Result<Self> {
        let source = CounterSource::open(meminfo_path, privileged)?;
        Ok(Self {
            source,
            keys: MeminfoKeys::new(),
        })
    }

    pub fn has_any(&self) -> bool {
        self.source.is_available()
    }

    /// Reads the current counters; a structural mismatch disables the probe.
    pub fn read(&mut self) -> Result<MemoryCounters> {
        let text = self.source.read_all()?;
        let parsed = self.keys.parse(text);
        if parsed.is_err() {
            self.source.invalidate();
        }
        parsed
    }

    pub fn render(&mut self) -> Result<Fragment> {
        let mem = self.read()?;
        Ok(Fragment::new(format!(
            "mem: {}/{} a/i: {}/{}",
            mem.available_mib(),
            mem.total_mib(),
            mem.active_mib(),
            mem.inactive_mib()
        )))
    }
}
