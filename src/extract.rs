//! Positional extraction of numeric fields from kernel counter text.
//!
//! Counter files have a fixed column order per kernel version while the set
//! of lines varies per device, so each extractor matches one line-anchored
//! pattern and reads its columns by position.

use regex::{CaptureLocations, Regex};

use crate::error::{ProbeError, Result};

const FIELD: &str = r"([0-9]+)";

/// Extracts `N` unsigned 64-bit columns from the first line matching a
/// line-anchored pattern.
///
/// Capture locations are kept between calls so repeated extraction does not
/// allocate.
pub struct FieldExtractor<const N: usize> {
    what: String,
    regex: Regex,
    locs: CaptureLocations,
}

impl<const N: usize> FieldExtractor<N> {
    /// `^<label> f0 f1 ... fN-1` with whitespace-separated columns.
    ///
    /// At least one whitespace character must follow the label, so `cpu1`
    /// never matches the `cpu10` line.
    pub fn labelled(label: &str) -> Self {
        let mut pattern = format!("(?m)^{}", regex::escape(label));
        for _ in 0..N {
            pattern.push_str(r"[ \t]+");
            pattern.push_str(FIELD);
        }
        Self::build(label, &pattern)
    }

    /// A line made only of numbers, optionally indented (`/sys/block/*/stat`).
    pub fn leading(what: &str) -> Self {
        let mut pattern = String::from(r"(?m)^[ \t]*");
        for i in 0..N {
            if i > 0 {
                pattern.push_str(r"[ \t]+");
            }
            pattern.push_str(FIELD);
        }
        Self::build(what, &pattern)
    }

    fn build(what: &str, pattern: &str) -> Self {
        // only escaped literals and fixed fragments go into the pattern
        let regex = Regex::new(pattern).expect("field pattern is a valid regex");
        let locs = regex.capture_locations();
        Self {
            what: what.to_string(),
            regex,
            locs,
        }
    }

    pub fn what(&self) -> &str {
        &self.what
    }

    /// Parses the first matching line into `N` integers.
    pub fn extract(&mut self, text: &str) -> Result<[u64; N]> {
        if self.regex.captures_read(&mut self.locs, text).is_none() {
            return Err(ProbeError::parse(&self.what, "no matching line"));
        }

        let mut out = [0u64; N];
        for (i, slot) in out.iter_mut().enumerate() {
            let (start, end) = self
                .locs
                .get(i + 1)
                .ok_or_else(|| ProbeError::parse(&self.what, format!("field {} missing", i)))?;
            *slot = text[start..end].parse::<u64>().map_err(|e| {
                ProbeError::parse(&self.what, format!("field {}: {}", i, e))
            })?;
        }
        Ok(out)
    }
}

impl FieldExtractor<1> {
    /// `^<key>: <value> kB` as found in `/proc/meminfo`.
    pub fn keyed(key: &str) -> Self {
        let pattern = format!(r"(?m)^{}:[ \t]*{} kB", regex::escape(key), FIELD);
        Self::build(key, &pattern)
    }

    pub fn extract_one(&mut self, text: &str) -> Result<u64> {
        self.extract(text).map(|[v]| v)
    }
}
