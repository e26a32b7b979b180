//! Text fragments and unit conversions shared by the probes.

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Markup flavour of a snapshot document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Html,
}

impl OutputFormat {
    pub fn separator(&self) -> &'static str {
        match self {
            OutputFormat::Text => "\n",
            OutputFormat::Html => "<br/>",
        }
    }

    /// Wraps `body` in a color when the format supports it.
    pub fn colored(&self, color: &str, body: &str) -> String {
        match self {
            OutputFormat::Text => body.to_string(),
            OutputFormat::Html => format!("<font color=\"{}\">{}</font>", color, body),
        }
    }
}

/// The rendered output of a single probe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment(String);

impl Fragment {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fraction in [0, 1] as a percentage, rounding half up.
pub fn percent(fraction: f64) -> u32 {
    if !fraction.is_finite() || fraction <= 0.0 {
        return 0;
    }
    (fraction * 100.0 + 0.5).floor() as u32
}

/// Thermal node value to degrees Celsius.
///
/// Most drivers report millidegrees, some vendor drivers whole degrees.
pub fn celsius_from_raw(raw: i64) -> f64 {
    if raw.abs() >= 1000 {
        raw as f64 / 1000.0
    } else {
        raw as f64
    }
}

/// Battery `temp` nodes report tenths of a degree.
pub fn celsius_from_decidegrees(raw: i64) -> f64 {
    raw as f64 / 10.0
}

/// Power-supply current/voltage to milli-units.
///
/// Values are normally micro-units; magnitudes of 10^7 and above are taken
/// as nano-units.
pub fn milli_from_power_supply(raw: i64) -> i64 {
    if raw.abs() >= 10_000_000 {
        raw / 1_000_000
    } else {
        raw / 1000
    }
}

/// Divides a frequency by 1000 while it is above 1000, at most twice.
pub fn frequency_to_mhz(raw: u64) -> u64 {
    let mut freq = raw;
    for _ in 0..2 {
        if freq > 1000 {
            freq /= 1000;
        }
    }
    freq
}

pub fn format_celsius(celsius: f64) -> String {
    if celsius.fract() == 0.0 {
        format!("{}℃", celsius as i64)
    } else {
        format!("{:.1}℃", celsius)
    }
}
