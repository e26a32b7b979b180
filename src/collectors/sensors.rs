//! Thermal sensor dump.
//!
//! One counter source per `thermal_zoneN/temp`, rendered five zones per
//! line followed by the device identity.

use tracing::debug;

use crate::device::DeviceContext;
use crate::error::{ProbeError, Result};
use crate::render::{celsius_from_raw, format_celsius, Fragment, OutputFormat};
use crate::source::CounterSource;

const ZONES_PER_LINE: usize = 5;

/// Temperature reading with zone index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThermalReading {
    pub zone: usize,
    pub temperature_celsius: f64,
}

struct Zone {
    index: usize,
    source: CounterSource,
}

impl Zone {
    fn read(&mut self) -> Result<ThermalReading> {
        let text = self.source.read_all()?;
        let raw = text.trim().parse::<i64>().map_err(|e| {
            ProbeError::parse(self.source.path().display().to_string(), e.to_string())
        })?;
        Ok(ThermalReading {
            zone: self.index,
            temperature_celsius: celsius_from_raw(raw),
        })
    }
}

pub struct SensorsProbe {
    zones: Vec<Zone>,
    model: String,
    soc_id: String,
}

impl SensorsProbe {
    pub fn new(ctx: &DeviceContext) -> Self {
        let zones = ctx
            .thermal_zones
            .iter()
            .filter_map(|z| match CounterSource::open(&z.temp, ctx.privileged.clone()) {
                Ok(source) => Some(Zone {
                    index: z.index,
                    source,
                }),
                Err(e) => {
                    debug!("sensors: skipping zone {}: {}", z.index, e);
                    None
                }
            })
            .collect();

        Self {
            zones,
            model: ctx.model.clone().unwrap_or_else(|| "unknown".into()),
            soc_id: ctx.soc_id.clone().unwrap_or_else(|| "unknown".into()),
        }
    }

    pub fn has_any(&self) -> bool {
        !self.zones.is_empty()
    }

    /// Reads every zone; zones that fail are dropped for the session.
    pub fn read_all(&mut self) -> Vec<ThermalReading> {
        let mut readings = Vec::with_capacity(self.zones.len());
        self.zones.retain_mut(|zone| match zone.read() {
            Ok(reading) => {
                readings.push(reading);
                true
            }
            Err(e) => {
                debug!("sensors: dropping zone {}: {}", zone.index, e);
                false
            }
        });
        readings
    }

    pub fn render(&mut self, format: OutputFormat) -> Option<Fragment> {
        let readings = self.read_all();
        if readings.is_empty() {
            return None;
        }

        let mut out = String::new();
        for (i, reading) in readings.iter().enumerate() {
            out.push_str(&format!(
                "{}:{}",
                reading.zone,
                format_celsius(reading.temperature_celsius)
            ));
            if (i + 1) % ZONES_PER_LINE == 0 {
                out.push_str(format.separator());
            } else {
                out.push(' ');
            }
        }
        if readings.len() % ZONES_PER_LINE != 0 {
            out.pop();
            out.push_str(format.separator());
        }
        out.push_str(&format!("model:{} soc_id:{}", self.model, self.soc_id));
        Some(Fragment::new(out))
    }
}
