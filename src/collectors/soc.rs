//! SoC temperature and battery power figures.
//!
//! Each part is kept only if it could be read at construction, and is
//! dropped for the rest of the session the first time a render fails.

use std::path::PathBuf;

use tracing::debug;

use crate::device::DeviceContext;
use crate::render::{
    celsius_from_decidegrees, celsius_from_raw, format_celsius, milli_from_power_supply, Fragment,
};
use crate::source::{read_node_i64, SharedReader};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Part {
    SocTemperature,
    BatteryTemperature,
    Current,
    Voltage,
}

impl Part {
    fn format(self, raw: i64) -> String {
        match self {
            Part::SocTemperature => format!("SoC:{}", format_celsius(celsius_from_raw(raw))),
            Part::BatteryTemperature => {
                format!("Batt:{}", format_celsius(celsius_from_decidegrees(raw)))
            }
            Part::Current => format!("{}mA", milli_from_power_supply(raw)),
            Part::Voltage => format!("{}mV", milli_from_power_supply(raw)),
        }
    }
}

pub struct SocProbe {
    parts: Vec<(Part, PathBuf)>,
    privileged: SharedReader,
}

impl SocProbe {
    pub fn new(ctx: &DeviceContext) -> Self {
        let battery = ctx.sys_path("class/power_supply/battery");
        let candidates = [
            (Part::SocTemperature, ctx.soc_temperature.clone()),
            (Part::BatteryTemperature, ctx.battery_temperature.clone()),
            (Part::Current, Some(battery.join("current_now"))),
            (Part::Voltage, Some(battery.join("voltage_now"))),
        ];

        let parts = candidates
            .into_iter()
            .filter_map(|(part, path)| path.map(|p| (part, p)))
            .filter(|(part, path)| match read_node_i64(path, &*ctx.privileged) {
                Ok(_) => true,
                Err(e) => {
                    debug!("SoC: skipping {:?}: {}", part, e);
                    false
                }
            })
            .collect();

        Self {
            parts,
            privileged: ctx.privileged.clone(),
        }
    }

    pub fn has_any(&self) -> bool {
        !self.parts.is_empty()
    }

    /// `None` once every part has failed; the probe then has nothing left.
    pub fn render(&mut self) -> Option<Fragment> {
        let privileged = &self.privileged;
        let mut shown = Vec::with_capacity(self.parts.len());
        self.parts.retain(|(part, path)| {
            match read_node_i64(path, &**privileged) {
                Ok(raw) => {
                    shown.push(part.format(raw));
                    true
                }
                Err(e) => {
                    debug!("SoC: dropping {:?}: {}", part, e);
                    false
                }
            }
        });
        if shown.is_empty() {
            return None;
        }
        Some(Fragment::new(shown.join(" ")))
    }
}
