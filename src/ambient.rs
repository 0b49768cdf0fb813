// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Ambient light smoothing.
//!
//! Raw sensor readings are mapped onto a logarithmic percent scale and kept
//! in a short history. The "tendency" is a trimmed mean over that history,
//! so a single bright flash or shadow doesn't move the backlight.

use crate::{config::Config, hardware::Hardware};
use std::collections::VecDeque;

/// Percent reported when the sensor can't be read. Mid-range, so that a
/// broken sensor neither blinds nor blacks out the user.
pub const FALLBACK_PERCENT: f64 = 50.0;

/// Maps a raw illuminance reading onto 0-100.
///
/// `log10(raw) / factor * 100`, clamped, then floored at `min`.
pub fn normalize(raw: u32, factor: f64, min: f64) -> f64 {
    let percent = if raw > 0 {
        (f64::from(raw).log10() / factor * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    };
    percent.max(min)
}

/// Average of `values`, ignoring one highest and one lowest value once
/// there are at least three.
pub fn trimmed_mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let mut values = values.into_iter().collect::<Vec<_>>();
    if values.is_empty() {
        return None;
    }
    if values.len() >= 3 {
        values.sort_by(f64::total_cmp);
        values.pop();
        values.remove(0);
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Fixed-capacity history of normalized readings.
#[derive(Clone, Debug)]
pub struct AmbientLight {
    samples: VecDeque<f64>,
    capacity: usize,
    factor: f64,
    min: f64,
}

impl AmbientLight {
    /// Creates an empty history sized and scaled from `config`.
    pub fn new(config: &Config) -> Self {
        let capacity = config.ambient_light_samples.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            factor: config.ambient_light_factor,
            min: config.screen_min,
        }
    }

    /// Takes one reading from the sensor and adds it to the history,
    /// evicting the oldest one if full. A failed read is logged and counts
    /// as [`FALLBACK_PERCENT`].
    pub fn sample(&mut self, hardware: &Hardware) -> f64 {
        let percent = match hardware.ambient_light() {
            Ok(raw) => {
                let percent = normalize(raw, self.factor, self.min);
                log::debug!("ambient light: {percent:.1}% (raw {raw})");
                percent
            }
            Err(e) => {
                log::error!(
                    "can't read ambient light sensor, are udev rules configured \
                     correctly? {e}"
                );
                FALLBACK_PERCENT.max(self.min)
            }
        };
        self.push(percent);
        percent
    }

    /// Adds an already normalized reading.
    pub fn push(&mut self, percent: f64) {
        while self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(percent);
    }

    /// Forgets every reading.
    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Smoothed ambient light, or `None` before the first reading.
    pub fn tendency(&self) -> Option<f64> {
        let tendency = trimmed_mean(self.samples.iter().copied());
        log::trace!("tendency of {:?}: {tendency:?}", self.samples);
        tendency
    }
}
