// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Tunables for the control engine.
//!
//! A `Config` is built once at startup and only read afterwards. Every
//! percentage is on the 0-100 scale used for decisions, never in raw
//! device units.

use crate::error::{Error, Result};
use std::time::Duration;

/// What to do when a backlight changes without our involvement (usually a
/// hotkey).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum OutsideChangePolicy {
    /// Stop the daemon and leave the user's setting alone.
    Terminate,
    /// Put back the last brightness we committed to.
    #[default]
    Reassert,
}

/// Mapping from keyboard percent to the small discrete level range that
/// keyboard backlights expose.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct KeyboardLevels {
    /// Highest level the device accepts. The lowest is always 0.
    pub max_level: u32,
    /// Ambient light percent below which the keyboard is lit.
    pub threshold: f64,
}

impl KeyboardLevels {
    /// Quantizes an ambient light percentage to a keyboard level: dark
    /// surroundings light the keyboard fully, bright ones turn it off.
    pub fn level_for(&self, percent: f64) -> u32 {
        if percent < self.threshold {
            self.max_level
        } else {
            0
        }
    }
}

impl Default for KeyboardLevels {
    fn default() -> Self {
        Self {
            max_level: 3,
            threshold: 10.0,
        }
    }
}

/// Immutable daemon configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Period of the event detection loop, and the coordinator's wait
    /// timeout.
    pub update_interval: Duration,
    /// Reaction to brightness changes made by someone else.
    pub outside_change: OutsideChangePolicy,
    /// Idle time before dimming. Zero disables idle detection.
    pub idle_threshold: Duration,
    /// Screen percent used while idle.
    pub screen_dim_min: f64,
    /// Divisor applied to `log10(raw)` when normalizing sensor readings.
    pub ambient_light_factor: f64,
    /// Minimum change of the ambient tendency before brightness follows.
    pub ambient_light_delta: f64,
    /// Number of readings kept for the trimmed mean.
    pub ambient_light_samples: usize,
    /// Spacing between readings in one-shot mode.
    pub ambient_light_sample_interval: Duration,
    /// Floor for any screen percentage, and for sensor readings.
    pub screen_min: f64,
    /// Wall-clock duration of a full screen fade.
    pub screen_fade: Duration,
    /// Keyboard quantization.
    pub keyboard_levels: KeyboardLevels,
    /// Delay after each keyboard level step.
    pub keyboard_step: Duration,
    /// Delay before reading the keyboard level, since some drivers report
    /// the previous value right after a write.
    pub keyboard_settle: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            update_interval: Duration::from_secs(2),
            outside_change: OutsideChangePolicy::default(),
            idle_threshold: Duration::ZERO,
            screen_dim_min: 5.0,
            ambient_light_factor: 5.5,
            ambient_light_delta: 3.0,
            ambient_light_samples: 5,
            ambient_light_sample_interval: Duration::from_millis(200),
            screen_min: 5.0,
            screen_fade: Duration::from_millis(500),
            keyboard_levels: KeyboardLevels::default(),
            keyboard_step: Duration::from_millis(5),
            keyboard_settle: Duration::from_millis(100),
        }
    }
}

impl Config {
    /// Checks that the values can drive the engine sensibly.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("screen dim minimum", self.screen_dim_min),
            ("screen minimum", self.screen_min),
            ("ambient light delta", self.ambient_light_delta),
            ("keyboard threshold", self.keyboard_levels.threshold),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(Error::Config(format!(
                    "{name} must be between 0 and 100, got {value}"
                )));
            }
        }
        if self.ambient_light_samples == 0 {
            return Err(Error::Config(
                "at least one ambient light sample is required".into(),
            ));
        }
        if !(self.ambient_light_factor > 0.0) {
            return Err(Error::Config(format!(
                "ambient light factor must be positive, got {}",
                self.ambient_light_factor
            )));
        }
        if self.update_interval.is_zero() {
            return Err(Error::Config("update interval can't be zero".into()));
        }
        if self.keyboard_levels.max_level == 0 {
            return Err(Error::Config(
                "keyboard needs at least one level above off".into(),
            ));
        }
        Ok(())
    }

    /// Whether idle dimming is enabled at all.
    pub fn idle_enabled(&self) -> bool {
        !self.idle_threshold.is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        Config::default().validate().unwrap();
        assert!(!Config::default().idle_enabled());
    }

    #[test]
    fn rejects_out_of_range_percent() {
        let config = Config {
            screen_min: 140.0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn rejects_degenerate_values() {
        let no_samples = Config {
            ambient_light_samples: 0,
            ..Config::default()
        };
        assert!(no_samples.validate().is_err());

        let nan_factor = Config {
            ambient_light_factor: f64::NAN,
            ..Config::default()
        };
        assert!(nan_factor.validate().is_err());

        let no_levels = Config {
            keyboard_levels: KeyboardLevels {
                max_level: 0,
                threshold: 10.0,
            },
            ..Config::default()
        };
        assert!(no_levels.validate().is_err());
    }

    #[test]
    fn keyboard_lights_up_in_the_dark() {
        let levels = KeyboardLevels::default();
        assert_eq!(levels.level_for(0.0), 3);
        assert_eq!(levels.level_for(9.9), 3);
        assert_eq!(levels.level_for(10.0), 0);
        assert_eq!(levels.level_for(100.0), 0);
    }
}
