// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Typed access to the lid, backlights, and light sensor.

use crate::{
    devices::Devices,
    error::{Error, Result},
    port::HardwarePort,
};
use std::{path::Path, thread, time::Duration};

/// The daemon's view of the machine: a [`HardwarePort`] plus the fixed
/// device paths it is allowed to touch.
#[derive(Debug)]
pub struct Hardware {
    port: Box<dyn HardwarePort>,
    devices: Devices,
    screen_max: u32,
    keyboard_settle: Duration,
}

impl Hardware {
    /// Wraps `port`, reading the screen's maximum raw brightness once.
    pub fn new(
        port: Box<dyn HardwarePort>,
        devices: Devices,
        keyboard_settle: Duration,
    ) -> Result<Self> {
        let mut hardware = Self {
            port,
            devices,
            screen_max: 0,
            keyboard_settle,
        };
        let max_path = hardware.devices.screen_max_brightness();
        let screen_max = hardware.read_u32(&max_path)?;
        if screen_max == 0 {
            return Err(Error::Parse {
                path: max_path,
                contents: "0".into(),
            });
        }
        log::debug!("screen backlight maximum: {screen_max}");
        hardware.screen_max = screen_max;
        Ok(hardware)
    }

    /// Highest raw value the screen backlight supports. This always means
    /// "fully on," but different drivers use different units and scales.
    pub fn screen_max(&self) -> u32 {
        self.screen_max
    }

    /// Whether the machine has a keyboard backlight we control.
    pub fn has_keyboard(&self) -> bool {
        self.devices.keyboard.is_some()
    }

    /// Whether the lid switch reports "closed".
    pub fn lid_is_closed(&self) -> Result<bool> {
        let state = self.read(&self.devices.lid)?;
        // The file reads like "state:      closed".
        Ok(state.split_whitespace().last() == Some("closed"))
    }

    /// Current raw screen brightness.
    pub fn screen_brightness(&self) -> Result<u32> {
        let value = self.read_u32(&self.devices.screen_brightness())?;
        log::debug!("current screen backlight: {value}");
        Ok(value)
    }

    /// Sets the raw screen brightness. Values above the maximum are clamped.
    pub fn set_screen_brightness(&self, raw: u32) -> Result<()> {
        self.write(&self.devices.screen_brightness(), raw.min(self.screen_max))
    }

    /// Current keyboard level, or `None` if there's no keyboard backlight.
    pub fn keyboard_brightness(&self) -> Result<Option<u32>> {
        let Some(path) = &self.devices.keyboard else {
            return Ok(None);
        };
        if !self.keyboard_settle.is_zero() {
            thread::sleep(self.keyboard_settle);
        }
        let value = self.read_u32(path)?;
        log::debug!("current keyboard backlight: {value}");
        Ok(Some(value))
    }

    /// Sets the keyboard level. Does nothing without a keyboard backlight.
    pub fn set_keyboard_brightness(&self, level: u32) -> Result<()> {
        match &self.devices.keyboard {
            Some(path) => self.write(path, level),
            None => Ok(()),
        }
    }

    /// Raw ambient light sensor reading.
    pub fn ambient_light(&self) -> Result<u32> {
        self.read_u32(&self.devices.ambient.input)
    }

    /// Switches the ambient light sensor on, for drivers that need it.
    /// Returns whether anything was written.
    pub fn enable_ambient_light(&self) -> Result<bool> {
        let Some(path) = &self.devices.ambient.enable else {
            return Ok(false);
        };
        log::debug!("enabling ambient light sensor");
        self.write(path, 1)?;
        Ok(true)
    }

    /// Converts a raw screen value to a percentage of the maximum.
    pub fn screen_percent(&self, raw: u32) -> f64 {
        f64::from(raw) * 100.0 / f64::from(self.screen_max)
    }

    /// Converts a percentage to a raw screen value, truncating.
    pub fn screen_raw(&self, percent: f64) -> u32 {
        let raw = f64::from(self.screen_max) * percent.clamp(0.0, 100.0) / 100.0;
        raw as u32
    }

    fn read(&self, path: &Path) -> Result<String> {
        self.port.read_text(path).map_err(|source| Error::Read {
            path: path.to_owned(),
            source,
        })
    }

    fn read_u32(&self, path: &Path) -> Result<u32> {
        let contents = self.read(path)?;
        contents.trim().parse().map_err(|_| Error::Parse {
            path: path.to_owned(),
            contents,
        })
    }

    fn write(&self, path: &Path, value: u32) -> Result<()> {
        let value = value.to_string();
        self.port
            .write_text(path, &value)
            .map_err(|source| Error::Write {
                path: path.to_owned(),
                value,
                source,
            })
    }
}
