// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Where the daemon's devices live, and how to find them.
//!
//! The kernel offers no single place to ask "which backlight is the laptop
//! panel?", so we do it the hard way: look for known driver names under the
//! usual sysfs directories, and fall back to anything that looks like a
//! backlight. All lookups are relative to a root directory so that tests can
//! point them at a scratch tree.

use crate::error::{Error, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Screen backlight drivers we prefer, in order.
pub const SCREEN_BACKLIGHT_DRIVERS: &[&str] = &["acpi_video0", "intel_backlight"];

/// Keyboard backlight LEDs we know the level range of.
pub const KEYBOARD_BACKLIGHT_DRIVERS: &[&str] = &["asus::kbd_backlight"];

/// Ambient light sensor drivers we know how to read.
pub const AMBIENT_LIGHT_DRIVERS: &[&str] = &["acpi_als", "als"];

const LID_STATE: &str = "proc/acpi/button/lid/LID/state";
const BACKLIGHT_CLASS: &str = "sys/class/backlight";
const LEDS_CLASS: &str = "sys/class/leds";
const ALS_DEVICE: &str = "ACPI0008:00";

/// An ambient light sensor's files.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AmbientSensor {
    /// File holding the raw illuminance reading.
    pub input: PathBuf,
    /// Switch that must be set to "1" before readings are meaningful, if
    /// the driver has one.
    pub enable: Option<PathBuf>,
}

/// Fixed paths of every device the daemon touches.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Devices {
    /// Lid switch state file.
    pub lid: PathBuf,
    /// Screen backlight directory, holding `brightness` and
    /// `max_brightness`.
    pub screen: PathBuf,
    /// Keyboard backlight `brightness` file, if the machine has one we
    /// support.
    pub keyboard: Option<PathBuf>,
    /// Ambient light sensor.
    pub ambient: AmbientSensor,
}

impl Devices {
    /// File holding the current raw screen brightness.
    pub fn screen_brightness(&self) -> PathBuf {
        self.screen.join("brightness")
    }

    /// File holding the highest raw screen brightness.
    pub fn screen_max_brightness(&self) -> PathBuf {
        self.screen.join("max_brightness")
    }
}

/// Which drivers to use. `None` means "pick one automatically".
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceSelection {
    /// Screen backlight name under `/sys/class/backlight`.
    pub screen: Option<String>,
    /// Keyboard LED name under `/sys/class/leds`.
    pub keyboard: Option<String>,
    /// Skip the keyboard even if one is present.
    pub no_keyboard: bool,
    /// Ambient light sensor driver, one of [`AMBIENT_LIGHT_DRIVERS`].
    pub ambient: Option<String>,
}

/// Locates every device under `root` (normally `/`).
pub fn discover(root: &Path, selection: &DeviceSelection) -> Result<Devices> {
    let screen = match &selection.screen {
        Some(name) => use_specific_backlight(root, name)?,
        None => find_screen_backlight(root)?,
    };
    let keyboard = if selection.no_keyboard {
        None
    } else {
        match &selection.keyboard {
            Some(name) => Some(use_specific_keyboard(root, name)?),
            None => find_keyboard_backlight(root),
        }
    };
    let ambient = match &selection.ambient {
        Some(name) => ambient_sensor(root, name).ok_or_else(|| Error::NoDevice {
            kind: "ambient light sensor",
            tried: name.clone(),
        })?,
        None => AMBIENT_LIGHT_DRIVERS
            .iter()
            .find_map(|name| ambient_sensor(root, name))
            .ok_or_else(|| Error::NoDevice {
                kind: "ambient light sensor",
                tried: AMBIENT_LIGHT_DRIVERS.join(", "),
            })?,
    };

    Ok(Devices {
        lid: root.join(LID_STATE),
        screen,
        keyboard,
        ambient,
    })
}

/// Finds the screen backlight: a preferred driver if present, otherwise the
/// first directory in the backlight class that has sensible settings.
fn find_screen_backlight(root: &Path) -> Result<PathBuf> {
    let class = root.join(BACKLIGHT_CLASS);
    for name in SCREEN_BACKLIGHT_DRIVERS {
        let path = class.join(name);
        if has_backlight_settings(&path) {
            return Ok(path);
        }
    }

    let dir = fs::read_dir(&class).map_err(|source| Error::Read {
        path: class.clone(),
        source,
    })?;
    let mut candidates = dir
        .filter_map(|dirent| dirent.ok().map(|d| d.path()))
        .collect::<Vec<_>>();
    // read_dir order is unspecified; keep the choice stable between runs.
    candidates.sort();
    for path in candidates {
        if has_backlight_settings(&path) {
            log::info!(
                "no preferred backlight driver, using {}",
                path.display()
            );
            return Ok(path);
        }
        log::debug!("skipping backlight-like device at {}", path.display());
    }

    Err(Error::NoDevice {
        kind: "screen backlight",
        tried: class.display().to_string(),
    })
}

/// Finds a screen backlight given a user-specified name.
fn use_specific_backlight(root: &Path, name: &str) -> Result<PathBuf> {
    let path = root.join(BACKLIGHT_CLASS).join(name);
    if has_backlight_settings(&path) {
        Ok(path)
    } else {
        Err(Error::NoDevice {
            kind: "screen backlight",
            tried: path.display().to_string(),
        })
    }
}

fn find_keyboard_backlight(root: &Path) -> Option<PathBuf> {
    let found = KEYBOARD_BACKLIGHT_DRIVERS
        .iter()
        .map(|name| root.join(LEDS_CLASS).join(name).join("brightness"))
        .find(|path| path.is_file());
    if found.is_none() {
        log::info!("no supported keyboard backlight, keyboard control disabled");
    }
    found
}

fn use_specific_keyboard(root: &Path, name: &str) -> Result<PathBuf> {
    let path = root.join(LEDS_CLASS).join(name).join("brightness");
    if path.is_file() {
        Ok(path)
    } else {
        Err(Error::NoDevice {
            kind: "keyboard backlight",
            tried: path.display().to_string(),
        })
    }
}

fn ambient_sensor(root: &Path, driver: &str) -> Option<AmbientSensor> {
    let device = root
        .join("sys/bus/acpi/drivers")
        .join(driver)
        .join(ALS_DEVICE);
    if !device.exists() {
        return None;
    }
    match driver {
        "acpi_als" => Some(AmbientSensor {
            input: device.join("iio:device0/in_illuminance_input"),
            enable: None,
        }),
        "als" => Some(AmbientSensor {
            input: device.join("ali"),
            enable: Some(device.join("enable")),
        }),
        _ => None,
    }
}

/// Whether `path` looks like a backlight directory with readable numeric
/// `brightness` and `max_brightness` files.
fn has_backlight_settings(path: &Path) -> bool {
    ["brightness", "max_brightness"].iter().all(|component| {
        fs::read_to_string(path.join(component))
            .map(|contents| contents.trim().parse::<u32>().is_ok())
            .unwrap_or(false)
    })
}
