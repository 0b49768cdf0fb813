// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! An adaptive backlight daemon for Linux laptops.
//!
//! This crate reads an ambient light sensor and the lid switch through the
//! kernel's `/sys` and `/proc` files, and smoothly fades the screen and
//! keyboard backlights toward a brightness that suits the surroundings. It
//! dims the screen when the user goes idle, turns things off when the lid
//! closes, and notices when someone else (usually a brightness hotkey)
//! changes a backlight behind its back.
//!
//! The moving parts, leaves first:
//!
//! - [`port`]: raw text file access, directly or through logind.
//! - [`hardware`]: typed reads and writes against fixed [`devices`].
//! - [`ambient`]: smoothing of light sensor readings.
//! - [`detector`]: outside change detection.
//! - [`fade`]: gradual brightness changes.
//! - [`state`]: the decision loop.
//! - [`daemon`]: threads, the update coordinator, and shutdown.

pub mod ambient;
pub mod config;
pub mod daemon;
pub mod detector;
pub mod devices;
pub mod error;
pub mod fade;
pub mod hardware;
pub mod idle;
pub mod port;
pub mod state;
pub mod target;

#[cfg(test)]
mod fake;

pub use config::{Config, KeyboardLevels, OutsideChangePolicy};
pub use daemon::{Daemon, SignalForwarder};
pub use devices::{DeviceSelection, Devices};
pub use error::{Conflict, Error, Result};
pub use hardware::Hardware;
pub use idle::{IdleSensor, NoIdleSensor, X11IdleSensor};
pub use port::{HardwarePort, LogindPort, SysfsPort};
pub use state::DaemonState;
pub use target::{BrightnessTarget, Shutdown};
