// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Raw access to kernel-exposed text files.
//!
//! Everything the daemon knows about the hardware comes through a
//! [`HardwarePort`]. The default [`SysfsPort`] touches the files directly,
//! which usually needs udev rules granting write access. [`LogindPort`]
//! instead asks systemd-logind to set backlight values, which works without
//! any privileges for a user logged in at the seat.

use crate::error::Result;
use logind_zbus::session::SessionProxyBlocking;
use std::{fmt, fs, io, path::Path};
use zbus::blocking::Connection;

/// Reads and writes single-value text files such as those in `/sys`.
///
/// Failures are reported to the caller rather than handled here.
pub trait HardwarePort: fmt::Debug + Send + Sync {
    /// Returns the contents of `path` with surrounding whitespace removed.
    fn read_text(&self, path: &Path) -> io::Result<String>;

    /// Replaces the contents of `path` with `value`.
    fn write_text(&self, path: &Path, value: &str) -> io::Result<()>;
}

/// Direct file system access.
#[derive(Copy, Clone, Debug, Default)]
pub struct SysfsPort;

impl HardwarePort for SysfsPort {
    fn read_text(&self, path: &Path) -> io::Result<String> {
        let contents = fs::read_to_string(path)?;
        log::trace!("cat {} -> {}", path.display(), contents.trim());
        Ok(contents.trim().to_string())
    }

    fn write_text(&self, path: &Path, value: &str) -> io::Result<()> {
        log::trace!("echo {value} > {}", path.display());
        fs::write(path, value)
    }
}

/// Routes brightness writes through the logind session, falling back to the
/// file system for everything else.
///
/// logind will happily set a backlight if we know its subsystem and name,
/// and both can be recovered from the sysfs path:
/// `/sys/class/<subsystem>/<name>/brightness`.
pub struct LogindPort {
    session: SessionProxyBlocking<'static>,
}

impl LogindPort {
    /// Connects to the current session (`.../session/auto`).
    ///
    /// Note that this happens on the SYSTEM bus, _not_ the SESSION bus!
    pub fn connect() -> Result<Self> {
        let conn = Connection::system()?;
        let session = SessionProxyBlocking::builder(&conn)
            .path("/org/freedesktop/login1/session/auto")?
            .build()?;
        Ok(Self { session })
    }
}

impl fmt::Debug for LogindPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogindPort").finish_non_exhaustive()
    }
}

impl HardwarePort for LogindPort {
    fn read_text(&self, path: &Path) -> io::Result<String> {
        SysfsPort.read_text(path)
    }

    fn write_text(&self, path: &Path, value: &str) -> io::Result<()> {
        let Some((subsystem, name)) = brightness_device(path) else {
            return SysfsPort.write_text(path, value);
        };
        let raw = value.trim().parse::<u32>().map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("brightness {value:?} is not a number: {e}"),
            )
        })?;
        log::trace!("logind set_brightness {subsystem} {name} {raw}");
        self.session
            .set_brightness(subsystem, name, raw)
            .map_err(io::Error::other)
    }
}

/// Splits `/sys/class/<subsystem>/<name>/brightness` into its subsystem and
/// device name, if `path` has that shape.
fn brightness_device(path: &Path) -> Option<(&str, &str)> {
    if path.file_name()? != "brightness" {
        return None;
    }
    let device = path.parent()?;
    let subsystem = device.parent()?;
    if subsystem.parent()?.file_name()? != "class" {
        return None;
    }
    Some((subsystem.file_name()?.to_str()?, device.file_name()?.to_str()?))
}
