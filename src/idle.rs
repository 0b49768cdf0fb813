// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! User activity detection.

use std::fmt;
use x11rb::{
    connection::Connection,
    errors::ReplyError,
    protocol::{
        screensaver::ConnectionExt as _,
        xproto::{Atom, AtomEnum, ConnectionExt as _, Window},
    },
    rust_connection::RustConnection,
};

/// Source of "is anybody there?" information.
pub trait IdleSensor: fmt::Debug + Send {
    /// Time since the last keyboard or pointer input.
    fn idle_milliseconds(&mut self) -> u64;

    /// Whether the focused window covers the whole screen, e.g. a video.
    fn active_window_is_fullscreen(&mut self) -> bool;

    /// Idle time as far as dimming is concerned: a fullscreen window keeps
    /// the user "active" no matter how long since the last input.
    fn effective_idle_milliseconds(&mut self) -> u64 {
        if self.active_window_is_fullscreen() {
            log::debug!("fullscreen window detected, not dimming");
            0
        } else {
            self.idle_milliseconds()
        }
    }
}

/// Sensor for when idle detection is disabled: the user is always there.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoIdleSensor;

impl IdleSensor for NoIdleSensor {
    fn idle_milliseconds(&mut self) -> u64 {
        0
    }

    fn active_window_is_fullscreen(&mut self) -> bool {
        false
    }
}

/// Queries the X server: the screensaver extension for idle time, and
/// `_NET_ACTIVE_WINDOW` for the focused window's size.
///
/// Query failures are logged and read as "not idle" so that a flaky display
/// connection never dims the screen.
pub struct X11IdleSensor {
    conn: RustConnection,
    root: Window,
    width: u16,
    height: u16,
    active_window: Atom,
}

impl X11IdleSensor {
    /// Connects to the display named by `$DISPLAY` and checks that the
    /// screensaver extension answers.
    pub fn connect() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let (conn, screen_num) = RustConnection::connect(None)?;
        let screen = &conn.setup().roots[screen_num];
        let (root, width, height) = (screen.root, screen.width_in_pixels, screen.height_in_pixels);

        conn.screensaver_query_info(root)?.reply()?;
        let active_window = conn
            .intern_atom(false, b"_NET_ACTIVE_WINDOW")?
            .reply()?
            .atom;

        Ok(Self {
            conn,
            root,
            width,
            height,
            active_window,
        })
    }

    fn query_idle(&self) -> Result<u64, ReplyError> {
        let info = self.conn.screensaver_query_info(self.root)?.reply()?;
        Ok(u64::from(info.ms_since_user_input))
    }

    fn query_fullscreen(&self) -> Result<bool, ReplyError> {
        let reply = self
            .conn
            .get_property(false, self.root, self.active_window, AtomEnum::WINDOW, 0, 4)?
            .reply()?;
        let Some(window) = reply.value32().and_then(|mut v| v.next()) else {
            return Ok(false);
        };
        if window == 0 {
            return Ok(false);
        }
        let geometry = self.conn.get_geometry(window)?.reply()?;
        Ok(geometry.width == self.width && geometry.height == self.height)
    }
}

impl fmt::Debug for X11IdleSensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("X11IdleSensor")
            .field("root", &self.root)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

impl IdleSensor for X11IdleSensor {
    fn idle_milliseconds(&mut self) -> u64 {
        self.query_idle().unwrap_or_else(|e| {
            log::warn!("can't query X11 idle time: {e}");
            0
        })
    }

    fn active_window_is_fullscreen(&mut self) -> bool {
        self.query_fullscreen().unwrap_or_else(|e| {
            log::warn!("can't query the active window: {e}");
            false
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeIdle;

    #[test]
    fn fullscreen_masks_idle_time() {
        let mut idle = FakeIdle::default();
        idle.set_idle(90_000);
        assert_eq!(idle.effective_idle_milliseconds(), 90_000);
        idle.set_fullscreen(true);
        assert_eq!(idle.effective_idle_milliseconds(), 0);
    }

    #[test]
    fn disabled_sensor_is_never_idle() {
        assert_eq!(NoIdleSensor.effective_idle_milliseconds(), 0);
    }
}
