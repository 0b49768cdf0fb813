// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Detection of brightness changes made by someone else.
//!
//! The daemon assumes it is the only writer of the two backlight files.
//! Instead of locking them (which the kernel doesn't offer anyway) it
//! remembers the last value it wrote or read for each device and compares
//! that against the live value before every write. Any divergence means a
//! hotkey or another program got there first.
//!
//! Each device's remembered value sits behind its own mutex, which is held
//! across the compare and the write so that the decision loop and the fade
//! workers can't interleave on the same device.

use crate::{
    error::{Conflict, Result},
    hardware::Hardware,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Remembers the last known backlight values and reports divergence.
#[derive(Debug)]
pub struct OutsideChangeDetector {
    hardware: Arc<Hardware>,
    screen: Mutex<u32>,
    keyboard: Option<Mutex<u32>>,
}

impl OutsideChangeDetector {
    /// Seeds the remembered values from the hardware.
    pub fn new(hardware: Arc<Hardware>) -> Result<Self> {
        let screen = hardware.screen_brightness()?;
        let keyboard = hardware.keyboard_brightness()?;
        Ok(Self {
            hardware,
            screen: Mutex::new(screen),
            keyboard: keyboard.map(Mutex::new),
        })
    }

    /// The hardware this detector guards.
    pub fn hardware(&self) -> &Hardware {
        &self.hardware
    }

    /// Last raw screen value we wrote or read.
    pub fn screen(&self) -> u32 {
        *lock(&self.screen)
    }

    /// Last keyboard level we wrote or read, if there is a keyboard.
    pub fn keyboard(&self) -> Option<u32> {
        self.keyboard.as_ref().map(|m| *lock(m))
    }

    /// Compares both devices against their remembered values.
    ///
    /// On divergence, returns a [`Conflict`] carrying the live values, and
    /// remembers those values so the same change isn't reported twice.
    ///
    /// Both devices are read before either remembered value changes, so a
    /// failed read leaves both alone and returns the error. A divergence on
    /// one device is never lost to a read failure on the other.
    pub fn check(&self) -> Result<()> {
        let mut keyboard = self.keyboard.as_ref().map(lock);
        let live_keyboard = match keyboard {
            Some(_) => self.hardware.keyboard_brightness()?,
            None => None,
        };
        let mut screen = lock(&self.screen);
        let live_screen = self.hardware.screen_brightness()?;

        let conflict = Conflict {
            keyboard: keyboard
                .as_deref_mut()
                .zip(live_keyboard)
                .and_then(|(observed, live)| replace_if_changed(observed, live)),
            screen: replace_if_changed(&mut screen, live_screen),
        };
        if conflict.is_empty() {
            Ok(())
        } else {
            Err(conflict.into())
        }
    }

    /// Like [`check`](Self::check), for the screen only.
    pub fn check_screen(&self) -> Result<()> {
        match self.diverged_screen()? {
            Some(screen) => Err(Conflict {
                screen: Some(screen),
                keyboard: None,
            }
            .into()),
            None => Ok(()),
        }
    }

    /// Like [`check`](Self::check), for the keyboard only.
    pub fn check_keyboard(&self) -> Result<()> {
        match self.diverged_keyboard()? {
            Some(keyboard) => Err(Conflict {
                screen: None,
                keyboard: Some(keyboard),
            }
            .into()),
            None => Ok(()),
        }
    }

    /// Writes a raw screen value, unless the screen changed behind our back
    /// since we last touched it.
    pub fn write_screen(&self, raw: u32) -> Result<()> {
        let mut observed = lock(&self.screen);
        let live = self.hardware.screen_brightness()?;
        if live != *observed {
            *observed = live;
            return Err(Conflict {
                screen: Some(live),
                keyboard: None,
            }
            .into());
        }
        self.hardware.set_screen_brightness(raw)?;
        *observed = raw.min(self.hardware.screen_max());
        Ok(())
    }

    /// Writes a keyboard level, unless the keyboard changed behind our back
    /// since we last touched it. Does nothing without a keyboard.
    pub fn write_keyboard(&self, level: u32) -> Result<()> {
        let Some(keyboard) = &self.keyboard else {
            return Ok(());
        };
        let mut observed = lock(keyboard);
        if let Some(live) = self.hardware.keyboard_brightness()? {
            if live != *observed {
                *observed = live;
                return Err(Conflict {
                    screen: None,
                    keyboard: Some(live),
                }
                .into());
            }
        }
        self.hardware.set_keyboard_brightness(level)?;
        *observed = level;
        Ok(())
    }

    fn diverged_screen(&self) -> Result<Option<u32>> {
        let mut observed = lock(&self.screen);
        let live = self.hardware.screen_brightness()?;
        Ok(replace_if_changed(&mut observed, live))
    }

    fn diverged_keyboard(&self) -> Result<Option<u32>> {
        let Some(keyboard) = &self.keyboard else {
            return Ok(None);
        };
        let mut observed = lock(keyboard);
        match self.hardware.keyboard_brightness()? {
            Some(live) => Ok(replace_if_changed(&mut observed, live)),
            None => Ok(None),
        }
    }
}

fn replace_if_changed(observed: &mut u32, live: u32) -> Option<u32> {
    if *observed == live {
        return None;
    }
    log::debug!("backlight changed outside: expected {observed}, found {live}");
    *observed = live;
    Some(live)
}

/// Takes a lock, carrying on if another thread panicked while holding it:
/// the guarded value is a plain number and is always valid.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
