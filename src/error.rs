// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types shared by the whole daemon.

use std::{fmt, io, path::PathBuf};

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can go wrong while talking to the hardware or deciding
/// what to do with it.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A kernel file could not be read.
    #[error("reading {}", path.display())]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },

    /// A kernel file could not be written.
    #[error("writing {value:?} to {}", path.display())]
    Write {
        /// File that failed.
        path: PathBuf,
        /// Text we tried to write.
        value: String,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },

    /// A kernel file held something other than what we expected.
    #[error("parsing value from file {}: {contents:?}", path.display())]
    Parse {
        /// File that was read.
        path: PathBuf,
        /// What it contained.
        contents: String,
    },

    /// No usable device of some kind was found.
    #[error("cannot find any {kind} (tried {tried})")]
    NoDevice {
        /// Human readable device kind, e.g. "screen backlight".
        kind: &'static str,
        /// Driver names or paths that were looked at.
        tried: String,
    },

    /// The configuration makes no sense.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A fade worker panicked.
    #[error("{0} fade panicked")]
    FadePanicked(&'static str),

    /// Someone else changed a backlight behind our back.
    #[error(transparent)]
    OutsideChange(#[from] Conflict),

    /// Talking to logind over DBus failed.
    #[error("logind request failed")]
    Logind(#[from] zbus::Error),
}

/// Report of brightness values that diverged from what this process last
/// wrote or read. A field is `None` when that device did not change.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Conflict {
    /// Live raw screen brightness, if it changed.
    pub screen: Option<u32>,
    /// Live keyboard level, if it changed.
    pub keyboard: Option<u32>,
}

impl Conflict {
    /// True if neither device diverged.
    pub fn is_empty(&self) -> bool {
        self.screen.is_none() && self.keyboard.is_none()
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("brightness changed outside the daemon")?;
        if let Some(screen) = self.screen {
            write!(f, ", screen now {screen}")?;
        }
        if let Some(keyboard) = self.keyboard {
            write!(f, ", keyboard now {keyboard}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Conflict {}
