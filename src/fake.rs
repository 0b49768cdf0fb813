// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory hardware and idle sensor for tests.

use crate::{
    devices::{AmbientSensor, Devices},
    hardware::Hardware,
    idle::IdleSensor,
    port::HardwarePort,
};
use std::{
    collections::{HashMap, HashSet},
    io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

pub const LID: &str = "/lid/state";
pub const SCREEN: &str = "/backlight/brightness";
pub const SCREEN_MAX: &str = "/backlight/max_brightness";
pub const KEYBOARD: &str = "/leds/kbd/brightness";
pub const ALS: &str = "/als/input";
pub const ALS_ENABLE: &str = "/als/enable";

pub fn devices() -> Devices {
    Devices {
        lid: LID.into(),
        screen: "/backlight".into(),
        keyboard: Some(KEYBOARD.into()),
        ambient: AmbientSensor {
            input: ALS.into(),
            enable: None,
        },
    }
}

pub fn hardware(port: &FakePort) -> Hardware {
    Hardware::new(Box::new(port.clone()), devices(), Duration::ZERO).unwrap()
}

/// Someone else writing a file once we've written to it `after` times.
#[derive(Debug)]
struct Interference {
    path: PathBuf,
    after: usize,
    value: String,
}

#[derive(Debug, Default)]
struct Inner {
    files: HashMap<PathBuf, String>,
    writes: Vec<(PathBuf, String)>,
    failing_reads: HashSet<PathBuf>,
    failing_writes: HashSet<PathBuf>,
    interference: Option<Interference>,
}

/// A fake `/sys`. Clones share the same files.
#[derive(Clone, Debug, Default)]
pub struct FakePort {
    inner: Arc<Mutex<Inner>>,
}

impl FakePort {
    /// Lid open, screen 40/100, keyboard off, sensor at 1000.
    pub fn laptop() -> Self {
        let port = Self::default();
        port.set(LID, "state:      open");
        port.set(SCREEN, "40");
        port.set(SCREEN_MAX, "100");
        port.set(KEYBOARD, "0");
        port.set(ALS, "1000");
        port
    }

    /// Changes a file without recording it as one of our writes, the way a
    /// hotkey would.
    pub fn set(&self, path: &str, value: &str) {
        self.inner
            .lock()
            .unwrap()
            .files
            .insert(path.into(), value.into());
    }

    pub fn get(&self, path: &str) -> String {
        self.inner.lock().unwrap().files[Path::new(path)].clone()
    }

    /// Every value written to `path` through the port, in order.
    pub fn writes_to(&self, path: &str) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .writes
            .iter()
            .filter(|(p, _)| p == Path::new(path))
            .map(|(_, v)| v.clone())
            .collect()
    }

    pub fn fail_reads(&self, path: &str, fail: bool) {
        let mut inner = self.inner.lock().unwrap();
        if fail {
            inner.failing_reads.insert(path.into());
        } else {
            inner.failing_reads.remove(Path::new(path));
        }
    }

    pub fn fail_writes(&self, path: &str, fail: bool) {
        let mut inner = self.inner.lock().unwrap();
        if fail {
            inner.failing_writes.insert(path.into());
        } else {
            inner.failing_writes.remove(Path::new(path));
        }
    }

    /// After our `after`th write to `path`, something else sets it to
    /// `value`.
    pub fn interfere(&self, path: &str, after: usize, value: &str) {
        self.inner.lock().unwrap().interference = Some(Interference {
            path: path.into(),
            after,
            value: value.into(),
        });
    }
}

impl HardwarePort for FakePort {
    fn read_text(&self, path: &Path) -> io::Result<String> {
        let inner = self.inner.lock().unwrap();
        if inner.failing_reads.contains(path) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
        }
        inner
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }

    fn write_text(&self, path: &Path, value: &str) -> io::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.failing_writes.contains(path) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
        }
        inner.files.insert(path.into(), value.into());
        inner.writes.push((path.into(), value.into()));

        let count = inner.writes.iter().filter(|(p, _)| p == path).count();
        let hit = matches!(
            &inner.interference,
            Some(i) if i.path == path && i.after == count
        );
        if hit {
            if let Some(i) = inner.interference.take() {
                inner.files.insert(i.path, i.value);
            }
        }
        Ok(())
    }
}

/// Idle sensor whose readings are set by the test.
#[derive(Clone, Debug, Default)]
pub struct FakeIdle {
    state: Arc<Mutex<(u64, bool)>>,
}

impl FakeIdle {
    pub fn set_idle(&self, millis: u64) {
        self.state.lock().unwrap().0 = millis;
    }

    pub fn set_fullscreen(&self, fullscreen: bool) {
        self.state.lock().unwrap().1 = fullscreen;
    }
}

impl IdleSensor for FakeIdle {
    fn idle_milliseconds(&mut self) -> u64 {
        self.state.lock().unwrap().0
    }

    fn active_window_is_fullscreen(&mut self) -> bool {
        self.state.lock().unwrap().1
    }
}
