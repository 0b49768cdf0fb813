// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Thread wiring: the decision loop, the update coordinator, and the
//! supervisor that stops them.
//!
//! ```text
//!  EventLoop --publish--> TargetSlot --wait_take--> Coordinator --> Fader
//!      |                                                             |
//!      +------------------- OutsideChangeDetector <------------------+
//! ```
//!
//! The coordinator owns every backlight write. It is not interrupted while
//! fading; a target published mid-fade is picked up afterwards, and only
//! the newest one is.

use crate::{
    ambient::AmbientLight,
    config::Config,
    detector::OutsideChangeDetector,
    error::{Error, Result},
    fade::Fader,
    hardware::Hardware,
    idle::IdleSensor,
    state::{handle_outside_change, EventLoop},
    target::{BrightnessTarget, Shutdown, TargetSlot},
};
use signal_hook::{
    consts::signal::{SIGHUP, SIGINT, SIGTERM},
    iterator::{Handle, Signals},
};
use std::{io, sync::Arc, thread, time::Duration};

/// Time the ambient light sensor needs after being switched on before its
/// readings mean anything.
const SENSOR_WARMUP: Duration = Duration::from_millis(200);

/// Applies published targets, one fade pair at a time.
#[derive(Debug)]
pub struct Coordinator {
    config: Arc<Config>,
    fader: Fader,
    targets: Arc<TargetSlot>,
    shutdown: Shutdown,
}

impl Coordinator {
    /// Creates a coordinator fading through `detector`.
    pub fn new(
        config: Arc<Config>,
        detector: Arc<OutsideChangeDetector>,
        targets: Arc<TargetSlot>,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            fader: Fader::new(&config, detector),
            config,
            targets,
            shutdown,
        }
    }

    /// Waits for targets and applies them until shutdown is requested.
    /// Shutdown is noticed within one update interval, and never interrupts
    /// a fade in progress.
    pub fn run(self) {
        log::debug!("brightness update loop started");
        while !self.shutdown.is_requested() {
            if let Some(target) = self.targets.wait_take(self.config.update_interval) {
                self.apply(target);
            }
        }
        log::debug!("brightness update loop stopped");
    }

    /// Fades both devices to `target`. An outside change during the fade is
    /// handled according to the configured policy, which never displaces a
    /// target published in the meantime. Other failures are logged.
    pub fn apply(&self, target: BrightnessTarget) {
        log::info!(
            "update scr:{:.1}% kbd:{:.1}%",
            target.screen,
            target.keyboard
        );
        match self.fader.apply(target) {
            Ok(()) => log::debug!("update finished"),
            Err(Error::OutsideChange(conflict)) => {
                handle_outside_change(
                    self.config.outside_change,
                    &conflict,
                    &self.targets,
                    &self.shutdown,
                );
            }
            Err(e) => log::error!("can't update brightness, retrying later: {e}"),
        }
    }
}

/// The whole daemon: both loops and what they share.
#[derive(Debug)]
pub struct Daemon {
    config: Arc<Config>,
    detector: Arc<OutsideChangeDetector>,
    targets: Arc<TargetSlot>,
    shutdown: Shutdown,
}

impl Daemon {
    /// Validates `config`, switches the light sensor on if it needs it, and
    /// takes the initial readings.
    pub fn new(config: Config, hardware: Hardware) -> Result<Self> {
        config.validate()?;
        enable_sensor(&hardware);
        let detector = OutsideChangeDetector::new(Arc::new(hardware))?;
        Ok(Self {
            config: Arc::new(config),
            detector: Arc::new(detector),
            targets: Arc::default(),
            shutdown: Shutdown::new(),
        })
    }

    /// Handle that stops the daemon when requested.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Runs both loops on their own threads and blocks until shutdown is
    /// requested, then waits for them to finish their current unit of work.
    pub fn run(self, idle: Box<dyn IdleSensor>) -> io::Result<()> {
        let event_loop = EventLoop::new(
            Arc::clone(&self.config),
            Arc::clone(&self.detector),
            idle,
            Arc::clone(&self.targets),
            self.shutdown.clone(),
        );
        let coordinator = Coordinator::new(
            Arc::clone(&self.config),
            Arc::clone(&self.detector),
            Arc::clone(&self.targets),
            self.shutdown.clone(),
        );

        let events = thread::Builder::new()
            .name("event-detection".into())
            .spawn(move || event_loop.run())?;
        let updates = match thread::Builder::new()
            .name("brightness-update".into())
            .spawn(move || coordinator.run())
        {
            Ok(handle) => handle,
            Err(e) => {
                self.shutdown.request();
                join(events);
                return Err(e);
            }
        };

        self.shutdown.wait();
        log::debug!("exiting...");
        join(events);
        join(updates);
        Ok(())
    }

    /// Sets brightness from the current ambient light once, without
    /// starting any loop.
    ///
    /// Takes the configured number of readings, spaced by the sample
    /// interval, so that the result is as smooth as the daemon's. A closed
    /// lid turns both backlights off instead.
    pub fn apply_once(&self) -> Result<()> {
        let hardware = self.detector.hardware();
        let target = if hardware.lid_is_closed()? {
            BrightnessTarget::both(0.0)
        } else {
            let mut ambient = AmbientLight::new(&self.config);
            for i in 0..self.config.ambient_light_samples {
                if i > 0 {
                    thread::sleep(self.config.ambient_light_sample_interval);
                }
                ambient.sample(hardware);
            }
            // At least one sample was taken, validate() makes sure of it.
            BrightnessTarget::both(ambient.tendency().unwrap_or(self.config.screen_min))
        };
        log::info!("setting scr:{:.1}% kbd:{:.1}%", target.screen, target.keyboard);
        Fader::new(&self.config, Arc::clone(&self.detector)).apply(target)
    }
}

fn enable_sensor(hardware: &Hardware) {
    match hardware.enable_ambient_light() {
        Ok(true) => thread::sleep(SENSOR_WARMUP),
        Ok(false) => (),
        Err(e) => log::error!(
            "can't enable ambient light sensor, are udev rules configured correctly? {e}"
        ),
    }
}

fn join(handle: thread::JoinHandle<()>) {
    let name = handle.thread().name().unwrap_or("worker").to_owned();
    if handle.join().is_err() {
        log::error!("{name} thread panicked");
    }
}

/// Forwards termination signals to a [`Shutdown`] from a background thread.
/// Dropping the guard stops forwarding.
pub struct SignalForwarder {
    handle: Handle,
    thread: Option<thread::JoinHandle<()>>,
}

impl SignalForwarder {
    /// Starts listening for SIGINT, SIGTERM and SIGHUP.
    pub fn install(shutdown: Shutdown) -> io::Result<Self> {
        let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;
        let handle = signals.handle();
        let thread = thread::Builder::new()
            .name("signals".into())
            .spawn(move || {
                if let Some(signal) = signals.forever().next() {
                    log::info!("received signal {signal}, shutting down");
                    shutdown.request();
                }
            })?;
        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }
}

impl std::fmt::Debug for SignalForwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalForwarder").finish_non_exhaustive()
    }
}

impl Drop for SignalForwarder {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            join(thread);
        }
    }
}
