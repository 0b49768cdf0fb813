// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The decision loop.
//!
//! Once per update interval, [`EventLoop::tick`] works out whether the
//! machine is in use, idle, or has its lid closed, and publishes a new
//! [`BrightnessTarget`] when that calls for a change. It never writes to the
//! backlights itself; that's the coordinator's job.
//!
//! Conditions are checked in priority order each tick:
//!
//! 1. Lid closed: publish (0, 0) once on entry, then do nothing.
//! 2. Idle: publish the dim target once on entry, keep sampling light.
//! 3. Back from idle or closed: publish the last committed brightness.
//! 4. In use: follow the ambient light tendency when it moves enough.

use crate::{
    ambient::AmbientLight,
    config::{Config, OutsideChangePolicy},
    detector::OutsideChangeDetector,
    error::{Conflict, Error, Result},
    idle::IdleSensor,
    target::{BrightnessTarget, Shutdown, TargetSlot},
};
use std::{sync::Arc, time::Instant};

/// What the user is doing, as far as brightness is concerned.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DaemonState {
    /// Someone's using the machine; brightness follows ambient light.
    Used,
    /// No input for a while; screen is dimmed.
    Idle,
    /// Lid is closed; backlights are off.
    Closed,
}

/// Whether the loop should keep going after handling an outside change.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Flow {
    /// Carry on with the tick.
    Continue,
    /// The daemon is shutting down.
    Stop,
}

/// Applies the configured policy to an outside change. Shared by the
/// decision loop and the update coordinator.
///
/// Re-asserting puts back the last committed target, and only if nothing
/// newer is waiting in `targets`.
pub fn handle_outside_change(
    policy: OutsideChangePolicy,
    conflict: &Conflict,
    targets: &TargetSlot,
    shutdown: &Shutdown,
) -> Flow {
    match policy {
        OutsideChangePolicy::Terminate => {
            log::info!("{conflict}, exiting");
            shutdown.request();
            Flow::Stop
        }
        OutsideChangePolicy::Reassert => {
            match targets.reassert() {
                Some(target) => log::info!(
                    "{conflict}, restoring scr:{:.1}% kbd:{:.1}%",
                    target.screen,
                    target.keyboard
                ),
                None => log::info!("{conflict}, a newer target is already pending"),
            }
            Flow::Continue
        }
    }
}

/// The brightness state machine.
#[derive(Debug)]
pub struct EventLoop {
    config: Arc<Config>,
    detector: Arc<OutsideChangeDetector>,
    idle: Box<dyn IdleSensor>,
    targets: Arc<TargetSlot>,
    shutdown: Shutdown,
    ambient: AmbientLight,
    state: DaemonState,
    last_committed: f64,
}

impl EventLoop {
    /// Starts in [`DaemonState::Used`], taking the current screen brightness
    /// as the last committed level so that startup doesn't cause a fade when
    /// the screen is already about right.
    pub fn new(
        config: Arc<Config>,
        detector: Arc<OutsideChangeDetector>,
        idle: Box<dyn IdleSensor>,
        targets: Arc<TargetSlot>,
        shutdown: Shutdown,
    ) -> Self {
        let mut last_committed = detector.hardware().screen_percent(detector.screen());
        if last_committed < config.screen_min {
            last_committed = 0.0;
        }
        log::debug!("starting from {last_committed:.1}%");
        targets.assume(BrightnessTarget::both(last_committed));
        Self {
            ambient: AmbientLight::new(&config),
            config,
            detector,
            idle,
            targets,
            shutdown,
            state: DaemonState::Used,
            last_committed,
        }
    }

    /// Current state.
    pub fn state(&self) -> DaemonState {
        self.state
    }

    /// Ambient light percentage brightness was last set to follow.
    pub fn last_committed(&self) -> f64 {
        self.last_committed
    }

    /// Runs [`tick`](Self::tick) every update interval until shutdown is
    /// requested. A failing tick is logged and the next one runs as usual.
    pub fn run(mut self) {
        log::debug!("event detection loop started");
        while !self.shutdown.is_requested() {
            let start = Instant::now();
            if let Err(e) = self.tick() {
                log::error!("something went wrong, retrying later: {e}");
            }
            if self.shutdown.sleep_until(start + self.config.update_interval) {
                break;
            }
        }
        log::debug!("event detection loop stopped");
    }

    /// Evaluates the situation once and publishes a target if needed.
    pub fn tick(&mut self) -> Result<()> {
        let detector = Arc::clone(&self.detector);
        let hardware = detector.hardware();
        if hardware.lid_is_closed()? {
            if self.state != DaemonState::Closed {
                log::info!("lid closed");
                self.targets.publish(BrightnessTarget::both(0.0));
                self.state = DaemonState::Closed;
            }
            return Ok(());
        }

        if self.user_is_idle() {
            if self.state != DaemonState::Idle {
                if self.verify_outside_changes()? == Flow::Stop {
                    return Ok(());
                }
                log::info!("user idle");
                self.targets.publish(BrightnessTarget {
                    screen: self.config.screen_dim_min,
                    keyboard: 100.0,
                });
                self.state = DaemonState::Idle;
            }
            self.ambient.sample(hardware);
            return Ok(());
        }

        if self.state != DaemonState::Used {
            match self.state {
                DaemonState::Closed => log::info!("lid opened"),
                _ => log::info!("user back"),
            }
            self.state = DaemonState::Used;
            self.ambient.clear();
            self.ambient.sample(hardware);
            self.targets
                .publish(BrightnessTarget::both(self.last_committed));
            return Ok(());
        }

        if self.verify_outside_changes()? == Flow::Stop {
            return Ok(());
        }
        self.ambient.sample(hardware);
        if let Some(tendency) = self.ambient.tendency() {
            if (tendency - self.last_committed).abs() > self.config.ambient_light_delta {
                log::info!(
                    "ambient light moved from {:.1}% to {tendency:.1}%",
                    self.last_committed
                );
                self.targets.publish(BrightnessTarget::both(tendency));
                self.last_committed = tendency;
            }
        }
        Ok(())
    }

    fn user_is_idle(&mut self) -> bool {
        if !self.config.idle_enabled() {
            return false;
        }
        let threshold = self.config.idle_threshold.as_millis();
        u128::from(self.idle.effective_idle_milliseconds()) > threshold
    }

    /// Runs the outside change detector, applying the policy if it fires.
    /// Read failures propagate so the tick is retried later.
    fn verify_outside_changes(&self) -> Result<Flow> {
        match self.detector.check() {
            Ok(()) => Ok(Flow::Continue),
            Err(Error::OutsideChange(conflict)) => Ok(handle_outside_change(
                self.config.outside_change,
                &conflict,
                &self.targets,
                &self.shutdown,
            )),
            Err(e) => Err(e),
        }
    }
}
