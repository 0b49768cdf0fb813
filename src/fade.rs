// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Gradual brightness changes.
//!
//! Jumping straight to a new brightness is jarring, so the screen is moved
//! in small raw steps spread over a configured duration, and the keyboard
//! is walked one level at a time. Every single write goes through the
//! [`OutsideChangeDetector`], so a hotkey pressed mid-fade stops the fade
//! on the very next step.

use crate::{
    config::{Config, KeyboardLevels},
    detector::OutsideChangeDetector,
    error::{Conflict, Error, Result},
    target::BrightnessTarget,
};
use std::{sync::Arc, thread, time::Duration};

/// Shortest pause between two screen steps. Anything faster doesn't look
/// any smoother, it only costs more writes.
pub const MIN_STEP_INTERVAL: Duration = Duration::from_millis(5);

/// How a screen fade will move from one raw value to another.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ScreenRamp {
    /// Raw value before the fade.
    pub from: u32,
    /// Raw value the fade lands on.
    pub to: u32,
    /// Signed raw change per step.
    pub step: i64,
    /// Pause after each intermediate step.
    pub interval: Duration,
}

impl ScreenRamp {
    /// Plans a fade from `from` to `to` taking roughly `duration`. Returns
    /// `None` if there is nothing to do.
    ///
    /// Steps start at one raw unit. While that would mean pausing less than
    /// [`MIN_STEP_INTERVAL`] between steps, step size and pause are doubled
    /// together, keeping the overall duration.
    pub fn plan(from: u32, to: u32, duration: Duration) -> Option<Self> {
        let diff = i64::from(to) - i64::from(from);
        if diff == 0 {
            return None;
        }
        let distance = diff.unsigned_abs();
        let mut step = diff.signum();
        // `distance` is at most u32::MAX since both ends are u32.
        let mut interval = duration / distance as u32;
        while interval < MIN_STEP_INTERVAL && step.unsigned_abs() < distance {
            interval *= 2;
            step *= 2;
        }
        Some(Self {
            from,
            to,
            step,
            interval: interval.max(MIN_STEP_INTERVAL),
        })
    }

    /// Every value the fade writes, in order. The last one is always `to`
    /// exactly, whatever the step size.
    pub fn values(&self) -> impl Iterator<Item = u32> {
        let step = self.step;
        let to = i64::from(self.to);
        std::iter::successors(Some(i64::from(self.from) + step), move |v| Some(v + step))
            .take_while(move |&v| if step > 0 { v < to } else { v > to })
            .map(|v| v as u32)
            .chain(std::iter::once(self.to))
    }
}

/// Keyboard levels visited going from `current` to `target`, one at a time,
/// excluding `current`.
pub fn keyboard_steps(current: u32, target: u32) -> Vec<u32> {
    if target >= current {
        (current + 1..=target).collect()
    } else {
        (target..current).rev().collect()
    }
}

/// Drives both backlights toward a target.
#[derive(Debug)]
pub struct Fader {
    detector: Arc<OutsideChangeDetector>,
    screen_min: f64,
    screen_fade: Duration,
    keyboard_levels: KeyboardLevels,
    keyboard_step: Duration,
}

impl Fader {
    /// Creates a fader writing through `detector`.
    pub fn new(config: &Config, detector: Arc<OutsideChangeDetector>) -> Self {
        Self {
            detector,
            screen_min: config.screen_min,
            screen_fade: config.screen_fade,
            keyboard_levels: config.keyboard_levels,
            keyboard_step: config.keyboard_step,
        }
    }

    /// Fades both devices at once, one worker each, and waits for both.
    ///
    /// If both report outside changes, the conflicts are merged.
    pub fn apply(&self, target: BrightnessTarget) -> Result<()> {
        let (screen, keyboard) = thread::scope(|s| {
            let screen = s.spawn(|| self.fade_screen(target.screen));
            let keyboard = s.spawn(|| self.fade_keyboard(target.keyboard));
            (
                screen
                    .join()
                    .unwrap_or_else(|_| Err(Error::FadePanicked("screen"))),
                keyboard
                    .join()
                    .unwrap_or_else(|_| Err(Error::FadePanicked("keyboard"))),
            )
        });
        merge(screen, keyboard)
    }

    /// Fades the screen to `percent` (floored at the configured minimum)
    /// over the configured duration.
    pub fn fade_screen(&self, percent: f64) -> Result<()> {
        let percent = percent.max(self.screen_min);
        let raw_target = self.detector.hardware().screen_raw(percent);
        self.detector.check_screen()?;
        let current = self.detector.screen();

        let Some(ramp) = ScreenRamp::plan(current, raw_target, self.screen_fade) else {
            return Ok(());
        };
        log::debug!(
            "screen {current} -> {raw_target} ({percent:.1}%, step {}, interval {:?})",
            ramp.step,
            ramp.interval
        );

        let mut values = ramp.values().peekable();
        while let Some(value) = values.next() {
            self.detector.write_screen(value)?;
            if values.peek().is_some() {
                thread::sleep(ramp.interval);
            }
        }
        Ok(())
    }

    /// Walks the keyboard to the level matching `percent`, if there is a
    /// keyboard and it isn't there already.
    pub fn fade_keyboard(&self, percent: f64) -> Result<()> {
        self.detector.check_keyboard()?;
        let Some(current) = self.detector.keyboard() else {
            return Ok(());
        };
        let target = self.keyboard_levels.level_for(percent);
        if target == current {
            return Ok(());
        }
        log::debug!("keyboard {current} -> {target}");

        for level in keyboard_steps(current, target) {
            self.detector.write_keyboard(level)?;
            thread::sleep(self.keyboard_step);
        }
        Ok(())
    }
}

/// Combines the results of the two fades, preferring outside changes over
/// other failures since those decide what the daemon does next.
fn merge(screen: Result<()>, keyboard: Result<()>) -> Result<()> {
    match (screen, keyboard) {
        (Err(Error::OutsideChange(a)), Err(Error::OutsideChange(b))) => Err(Conflict {
            screen: a.screen.or(b.screen),
            keyboard: a.keyboard.or(b.keyboard),
        }
        .into()),
        (Err(e @ Error::OutsideChange(_)), Err(other))
        | (Err(other), Err(e @ Error::OutsideChange(_))) => {
            log::error!("fade failed: {other}");
            Err(e)
        }
        (Err(e), _) | (_, Err(e)) => Err(e),
        (Ok(()), Ok(())) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{self, FakePort};

    fn fader(port: &FakePort) -> Fader {
        let config = Config {
            screen_fade: Duration::ZERO,
            keyboard_step: Duration::ZERO,
            ..Config::default()
        };
        let detector = OutsideChangeDetector::new(Arc::new(fake::hardware(port))).unwrap();
        Fader::new(&config, Arc::new(detector))
    }

    #[test]
    fn plan_without_doubling() {
        let ramp = ScreenRamp::plan(40, 80, Duration::from_millis(500)).unwrap();
        assert_eq!(ramp.step, 1);
        assert_eq!(ramp.interval, Duration::from_micros(12_500));
        let values = ramp.values().collect::<Vec<_>>();
        assert_eq!(values.len(), 40);
        assert_eq!(values, (41..=80).collect::<Vec<_>>());
    }

    #[test]
    fn plan_doubles_short_intervals() {
        let ramp = ScreenRamp::plan(0, 937, Duration::from_millis(500)).unwrap();
        assert_eq!(ramp.step, 16);
        assert!(ramp.interval >= MIN_STEP_INTERVAL);
        let values = ramp.values().collect::<Vec<_>>();
        assert_eq!(values.first(), Some(&16));
        assert_eq!(values.last(), Some(&937));
    }

    #[test]
    fn plan_downward() {
        let ramp = ScreenRamp::plan(100, 37, Duration::from_millis(100)).unwrap();
        assert!(ramp.step < 0);
        let values = ramp.values().collect::<Vec<_>>();
        assert!(values.windows(2).all(|w| w[0] > w[1]));
        assert_eq!(values.last(), Some(&37));
    }

    #[test]
    fn nothing_to_plan() {
        assert_eq!(ScreenRamp::plan(12, 12, Duration::from_secs(1)), None);
    }

    #[test]
    fn interval_floor_and_exact_landing_hold_everywhere() {
        let durations = [
            Duration::ZERO,
            Duration::from_micros(1),
            Duration::from_millis(3),
            Duration::from_millis(200),
            Duration::from_secs(2),
        ];
        for duration in durations {
            for (from, to) in [(0, 1), (1, 0), (5, 6), (0, 255), (255, 3), (0, 96_000), (96_000, 1)] {
                let ramp = ScreenRamp::plan(from, to, duration).unwrap();
                assert!(ramp.interval >= MIN_STEP_INTERVAL, "{ramp:?}");
                let values = ramp.values().collect::<Vec<_>>();
                assert_eq!(values.last(), Some(&to), "{ramp:?}");
                let monotonic = if to > from {
                    values.windows(2).all(|w| w[0] < w[1])
                } else {
                    values.windows(2).all(|w| w[0] > w[1])
                };
                assert!(monotonic, "{ramp:?}");
            }
        }
    }

    #[test]
    fn keyboard_steps_one_level_at_a_time() {
        assert_eq!(keyboard_steps(0, 3), [1, 2, 3]);
        assert_eq!(keyboard_steps(3, 0), [2, 1, 0]);
        assert_eq!(keyboard_steps(1, 2), [2]);
        assert!(keyboard_steps(2, 2).is_empty());
    }

    #[test]
    fn screen_fade_lands_on_target() {
        let port = FakePort::laptop();
        let fader = fader(&port);

        fader.fade_screen(80.0).unwrap();
        let writes = port.writes_to(fake::SCREEN);
        assert_eq!(writes.last().map(String::as_str), Some("80"));
        assert_eq!(port.get(fake::SCREEN), "80");
    }

    #[test]
    fn screen_fade_respects_the_floor() {
        let port = FakePort::laptop();
        let fader = fader(&port);

        fader.fade_screen(0.0).unwrap();
        assert_eq!(port.get(fake::SCREEN), "5");
    }

    #[test]
    fn screen_fade_to_current_value_writes_nothing() {
        let port = FakePort::laptop();
        let fader = fader(&port);

        fader.fade_screen(40.0).unwrap();
        assert!(port.writes_to(fake::SCREEN).is_empty());
    }

    #[test]
    fn outside_change_stops_a_fade() {
        let port = FakePort::laptop();
        let config = Config {
            screen_fade: Duration::from_millis(200),
            ..Config::default()
        };
        let detector = OutsideChangeDetector::new(Arc::new(fake::hardware(&port))).unwrap();
        let fader = Fader::new(&config, Arc::new(detector));
        port.interfere(fake::SCREEN, 3, "99");

        let err = fader.fade_screen(5.0).unwrap_err();
        assert!(matches!(
            err,
            Error::OutsideChange(Conflict { screen: Some(99), .. })
        ));
        assert_eq!(port.writes_to(fake::SCREEN).len(), 3);
        assert_eq!(port.get(fake::SCREEN), "99");
    }

    #[test]
    fn keyboard_walks_levels() {
        let port = FakePort::laptop();
        let fader = fader(&port);

        fader.fade_keyboard(2.0).unwrap();
        assert_eq!(port.writes_to(fake::KEYBOARD), ["1", "2", "3"]);

        fader.fade_keyboard(3.0).unwrap();
        assert_eq!(port.writes_to(fake::KEYBOARD).len(), 3);

        fader.fade_keyboard(100.0).unwrap();
        assert_eq!(
            port.writes_to(fake::KEYBOARD),
            ["1", "2", "3", "2", "1", "0"]
        );
    }

    #[test]
    fn apply_runs_both_devices() {
        let port = FakePort::laptop();
        let fader = fader(&port);

        fader
            .apply(BrightnessTarget {
                screen: 60.0,
                keyboard: 0.0,
            })
            .unwrap();
        assert_eq!(port.get(fake::SCREEN), "60");
        assert_eq!(port.get(fake::KEYBOARD), "3");
    }

    #[test]
    fn merge_prefers_conflicts() {
        let conflict = |screen, keyboard| -> Result<()> {
            Err(Conflict { screen, keyboard }.into())
        };
        assert!(merge(Ok(()), Ok(())).is_ok());
        assert!(matches!(
            merge(conflict(Some(1), None), conflict(None, Some(2))),
            Err(Error::OutsideChange(Conflict {
                screen: Some(1),
                keyboard: Some(2)
            }))
        ));
        assert!(matches!(
            merge(Err(Error::Config("x".into())), conflict(None, Some(2))),
            Err(Error::OutsideChange(_))
        ));
        assert!(matches!(
            merge(Ok(()), Err(Error::Config("x".into()))),
            Err(Error::Config(_))
        ));
    }
}
