// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Hand-off between the decision loop and the update coordinator, plus the
//! shutdown flag both of them watch.

use crate::detector::lock;
use std::{
    sync::{Arc, Condvar, Mutex},
    time::{Duration, Instant},
};

/// Brightness the daemon wants, as percentages.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BrightnessTarget {
    /// Screen percent.
    pub screen: f64,
    /// Ambient light percent used to pick the keyboard level.
    pub keyboard: f64,
}

impl BrightnessTarget {
    /// Same percentage for both devices.
    pub fn both(percent: f64) -> Self {
        Self {
            screen: percent,
            keyboard: percent,
        }
    }
}

/// Single-slot mailbox where only the newest target survives.
///
/// Publishing never blocks. Targets published while the coordinator is busy
/// fading overwrite each other, and the coordinator picks up whichever one
/// is current when it next looks.
///
/// The slot also remembers the last target the decision loop committed to,
/// which is what gets put back after an outside change.
#[derive(Debug, Default)]
pub struct TargetSlot {
    inner: Mutex<Mailbox>,
    wake: Condvar,
}

#[derive(Debug, Default)]
struct Mailbox {
    pending: Option<BrightnessTarget>,
    committed: Option<BrightnessTarget>,
}

impl TargetSlot {
    /// Commits to `target`, replacing any pending target, and wakes the
    /// coordinator.
    pub fn publish(&self, target: BrightnessTarget) {
        log::debug!(
            "publishing target scr:{:.1}% kbd:{:.1}%",
            target.screen,
            target.keyboard
        );
        let mut inner = lock(&self.inner);
        inner.pending = Some(target);
        inner.committed = Some(target);
        self.wake.notify_all();
    }

    /// Records `target` as committed without waking anyone, for when the
    /// hardware already shows it.
    pub fn assume(&self, target: BrightnessTarget) {
        lock(&self.inner).committed = Some(target);
    }

    /// Publishes the committed target again, unless a newer one is already
    /// waiting. Returns the target put back, if any.
    pub fn reassert(&self) -> Option<BrightnessTarget> {
        let mut inner = lock(&self.inner);
        if inner.pending.is_some() {
            return None;
        }
        inner.pending = inner.committed;
        if inner.pending.is_some() {
            self.wake.notify_all();
        }
        inner.pending
    }

    /// Takes the pending target, if any, without waiting.
    pub fn take(&self) -> Option<BrightnessTarget> {
        lock(&self.inner).pending.take()
    }

    /// Waits up to `timeout` for a target and takes it.
    pub fn wait_take(&self, timeout: Duration) -> Option<BrightnessTarget> {
        let guard = lock(&self.inner);
        let (mut guard, _) = self
            .wake
            .wait_timeout_while(guard, timeout, |inner| inner.pending.is_none())
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.pending.take()
    }
}

/// Shared "please stop" flag. Clones refer to the same flag.
#[derive(Clone, Debug, Default)]
pub struct Shutdown {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Shutdown {
    /// Creates a flag that isn't set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the flag and wakes everyone waiting on it.
    pub fn request(&self) {
        let (flag, cond) = &*self.inner;
        *lock(flag) = true;
        cond.notify_all();
    }

    /// Whether the flag is set.
    pub fn is_requested(&self) -> bool {
        *lock(&self.inner.0)
    }

    /// Sleeps until `deadline` or until the flag is set, whichever comes
    /// first. Returns whether the flag is set.
    pub fn sleep_until(&self, deadline: Instant) -> bool {
        let (flag, cond) = &*self.inner;
        let timeout = deadline.saturating_duration_since(Instant::now());
        let guard = lock(flag);
        let (guard, _) = cond
            .wait_timeout_while(guard, timeout, |stop| !*stop)
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard
    }

    /// Blocks until the flag is set.
    pub fn wait(&self) {
        let (flag, cond) = &*self.inner;
        let guard = lock(flag);
        let _guard = cond
            .wait_while(guard, |stop| !*stop)
            .unwrap_or_else(std::sync::PoisonError::into_inner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn newest_target_wins() {
        let slot = TargetSlot::default();
        slot.publish(BrightnessTarget::both(60.0));
        slot.publish(BrightnessTarget::both(0.0));
        assert_eq!(slot.take(), Some(BrightnessTarget::both(0.0)));
        assert_eq!(slot.take(), None);
    }

    #[test]
    fn reassert_never_replaces_a_pending_target() {
        let slot = TargetSlot::default();
        assert_eq!(slot.reassert(), None);

        slot.assume(BrightnessTarget::both(40.0));
        assert_eq!(slot.reassert(), Some(BrightnessTarget::both(40.0)));
        assert_eq!(slot.take(), Some(BrightnessTarget::both(40.0)));

        slot.publish(BrightnessTarget::both(0.0));
        assert_eq!(slot.reassert(), None);
        assert_eq!(slot.take(), Some(BrightnessTarget::both(0.0)));

        // Taking doesn't forget what was committed.
        assert_eq!(slot.reassert(), Some(BrightnessTarget::both(0.0)));
    }

    #[test]
    fn wait_times_out_when_nothing_is_published() {
        let slot = TargetSlot::default();
        assert_eq!(slot.wait_take(Duration::from_millis(10)), None);
    }

    #[test]
    fn wait_wakes_on_publish() {
        let slot = Arc::new(TargetSlot::default());
        let publisher = {
            let slot = Arc::clone(&slot);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                slot.publish(BrightnessTarget::both(42.0));
            })
        };
        assert_eq!(
            slot.wait_take(Duration::from_secs(10)),
            Some(BrightnessTarget::both(42.0))
        );
        publisher.join().unwrap();
    }

    #[test]
    fn shutdown_cuts_sleep_short() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.sleep_until(Instant::now() + Duration::from_millis(5)));

        let waiter = {
            let shutdown = shutdown.clone();
            thread::spawn(move || shutdown.sleep_until(Instant::now() + Duration::from_secs(60)))
        };
        shutdown.request();
        assert!(waiter.join().unwrap());
        assert!(shutdown.is_requested());
        shutdown.wait();
    }
}
