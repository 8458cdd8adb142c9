// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Time Keeping
//!
//! Every bounded wait in the harness is expressed as a timeout in
//! microseconds checked against a [`Clock`]. The generic timer backs the
//! clock on hardware; [`VirtualClock`] backs it on the host, where
//! `udelay` simply advances time so long polls finish instantly.

use core::sync::atomic::{AtomicU64, Ordering};

/// Microsecond clock with busy-wait delays
pub trait Clock: Sync {
    /// Monotonic time in microseconds
    fn now_us(&self) -> u64;

    /// Busy-wait for `us` microseconds
    fn udelay(&self, us: u64);

    /// Busy-wait for `ms` milliseconds
    fn mdelay(&self, ms: u64) {
        self.udelay(ms * 1000);
    }
}

/// Point in time after which a wait gives up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at_us: u64,
}

impl Deadline {
    /// Deadline `timeout_us` microseconds from now
    pub fn after(clock: &dyn Clock, timeout_us: u64) -> Self {
        Self {
            at_us: clock.now_us().saturating_add(timeout_us),
        }
    }

    /// Check whether the deadline has passed
    pub fn expired(&self, clock: &dyn Clock) -> bool {
        clock.now_us() >= self.at_us
    }
}

/// Poll `cond` every `step_us` until it holds or `timeout_us` elapses
///
/// Returns `true` if the condition was met.
pub fn wait_until(
    clock: &dyn Clock,
    timeout_us: u64,
    step_us: u64,
    mut cond: impl FnMut() -> bool,
) -> bool {
    let deadline = Deadline::after(clock, timeout_us);
    loop {
        if cond() {
            return true;
        }
        if deadline.expired(clock) {
            return false;
        }
        clock.udelay(step_us);
    }
}

/// Clock whose time only moves when someone waits
pub struct VirtualClock {
    now: AtomicU64,
}

impl VirtualClock {
    pub const fn new() -> Self {
        Self {
            now: AtomicU64::new(0),
        }
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for VirtualClock {
    fn now_us(&self) -> u64 {
        self.now.load(Ordering::Relaxed)
    }

    fn udelay(&self, us: u64) {
        self.now.fetch_add(us, Ordering::Relaxed);
        core::hint::spin_loop();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline_expires() {
        let clock = VirtualClock::new();
        let deadline = Deadline::after(&clock, 10);
        assert!(!deadline.expired(&clock));
        clock.udelay(9);
        assert!(!deadline.expired(&clock));
        clock.udelay(1);
        assert!(deadline.expired(&clock));
    }

    #[test]
    fn test_wait_until() {
        let clock = VirtualClock::new();
        let mut polls = 0;
        assert!(wait_until(&clock, 100, 1, || {
            polls += 1;
            polls == 5
        }));
        assert_eq!(clock.now_us(), 4);

        assert!(!wait_until(&clock, 50, 10, || false));
        assert!(clock.now_us() >= 54);
    }
}
