// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! ARM Generic Timer Driver
//!
//! Only the free-running physical counter is used: it provides the
//! [`Clock`] behind every bounded wait. No timer interrupts are
//! programmed.
//!
//! # Register Access
//!
//! | Register | Description | Access |
//! |----------|-------------|--------|
//! | `cntfrq_el0` | Counter frequency | R |
//! | `cntpct_el0` | Physical counter value | R |

use crate::kernel::timer::Clock;
use aarch64_cpu::asm::barrier;
use aarch64_cpu::registers::*;

/// Generic timer backed clock
pub struct GenericTimer {
    _private: (),
}

impl GenericTimer {
    pub const fn new() -> Self {
        Self { _private: () }
    }

    /// Counter frequency in Hz
    pub fn frequency(&self) -> u64 {
        CNTFRQ_EL0.get()
    }

    /// Raw counter value, ordered after earlier instructions
    pub fn ticks(&self) -> u64 {
        barrier::isb(barrier::SY);
        CNTPCT_EL0.get()
    }
}

impl Default for GenericTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for GenericTimer {
    fn now_us(&self) -> u64 {
        let freq = self.frequency().max(1);
        // 128-bit intermediate: counters run for years before overflowing
        ((self.ticks() as u128 * 1_000_000) / freq as u128) as u64
    }

    fn udelay(&self, us: u64) {
        let freq = self.frequency().max(1);
        let delta = (us as u128 * freq as u128).div_ceil(1_000_000) as u64;
        let start = self.ticks();
        while self.ticks().wrapping_sub(start) < delta {
            core::hint::spin_loop();
        }
    }
}
