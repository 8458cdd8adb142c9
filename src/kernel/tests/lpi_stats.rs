// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! LPI Result Channel
//!
//! One expected and one observed (cpu, intid) pair shared between the
//! orchestrating CPU and whichever CPU takes the LPI. It is a single
//! slot, not a queue: every check drains it before the next trigger.
//!
//! Ordering:
//! - [`LpiStats::expect`] clears the observed slot and publishes with a
//!   release fence, pairing with the acquire fence in the handler
//! - the handler publishes the observed pair with a release fence,
//!   pairing with the acquire fence in [`LpiStats::check`]

use crate::kernel::dev::interrupt::{iar_irqnr, CpuInterface, IrqSink, GIC_LPI_BASE, GIC_SPURIOUS_IRQ};
use crate::kernel::tests::runner::Reporter;
use crate::kernel::timer::Clock;
use core::fmt;
use core::sync::atomic::{fence, AtomicI32, Ordering};

/// A (cpu, intid) pair; -1 in both fields means "nothing"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LpiEvent {
    pub cpu: i32,
    pub lpi: i32,
}

impl LpiEvent {
    pub const NONE: LpiEvent = LpiEvent { cpu: -1, lpi: -1 };

    pub const fn new(cpu: usize, lpi: u32) -> Self {
        Self {
            cpu: cpu as i32,
            lpi: lpi as i32,
        }
    }

    pub fn is_none(&self) -> bool {
        *self == Self::NONE
    }
}

impl fmt::Display for LpiEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(cpuid={}, intid={})", self.cpu, self.lpi)
    }
}

/// Expected/observed LPI record
pub struct LpiStats {
    exp_cpu: AtomicI32,
    exp_lpi: AtomicI32,
    obs_cpu: AtomicI32,
    obs_lpi: AtomicI32,
}

impl LpiStats {
    pub const fn new() -> Self {
        Self {
            exp_cpu: AtomicI32::new(-1),
            exp_lpi: AtomicI32::new(-1),
            obs_cpu: AtomicI32::new(-1),
            obs_lpi: AtomicI32::new(-1),
        }
    }

    fn arm(&self, ev: LpiEvent) {
        self.exp_cpu.store(ev.cpu, Ordering::Relaxed);
        self.exp_lpi.store(ev.lpi, Ordering::Relaxed);
        self.obs_cpu.store(-1, Ordering::Relaxed);
        self.obs_lpi.store(-1, Ordering::Relaxed);
        fence(Ordering::Release);
    }

    /// Arm a check expecting `lpi` on `cpu`
    pub fn expect(&self, cpu: usize, lpi: u32) {
        self.arm(LpiEvent::new(cpu, lpi));
    }

    /// Arm a check expecting no LPI at all
    pub fn expect_none(&self) {
        self.arm(LpiEvent::NONE);
    }

    /// Store an observation; called from interrupt context
    pub fn record(&self, cpu: usize, lpi: u32) {
        fence(Ordering::Acquire);
        self.obs_cpu.store(cpu as i32, Ordering::Relaxed);
        self.obs_lpi.store(lpi as i32, Ordering::Relaxed);
        fence(Ordering::Release);
    }

    pub fn expected(&self) -> LpiEvent {
        fence(Ordering::Acquire);
        LpiEvent {
            cpu: self.exp_cpu.load(Ordering::Relaxed),
            lpi: self.exp_lpi.load(Ordering::Relaxed),
        }
    }

    pub fn observed(&self) -> LpiEvent {
        fence(Ordering::Acquire);
        LpiEvent {
            cpu: self.obs_cpu.load(Ordering::Relaxed),
            lpi: self.obs_lpi.load(Ordering::Relaxed),
        }
    }

    /// Wait `wait_ms`, then compare observation and expectation
    ///
    /// Reports `msg` exactly once, preceded by an INFO line explaining
    /// a mismatch.
    pub fn check(&self, reporter: &Reporter<'_>, clock: &dyn Clock, wait_ms: u64, msg: &str) -> bool {
        clock.mdelay(wait_ms);

        let expected = self.expected();
        let observed = self.observed();
        let pass = observed == expected;

        if !pass {
            if observed.is_none() {
                reporter.report_info(format_args!(
                    "No LPI received whereas (cpuid={}, intid={}) was expected",
                    expected.cpu, expected.lpi
                ));
            } else {
                reporter.report_info(format_args!("Unexpected LPI {}", observed));
            }
        }
        reporter.report(pass, msg);
        pass
    }
}

impl Default for LpiStats {
    fn default() -> Self {
        Self::new()
    }
}

impl IrqSink for LpiStats {
    fn handle_irq(&self, cpu: &dyn CpuInterface) {
        let iar = cpu.ack();
        let irqnr = iar_irqnr(iar);
        if irqnr == GIC_SPURIOUS_IRQ {
            return;
        }

        if irqnr >= GIC_LPI_BASE {
            self.record(cpu.cpu_id(), irqnr);
        } else {
            log::warn!("cpu {}: unexpected irq {}", cpu.cpu_id(), irqnr);
        }
        cpu.eoi(iar);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::debug::CaptureConsole;
    use crate::kernel::timer::VirtualClock;
    use std::sync::Mutex;

    struct FakeCpu {
        cpu: usize,
        pending: u32,
        eoied: Mutex<Vec<u32>>,
    }

    impl CpuInterface for FakeCpu {
        fn cpu_id(&self) -> usize {
            self.cpu
        }
        fn ack(&self) -> u32 {
            self.pending
        }
        fn eoi(&self, iar: u32) {
            self.eoied.lock().unwrap().push(iar);
        }
    }

    fn fake(cpu: usize, pending: u32) -> FakeCpu {
        FakeCpu { cpu, pending, eoied: Mutex::new(Vec::new()) }
    }

    #[test]
    fn test_expected_lpi_passes() {
        let console = CaptureConsole::new();
        let reporter = Reporter::new(&console);
        let clock = VirtualClock::new();
        let stats = LpiStats::new();

        stats.expect(3, 8195);
        let cpu = fake(3, 8195);
        stats.handle_irq(&cpu);
        assert_eq!(*cpu.eoied.lock().unwrap(), vec![8195]);

        assert!(stats.check(&reporter, &clock, 100, "hit"));
        assert_eq!(clock.now_us(), 100_000);
        assert_eq!(console.lines_with(""), vec!["PASS: hit"]);
    }

    #[test]
    fn test_missing_lpi_explains() {
        let console = CaptureConsole::new();
        let reporter = Reporter::new(&console);
        let clock = VirtualClock::new();
        let stats = LpiStats::new();

        stats.expect(2, 8196);
        assert!(!stats.check(&reporter, &clock, 0, "miss"));
        assert_eq!(
            console.lines_with(""),
            vec![
                "INFO: No LPI received whereas (cpuid=2, intid=8196) was expected",
                "FAIL: miss",
            ]
        );
    }

    #[test]
    fn test_unexpected_lpi_explains() {
        let console = CaptureConsole::new();
        let reporter = Reporter::new(&console);
        let clock = VirtualClock::new();
        let stats = LpiStats::new();

        stats.record(1, 8200);
        stats.expect_none();
        assert!(stats.observed().is_none());
        stats.handle_irq(&fake(1, 8195));
        assert!(!stats.check(&reporter, &clock, 0, "quiet"));
        assert_eq!(
            console.lines_with("INFO:"),
            vec!["INFO: Unexpected LPI (cpuid=1, intid=8195)"]
        );
    }

    #[test]
    fn test_handler_ignores_non_lpis() {
        let stats = LpiStats::new();
        stats.expect_none();

        let spurious = fake(0, GIC_SPURIOUS_IRQ);
        stats.handle_irq(&spurious);
        assert!(spurious.eoied.lock().unwrap().is_empty());

        let ppi = fake(0, 27);
        stats.handle_irq(&ppi);
        assert_eq!(*ppi.eoied.lock().unwrap(), vec![27]);
        assert!(stats.observed().is_none());
    }
}
