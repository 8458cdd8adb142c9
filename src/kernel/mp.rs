// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Multi-Processor Support
//!
//! The harness only needs three things from SMP: how many CPUs are
//! present, a way to start a secondary CPU on an entry function, and a
//! rendezvous mask the boot CPU can wait on.
//!
//! # Usage
//!
//! ```rust
//! use gictest::kernel::mp::CpuMask;
//!
//! static READY: CpuMask = CpuMask::new();
//!
//! // On each secondary, once it is parked and able to take interrupts:
//! READY.set(1);
//!
//! // On the boot CPU:
//! assert!(READY.contains(1));
//! ```

use crate::err::Result;
use core::sync::atomic::{AtomicU64, Ordering};

/// Maximum number of CPUs
pub const SMP_MAX_CPUS: usize = 8;

/// Entry point run by a secondary CPU after it comes up
pub type SecondaryEntry = fn(cpu: usize) -> !;

/// SMP bring-up primitives
pub trait Smp: Sync {
    /// Number of present CPUs
    fn nr_cpus(&self) -> usize;

    /// Logical index of the calling CPU
    fn current_cpu(&self) -> usize;

    /// Affinity of `cpu` as Aff3.Aff2.Aff1.Aff0, the layout used by
    /// GICR_TYPER[63:32]
    fn affinity(&self, cpu: usize) -> u32 {
        cpu as u32
    }

    /// Start `cpu` running `entry`
    fn boot_secondary(&self, cpu: usize, entry: SecondaryEntry) -> Result<()>;
}

/// Convert CPU number to mask
pub const fn cpu_num_to_mask(cpu: usize) -> u64 {
    1u64 << cpu
}

/// Atomic CPU set, used as a rendezvous point
pub struct CpuMask {
    bits: AtomicU64,
}

impl CpuMask {
    pub const fn new() -> Self {
        Self {
            bits: AtomicU64::new(0),
        }
    }

    /// Add `cpu` to the set, publishing everything it wrote before
    pub fn set(&self, cpu: usize) {
        self.bits.fetch_or(cpu_num_to_mask(cpu), Ordering::Release);
    }

    pub fn contains(&self, cpu: usize) -> bool {
        self.bits.load(Ordering::Acquire) & cpu_num_to_mask(cpu) != 0
    }

    /// Check that every CPU in `1..nr_cpus` has checked in
    pub fn secondaries_ready(&self, nr_cpus: usize) -> bool {
        (1..nr_cpus).all(|cpu| self.contains(cpu))
    }

    pub fn clear(&self) {
        self.bits.store(0, Ordering::Release);
    }
}

impl Default for CpuMask {
    fn default() -> Self {
        Self::new()
    }
}

/// Idle the calling CPU until something happens
///
/// Interrupts taken while idle are handled before this returns.
#[inline]
pub fn cpu_idle() {
    #[cfg(all(target_arch = "aarch64", target_os = "none"))]
    aarch64_cpu::asm::wfi();

    #[cfg(not(target_os = "none"))]
    std::thread::park();

    #[cfg(all(target_os = "none", not(target_arch = "aarch64")))]
    core::hint::spin_loop();
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_mask() {
        let mask = CpuMask::new();
        assert!(mask.secondaries_ready(1));
        assert!(!mask.secondaries_ready(4));

        mask.set(1);
        mask.set(3);
        assert!(!mask.secondaries_ready(4));
        mask.set(2);
        assert!(mask.secondaries_ready(4));
        assert!(!mask.contains(0));

        mask.clear();
        assert!(!mask.contains(1));
    }

    #[test]
    fn test_ready_mask_across_threads() {
        use std::sync::Arc;

        let mask = Arc::new(CpuMask::new());
        let handles: Vec<_> = (1..4)
            .map(|cpu| {
                let mask = Arc::clone(&mask);
                std::thread::spawn(move || mask.set(cpu))
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(mask.secondaries_ready(4));
    }
}
