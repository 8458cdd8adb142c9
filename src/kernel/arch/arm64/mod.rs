// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! ARM64 (AArch64) Support
//!
//! The image runs at EL1 with the MMU off, so every physical address is
//! directly accessible and all memory is treated as Device-nGnRnE.
//!
//! - [`boot`] - entry points, stacks, secondary CPU bring-up
//! - [`exceptions`] - vector table and the IRQ path

pub mod boot;
pub mod exceptions;

use aarch64_cpu::registers::*;

/// CPUs the image has stacks for
pub const MAX_CPUS: usize = 8;

/// Per-CPU stack size
pub const STACK_SHIFT: u32 = 14;
pub const STACK_SIZE: usize = 1 << STACK_SHIFT;

/// Number of CPUs in a QEMU `virt` cluster with a GICv3
pub const CLUSTER_SIZE: usize = 16;

/// MPIDR affinity of logical CPU `cpu`
pub const fn cpu_to_mpidr(cpu: usize) -> u64 {
    (((cpu / CLUSTER_SIZE) as u64) << 8) | (cpu % CLUSTER_SIZE) as u64
}

/// Logical index of the calling CPU
pub fn cpu_index() -> usize {
    let mpidr = MPIDR_EL1.get();
    let aff0 = (mpidr & 0xff) as usize;
    let aff1 = ((mpidr >> 8) & 0xff) as usize;
    aff1 * CLUSTER_SIZE + aff0
}

/// Unmask IRQs on the calling CPU
#[inline]
pub fn irq_enable() {
    DAIF.modify(DAIF::I::Unmasked);
}
