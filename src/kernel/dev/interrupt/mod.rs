// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Interrupt Controllers
//!
//! Only the ARM GIC is supported, and of it only what the ITS tests
//! need: GICv3 distributor/redistributor bring-up, LPIs, and the ITS.
//!
//! # QEMU Support
//!
//! ```bash
//! qemu-system-aarch64 -M virt,gic-version=3,its=on -smp 4
//! ```

pub mod arm_gic;

/// First LPI INTID
pub const GIC_LPI_BASE: u32 = 8192;

/// INTID returned by the CPU interface when nothing is pending
pub const GIC_SPURIOUS_IRQ: u32 = 1023;

/// Per-CPU interrupt acknowledge interface
///
/// Implemented with ICC system registers on hardware and by the software
/// GIC model on the host.
pub trait CpuInterface {
    /// Logical index of the CPU taking the interrupt
    fn cpu_id(&self) -> usize;

    /// Acknowledge the highest priority pending group 1 interrupt
    fn ack(&self) -> u32;

    /// Signal end of interrupt for a value returned by [`ack`](Self::ack)
    fn eoi(&self, iar: u32);
}

/// Receiver of physical IRQs
///
/// The platform calls [`handle_irq`](Self::handle_irq) on the CPU that
/// took the exception; the sink acknowledges and completes the interrupt
/// through `cpu`.
pub trait IrqSink: Sync {
    fn handle_irq(&self, cpu: &dyn CpuInterface);
}

/// INTID field of an acknowledge value
#[inline]
pub const fn iar_irqnr(iar: u32) -> u32 {
    iar & 0x00ff_ffff
}
