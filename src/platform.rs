// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Platform Compatibility Module
//!
//! A [`Platform`] bundles everything the harness consumes from its
//! environment: register access, time, memory, CPUs, the GIC frame
//! addresses and a way to route IRQs to a handler.
//!
//! - [`virt`] - QEMU `virt` machine, bare metal
//! - [`sim`] - software GICv3 + ITS model, hosted builds only

#[cfg(not(target_os = "none"))]
pub mod sim;
#[cfg(all(target_arch = "aarch64", target_os = "none"))]
pub mod virt;

use crate::kernel::dev::interrupt::arm_gic::GicBases;
use crate::kernel::dev::interrupt::IrqSink;
use crate::kernel::mp::Smp;
use crate::kernel::pmm::PageAllocator;
use crate::kernel::timer::Clock;
use crate::reg::RegisterBus;

/// Services a board provides to the harness
pub trait Platform: Sync {
    /// Short board name for the banner
    fn name(&self) -> &'static str;

    /// Register and memory access
    fn bus(&self) -> &dyn RegisterBus;

    fn clock(&self) -> &dyn Clock;

    /// Allocator for GIC tables and the command queue
    fn pages(&self) -> &dyn PageAllocator;

    fn smp(&self) -> &dyn Smp;

    /// Interrupt controller frames, `None` without a GIC
    fn gic_bases(&self) -> Option<GicBases>;

    /// Route physical IRQs on every CPU to `sink`
    ///
    /// Also unmasks IRQs on the calling CPU. Secondaries started after
    /// this call come up with IRQs unmasked.
    fn set_irq_sink(&self, sink: &'static dyn IrqSink);
}
