// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! QEMU `virt` Machine
//!
//! ```bash
//! qemu-system-aarch64 -M virt,gic-version=3,its=on -cpu max -smp 4 \
//!     -semihosting -nographic -kernel gictest
//! ```
//!
//! Fixed memory map, PSCI over HVC, MMU off.

use crate::err::Result;
use crate::kernel::arch::arm64::{self, boot, exceptions};
use crate::kernel::dev::interrupt::arm_gic::v3::regs::{GICD_PIDR2, GICD_TYPER, GICD_TYPER_LPIS};
use crate::kernel::dev::interrupt::arm_gic::{GicBases, GicVersion};
use crate::kernel::dev::interrupt::IrqSink;
use crate::kernel::dev::psci::{Psci, PsciCallType};
use crate::kernel::dev::timer::arm_generic::GenericTimer;
use crate::kernel::mp::{SecondaryEntry, Smp};
use crate::kernel::pmm::{PageAllocator, PageArena};
use crate::kernel::timer::Clock;
use crate::platform::Platform;
use crate::reg::{Mmio, PAddr, RegisterBus};

pub const VIRT_GICD_BASE: PAddr = 0x0800_0000;
pub const VIRT_GITS_BASE: PAddr = 0x0808_0000;
pub const VIRT_GICR_BASE: PAddr = 0x080A_0000;
pub const VIRT_UART0_BASE: PAddr = 0x0900_0000;

/// Pages reserved for GIC tables after the image (32MB)
pub const VIRT_ARENA_PAGES: usize = 8192;

/// CPUs assumed when the command line does not say
pub const VIRT_DEFAULT_CPUS: usize = 4;

/// QEMU `virt` board services
pub struct VirtPlatform {
    bus: Mmio,
    clock: GenericTimer,
    arena: PageArena,
    psci: Psci,
    nr_cpus: usize,
}

impl VirtPlatform {
    /// Describe the board
    ///
    /// `arena_base` must be RAM owned by nobody else, with
    /// [`VIRT_ARENA_PAGES`] pages behind it.
    ///
    /// # Safety
    ///
    /// The MMU must be off; see [`Mmio::new`].
    pub unsafe fn new(arena_base: PAddr, nr_cpus: Option<usize>) -> Self {
        let psci = Psci::new(PsciCallType::Hvc);
        let nr_cpus = nr_cpus.unwrap_or(VIRT_DEFAULT_CPUS).clamp(1, arm64::MAX_CPUS);
        if nr_cpus > 1 && psci.affinity_info(arm64::cpu_to_mpidr(nr_cpus - 1)) < 0 {
            log::warn!("virt: cpu {} unknown to PSCI, CPU_ON will fail", nr_cpus - 1);
        }
        Self {
            // SAFETY: forwarded to the caller.
            bus: unsafe { Mmio::new() },
            clock: GenericTimer::new(),
            arena: PageArena::new(arena_base, VIRT_ARENA_PAGES),
            psci,
            nr_cpus,
        }
    }

    pub fn psci(&self) -> &Psci {
        &self.psci
    }
}

impl Smp for VirtPlatform {
    fn nr_cpus(&self) -> usize {
        self.nr_cpus
    }

    fn current_cpu(&self) -> usize {
        arm64::cpu_index()
    }

    fn affinity(&self, cpu: usize) -> u32 {
        arm64::cpu_to_mpidr(cpu) as u32
    }

    fn boot_secondary(&self, cpu: usize, entry: SecondaryEntry) -> Result<()> {
        boot::start_secondary(&self.psci, cpu, arm64::cpu_to_mpidr(cpu), entry)
    }
}

impl Platform for VirtPlatform {
    fn name(&self) -> &'static str {
        "qemu-virt"
    }

    fn bus(&self) -> &dyn RegisterBus {
        &self.bus
    }

    fn clock(&self) -> &dyn Clock {
        &self.clock
    }

    fn pages(&self) -> &dyn PageAllocator {
        &self.arena
    }

    fn smp(&self) -> &dyn Smp {
        self
    }

    /// GICv3 if GICD_PIDR2.ArchRev says so; an ITS if LPIs are supported
    fn gic_bases(&self) -> Option<GicBases> {
        let arch_rev = (self.bus.read32(VIRT_GICD_BASE + GICD_PIDR2) >> 4) & 0xf;
        let version = match arch_rev {
            3 | 4 => GicVersion::V3,
            2 => GicVersion::V2,
            _ => return None,
        };
        let lpis = self.bus.read32(VIRT_GICD_BASE + GICD_TYPER) & GICD_TYPER_LPIS != 0;

        Some(GicBases {
            version,
            dist: VIRT_GICD_BASE,
            redist: VIRT_GICR_BASE,
            its: (version == GicVersion::V3 && lpis).then_some(VIRT_GITS_BASE),
        })
    }

    fn set_irq_sink(&self, sink: &'static dyn IrqSink) {
        exceptions::set_irq_sink(sink);
        arm64::irq_enable();
    }
}
