// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! ARM GICv3 (Generic Interrupt Controller version 3)
//!
//! Distributor and redistributor bring-up plus the LPI tables the ITS
//! needs. The CPU interface lives in [`cpu_interface`] on hardware and in
//! the software model on the host.
//!
//! # Register Map
//!
//! ## Distributor (GICD)
//! | Offset | Name        | Description                   |
//! |--------|-------------|-------------------------------|
//! | 0x0000 | GICD_CTLR   | Distributor Control Register  |
//! | 0x0004 | GICD_TYPER  | Interrupt Controller Type     |
//! | 0x0008 | GICD_IIDR   | Implementer Identification    |
//! | 0x0080 | GICD_IGROUPR| Interrupt Group Registers     |
//!
//! ## Redistributor (GICR), one RD_base + SGI_base pair per CPU
//! | Offset | Name           | Description                |
//! |--------|----------------|----------------------------|
//! | 0x0000 | GICR_CTLR      | EnableLPIs, RWP            |
//! | 0x0008 | GICR_TYPER     | Affinity, Last, PLPIS      |
//! | 0x0014 | GICR_WAKER     | ProcessorSleep             |
//! | 0x0070 | GICR_PROPBASER | LPI configuration table    |
//! | 0x0078 | GICR_PENDBASER | LPI pending table          |

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
pub mod cpu_interface;
pub mod its;
pub mod regs;

use crate::bits::{bits_shift, order_for};
use crate::err::{GicError, Result};
use crate::kernel::dev::interrupt::arm_gic::{GicBases, GicVersion};
use crate::kernel::dev::interrupt::GIC_LPI_BASE;
use crate::kernel::mp::{Smp, SMP_MAX_CPUS};
use crate::kernel::pmm::{bytes_to_pages, PageAllocator};
use crate::kernel::timer::{wait_until, Clock};
use crate::platform::Platform;
use crate::reg::{Barrier, PAddr, RegisterBus};
use regs::*;

/// Size of the LPI property table and of each pending table
pub const LPI_TABLE_BYTES: usize = 64 * 1024;

/// Budget for RWP and wake polls (1s, as 100000 steps of 10us)
const RWP_TIMEOUT_US: u64 = 1_000_000;
const RWP_POLL_US: u64 = 10;

/// Upper bound on redistributor frames walked during discovery
const MAX_REDIST_FRAMES: usize = 64;

/// GICD_IGROUPR<n>
const GICD_IGROUPR: PAddr = 0x0080;

/// GICv3 shadow state
pub struct Gicv3<'a> {
    bus: &'a dyn RegisterBus,
    clock: &'a dyn Clock,
    pages: &'a dyn PageAllocator,
    dist: PAddr,
    redist: [PAddr; SMP_MAX_CPUS],
    its: Option<PAddr>,
    nr_cpus: usize,
    lpi_prop: Option<PAddr>,
}

impl<'a> Gicv3<'a> {
    /// Bind to the platform's GICv3 and locate one redistributor per CPU
    ///
    /// Returns `None` when the platform has no GICv3.
    pub fn probe(plat: &'a dyn Platform) -> Result<Option<Self>> {
        let Some(bases) = plat.gic_bases() else {
            return Ok(None);
        };
        if bases.version != GicVersion::V3 {
            log::info!("GIC: version {:?} is not supported", bases.version);
            return Ok(None);
        }

        let smp = plat.smp();
        let nr_cpus = smp.nr_cpus().min(SMP_MAX_CPUS);
        let mut gic = Self {
            bus: plat.bus(),
            clock: plat.clock(),
            pages: plat.pages(),
            dist: bases.dist,
            redist: [0; SMP_MAX_CPUS],
            its: bases.its,
            nr_cpus,
            lpi_prop: None,
        };
        gic.discover_redists(&bases, smp)?;

        log::debug!(
            "GICv3: dist={:#x} redist[0]={:#x} cpus={}",
            gic.dist,
            gic.redist[0],
            nr_cpus
        );
        Ok(Some(gic))
    }

    /// Walk the contiguous GICR region and match frames to CPUs by affinity
    fn discover_redists(&mut self, bases: &GicBases, smp: &dyn Smp) -> Result<()> {
        let mut found = [false; SMP_MAX_CPUS];
        let mut frame = bases.redist;

        for _ in 0..MAX_REDIST_FRAMES {
            let typer = self.bus.read64(frame + GICR_TYPER);
            let aff = bits_shift(typer, 63, 32) as u32;

            if let Some(cpu) = (0..self.nr_cpus).find(|&c| smp.affinity(c) == aff) {
                log::trace!("GICv3: redist {:#x} -> cpu {}", frame, cpu);
                self.redist[cpu] = frame;
                found[cpu] = true;
            }

            if typer & GICR_TYPER_LAST != 0 {
                break;
            }
            frame += if typer & GICR_TYPER_VLPIS != 0 {
                GICR_FRAME_STRIDE_VLPI
            } else {
                GICR_FRAME_STRIDE
            };
        }

        match found[..self.nr_cpus].iter().position(|f| !f) {
            Some(cpu) => {
                log::error!("GICv3: no redistributor for cpu {}", cpu);
                Err(GicError::NotPresent { what: "redistributor" })
            }
            None => Ok(()),
        }
    }

    pub fn bus(&self) -> &'a dyn RegisterBus {
        self.bus
    }

    pub fn clock(&self) -> &'a dyn Clock {
        self.clock
    }

    pub fn pages(&self) -> &'a dyn PageAllocator {
        self.pages
    }

    pub fn nr_cpus(&self) -> usize {
        self.nr_cpus
    }

    pub fn dist_base(&self) -> PAddr {
        self.dist
    }

    /// ITS control frame, if the platform has one
    pub fn its_base(&self) -> Option<PAddr> {
        self.its
    }

    /// RD_base frame of `cpu`
    pub fn redist_base(&self, cpu: usize) -> PAddr {
        self.redist[cpu]
    }

    /// SGI_base frame of `cpu`
    pub fn sgi_base(&self, cpu: usize) -> PAddr {
        self.redist[cpu] + GICR_SGI_BASE
    }

    fn wait_clear(&self, addr: PAddr, mask: u32, what: &'static str) -> Result<()> {
        let bus = self.bus;
        if wait_until(self.clock, RWP_TIMEOUT_US, RWP_POLL_US, || {
            bus.read32(addr) & mask == 0
        }) {
            Ok(())
        } else {
            log::error!("GICv3: {} timeout!", what);
            Err(GicError::Timeout { what })
        }
    }

    fn dist_wait_for_rwp(&self) -> Result<()> {
        self.wait_clear(self.dist + GICD_CTLR, GicdCtlr::RWP.bits(), "GICD RWP")
    }

    fn redist_wait_for_rwp(&self, cpu: usize) -> Result<()> {
        self.wait_clear(
            self.redist[cpu] + GICR_CTLR,
            GicrCtlr::RWP.bits(),
            "GICR RWP",
        )
    }

    /// Distributor and redistributor defaults
    ///
    /// 1. Disable the distributor and wait for RWP
    /// 2. Put every SPI in group 1
    /// 3. Enable affinity routing with group 1
    /// 4. Wake every redistributor and put its SGIs/PPIs in group 1
    pub fn enable_defaults(&self) -> Result<()> {
        self.bus.write32(self.dist + GICD_CTLR, 0);
        self.dist_wait_for_rwp()?;

        let typer = self.bus.read32(self.dist + GICD_TYPER);
        let nr_irqs = ((typer & 0x1f) + 1) * 32;
        for irq in (32..nr_irqs.min(1020)).step_by(32) {
            self.bus
                .write32(self.dist + GICD_IGROUPR + (irq / 32 * 4) as PAddr, !0);
        }

        let ctlr = GicdCtlr::ARE_NS | GicdCtlr::ENABLE_G1A | GicdCtlr::ENABLE_G1;
        self.bus.write32(self.dist + GICD_CTLR, ctlr.bits());
        self.dist_wait_for_rwp()?;

        for cpu in 0..self.nr_cpus {
            self.redist_wake(cpu)?;
            self.bus.write32(self.sgi_base(cpu) + GICR_IGROUPR0, !0);
            self.redist_wait_for_rwp(cpu)?;
        }

        log::debug!("GICv3: distributor enabled, {} irqs", nr_irqs);
        Ok(())
    }

    /// Clear ProcessorSleep and wait for ChildrenAsleep to drop
    pub fn redist_wake(&self, cpu: usize) -> Result<()> {
        let waker = self.redist[cpu] + GICR_WAKER;
        let val = GicrWaker::from_bits_retain(self.bus.read32(waker));
        self.bus
            .write32(waker, val.difference(GicrWaker::PROCESSOR_SLEEP).bits());
        self.wait_clear(waker, GicrWaker::CHILDREN_ASLEEP.bits(), "GICR wake")
    }

    /// Allocate the shared LPI property table and per-CPU pending tables,
    /// then point every redistributor at them
    pub fn lpi_alloc_tables(&mut self) -> Result<()> {
        let order = order_for(bytes_to_pages(LPI_TABLE_BYTES) as u64);

        let prop = self.pages.alloc_pages(order)?;
        self.lpi_prop = Some(prop);
        let prop_val = (prop & GITS_PA_MASK) | LPI_ID_BITS;

        for cpu in 0..self.nr_cpus {
            let rd = self.redist[cpu];
            self.bus.write64(rd + GICR_PROPBASER, prop_val);

            let pend = self.pages.alloc_pages(order)?;
            self.bus.write64(rd + GICR_PENDBASER, pend & GITS_PA_MASK);
        }
        self.bus.barrier(Barrier::Write);

        log::debug!("GICv3: LPI prop table {:#x}, {} pending tables", prop, self.nr_cpus);
        Ok(())
    }

    fn prop_entry(&self, intid: u32) -> Result<PAddr> {
        let prop = self.lpi_prop.ok_or(GicError::NotPresent { what: "LPI property table" })?;
        match intid.checked_sub(GIC_LPI_BASE) {
            Some(off) if (off as usize) < LPI_TABLE_BYTES => Ok(prop + off as PAddr),
            _ => Err(GicError::InvalidArgs),
        }
    }

    /// Write the configuration byte of LPI `intid`
    ///
    /// The redistributors only see the change after an INV or INVALL.
    pub fn lpi_set_config(&self, intid: u32, prop: LpiProp) -> Result<()> {
        let entry = self.prop_entry(intid)?;
        self.bus.write8(entry, prop.bits());
        self.bus.barrier(Barrier::Write);
        Ok(())
    }

    /// Read back the configuration byte of LPI `intid`
    pub fn lpi_get_config(&self, intid: u32) -> Result<LpiProp> {
        let entry = self.prop_entry(intid)?;
        Ok(LpiProp::from_bits_retain(self.bus.read8(entry)))
    }

    /// Set or clear GICR_CTLR.EnableLPIs on `cpu`'s redistributor
    pub fn rdist_ctrl_lpi(&self, cpu: usize, enable: bool) -> Result<()> {
        let ctlr_addr = self.redist[cpu] + GICR_CTLR;
        let ctlr = GicrCtlr::from_bits_retain(self.bus.read32(ctlr_addr));
        let ctlr = if enable {
            ctlr | GicrCtlr::ENABLE_LPIS
        } else {
            ctlr.difference(GicrCtlr::ENABLE_LPIS)
        };
        self.bus.write32(ctlr_addr, ctlr.bits());
        self.redist_wait_for_rwp(cpu)
    }

    /// Enable LPI delivery on `cpu`'s redistributor
    pub fn lpi_rdist_enable(&self, cpu: usize) -> Result<()> {
        self.rdist_ctrl_lpi(cpu, true)
    }

    /// Whether `cpu`'s redistributor supports physical LPIs
    pub fn rdist_has_plpis(&self, cpu: usize) -> bool {
        self.bus.read64(self.redist[cpu] + GICR_TYPER) & GICR_TYPER_PLPIS != 0
    }
}

// ============================================================================
// Tests
// ============================================================================
