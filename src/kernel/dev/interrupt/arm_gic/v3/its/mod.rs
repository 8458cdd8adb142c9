// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! GICv3 Interrupt Translation Service
//!
//! [`ItsData`] is the driver's view of one ITS: its decoded capabilities,
//! the table descriptors, the command queue, and the devices and
//! collections created so far. Every command goes through
//! [`ItsData::send_single_command`], which waits for the ITS to consume
//! it before returning.
//!
//! # Bring-up
//!
//! ```rust,ignore
//! let mut its = ItsData::probe(&gic, &reporter, &cfg)?;
//! its.enable_defaults(&mut gic)?;
//! let dev = its.create_device(2, 8)?;
//! let col = its.create_collection(&gic, 3, 3)?;
//! its.send_mapd(&dev, true)?;
//! its.send_mapc(&col, true)?;
//! its.send_mapti(&dev, 8195, 20, &col)?;
//! ```

pub mod cmd;
pub mod queue;
pub mod tables;

use crate::bits::order_for;
use crate::err::{GicError, Result};
use crate::kernel::cmdline::HarnessConfig;
use crate::kernel::dev::interrupt::arm_gic::v3::regs::*;
use crate::kernel::dev::interrupt::arm_gic::v3::Gicv3;
use crate::kernel::pmm::{bytes_to_pages, PageAllocator};
use crate::kernel::tests::runner::Reporter;
use crate::kernel::timer::Clock;
use crate::reg::{PAddr, RegisterBus};
use cmd::{opcode_name, ItsCmdDesc};
use queue::{CmdQueue, ITS_CMD_QUEUE_BYTES};
use tables::{BaserType, DescPool, ItsBaser, ItsCollection, ItsDevice, ItsTyper};

/// Device pool capacity
pub const GITS_MAX_DEVICES: usize = 8;

/// Collection pool capacity
pub const GITS_MAX_COLLECTIONS: usize = 8;

/// Smallest EventID width an ITT is sized for
const ITT_MIN_EVENTID_BITS: u32 = 12;

/// Driver state for one ITS
pub struct ItsData<'a> {
    bus: &'a dyn RegisterBus,
    clock: &'a dyn Clock,
    pages: &'a dyn PageAllocator,
    reporter: &'a Reporter<'a>,
    base: PAddr,
    typer: ItsTyper,
    baser: [Option<ItsBaser>; GITS_BASER_NR_REGS],
    queue: Option<CmdQueue>,
    devices: DescPool<ItsDevice, GITS_MAX_DEVICES>,
    collections: DescPool<ItsCollection, GITS_MAX_COLLECTIONS>,
    cmd_timeout_us: u64,
    table_cache: Cacheability,
}

impl<'a> ItsData<'a> {
    /// Bind to the ITS of `gic` and decode GITS_TYPER
    ///
    /// Nothing is written to the ITS.
    pub fn probe(gic: &Gicv3<'a>, reporter: &'a Reporter<'a>, cfg: &HarnessConfig) -> Result<Self> {
        let base = gic.its_base().ok_or(GicError::NotPresent { what: "ITS" })?;
        let mut its = Self {
            bus: gic.bus(),
            clock: gic.clock(),
            pages: gic.pages(),
            reporter,
            base,
            typer: ItsTyper::default(),
            baser: [None; GITS_BASER_NR_REGS],
            queue: None,
            devices: DescPool::new("device"),
            collections: DescPool::new("collection"),
            cmd_timeout_us: cfg.cmd_timeout_us,
            table_cache: cfg.table_cache,
        };
        its.parse_typer();
        Ok(its)
    }

    pub fn base(&self) -> PAddr {
        self.base
    }

    pub fn typer(&self) -> &ItsTyper {
        &self.typer
    }

    /// Decode GITS_TYPER into [`ItsData::typer`]
    pub fn parse_typer(&mut self) {
        let raw = self.bus.read64(self.base + GITS_TYPER);
        self.typer = ItsTyper::parse(raw);
        log::debug!("ITS: GITS_TYPER={:#x} -> {:?}", raw, self.typer);
    }

    /// Decode GITS_BASER<`index`>
    pub fn parse_baser(&self, index: usize) -> Option<ItsBaser> {
        ItsBaser::parse(index, self.bus.read64(self.base + gits_baser(index)))
    }

    /// Decode every GITS_BASER<n>
    pub fn parse_basers(&mut self) {
        for index in 0..GITS_BASER_NR_REGS {
            self.baser[index] = self.parse_baser(index);
        }
    }

    /// First table descriptor of type `ty`
    pub fn lookup_baser(&self, ty: BaserType) -> Option<ItsBaser> {
        self.baser.iter().flatten().find(|b| b.table_type == ty).copied()
    }

    /// Back a table with memory and program its GITS_BASER<n>
    ///
    /// The descriptor keeps its page size, page count and validity; the
    /// address and memory attributes are filled in here. The stored
    /// descriptor is refreshed from a read-back of the register.
    pub fn setup_baser(&mut self, desc: &ItsBaser) -> Result<ItsBaser> {
        let order = order_for(bytes_to_pages(desc.table_bytes()) as u64);
        let table = self.pages.alloc_pages(order)?;

        let mut val = *desc;
        val.table_addr = table;
        val.indirect = false;
        val.cache = self.table_cache;
        val.shr = Shareability::for_cache(self.table_cache);

        let reg = self.base + gits_baser(desc.index);
        self.bus.write64(reg, val.encode());

        let readback = ItsBaser::parse(desc.index, self.bus.read64(reg))
            .ok_or(GicError::NotPresent { what: "GITS_BASER" })?;
        if !readback.valid {
            log::warn!("ITS: GITS_BASER{} did not latch Valid", desc.index);
        }
        log::debug!(
            "ITS: GITS_BASER{} {:?} table {:#x} ({} bytes, esz {})",
            desc.index,
            readback.table_type,
            readback.table_addr,
            readback.table_bytes(),
            readback.esz
        );

        self.baser[desc.index] = Some(readback);
        Ok(readback)
    }

    fn setup_table(&mut self, ty: BaserType, what: &'static str) -> Result<ItsBaser> {
        let mut desc = self.lookup_baser(ty).ok_or(GicError::NotPresent { what })?;
        desc.valid = true;
        self.setup_baser(&desc)
    }

    /// Allocate the command queue and point GITS_CBASER at it
    pub fn cmd_queue_init(&mut self) -> Result<()> {
        let order = order_for(bytes_to_pages(ITS_CMD_QUEUE_BYTES) as u64);
        let base = self.pages.alloc_pages(order)?;
        let mut queue = CmdQueue::new(self.base, base, ITS_CMD_QUEUE_BYTES);
        queue.init(self.bus, self.table_cache);
        log::debug!("ITS: command queue at {:#x}", base);
        self.queue = Some(queue);
        Ok(())
    }

    /// Bring the ITS and the LPI machinery up
    ///
    /// 1. Decode TYPER and every BASER
    /// 2. Set up the device and collection tables
    /// 3. Allocate and program the LPI property and pending tables
    /// 4. Initialize the command queue
    /// 5. Enable LPIs on every redistributor
    /// 6. Enable the ITS
    pub fn enable_defaults(&mut self, gic: &mut Gicv3<'a>) -> Result<()> {
        self.parse_typer();
        self.parse_basers();

        self.setup_table(BaserType::Device, "ITS device table")?;
        self.setup_table(BaserType::Collection, "ITS collection table")?;

        gic.lpi_alloc_tables()?;

        self.cmd_queue_init()?;

        for cpu in 0..gic.nr_cpus() {
            gic.lpi_rdist_enable(cpu)?;
        }

        self.bus.write32(self.base + GITS_CTLR, GitsCtlr::ENABLED.bits());
        log::info!("ITS: enabled at {:#x}", self.base);
        Ok(())
    }

    /// Register a device and allocate its ITT
    ///
    /// The ITT covers at least 2^12 events, and always `nr_ites`.
    pub fn create_device(&mut self, device_id: u32, nr_ites: u32) -> Result<ItsDevice> {
        if self.typer.deviceid_bits < 32 && device_id >> self.typer.deviceid_bits != 0 {
            log::error!(
                "ITS: device id {} does not fit in {} bits",
                device_id,
                self.typer.deviceid_bits
            );
            return Err(GicError::InvalidArgs);
        }

        let wanted = order_for(nr_ites.max(1) as u64).max(ITT_MIN_EVENTID_BITS);
        let eventid_bits = wanted.min(self.typer.eventid_bits);
        let itt_bytes = (self.typer.ite_size as usize) << eventid_bits;
        let itt = self
            .pages
            .alloc_pages(order_for(bytes_to_pages(itt_bytes) as u64))?;

        let dev = *self.devices.push(ItsDevice {
            device_id,
            nr_ites,
            eventid_bits: eventid_bits as u8,
            itt,
        })?;
        log::debug!("ITS: device {} itt {:#x} ({} bytes)", device_id, itt, itt_bytes);
        Ok(dev)
    }

    /// Register a collection targeting `cpu`
    pub fn create_collection(&mut self, gic: &Gicv3, col_id: u16, cpu: usize) -> Result<ItsCollection> {
        if cpu >= gic.nr_cpus() {
            return Err(GicError::InvalidArgs);
        }
        let target_address = if self.typer.pta {
            gic.redist_base(cpu)
        } else {
            (cpu as u64) << 16
        };
        let col = *self.collections.push(ItsCollection {
            col_id,
            target_address,
        })?;
        Ok(col)
    }

    pub fn get_device(&self, device_id: u32) -> Option<ItsDevice> {
        self.devices.find(|d| d.device_id == device_id).copied()
    }

    /// Submit one command and wait for the ITS to consume it
    ///
    /// A command that is not consumed in time is a failed assertion, not
    /// an error: the queue state is logged and the caller carries on.
    pub fn send_single_command(&mut self, desc: ItsCmdDesc) -> Result<()> {
        let bus = self.bus;
        let clock = self.clock;
        let timeout_us = self.cmd_timeout_us;
        let queue = self
            .queue
            .as_mut()
            .ok_or(GicError::NotPresent { what: "ITS command queue" })?;

        let from = queue.allocate_entry()?;
        queue.write_cmd(bus, from, &desc.build());
        log::info!("{}", desc);
        let to = queue.post(bus);

        if queue
            .wait_for_range_completion(bus, clock, from, to, timeout_us)
            .is_err()
        {
            let op = queue.read_cmd(bus, from).opcode();
            self.reporter
                .report(false, format_args!("{} timeout!", opcode_name(op)));
            self.print_cmd_state();
        }
        Ok(())
    }

    /// Report where both queue cursors are and what CREADR points at
    pub fn print_cmd_state(&self) {
        let rd = self.bus.read64(self.base + GITS_CREADR);
        let wr = self.bus.read64(self.base + GITS_CWRITER);
        self.reporter.report_info(format_args!(
            "GITS_CREADR={:#x} GITS_CWRITER={:#x}",
            rd, wr
        ));
        if let Some(queue) = &self.queue {
            let pending = queue.read_cmd(self.bus, rd & GITS_CMD_OFFSET_MASK);
            log::warn!(
                "ITS: {} at CREADR{}",
                opcode_name(pending.opcode()),
                if rd & GITS_CREADR_STALLED != 0 { " (stalled)" } else { "" }
            );
        }
    }

    pub fn send_mapd(&mut self, dev: &ItsDevice, valid: bool) -> Result<()> {
        self.send_single_command(ItsCmdDesc::Mapd {
            device_id: dev.device_id,
            eventid_bits: dev.eventid_bits,
            itt: dev.itt,
            valid,
        })
    }

    pub fn send_mapc(&mut self, col: &ItsCollection, valid: bool) -> Result<()> {
        self.send_single_command(ItsCmdDesc::Mapc {
            col_id: col.col_id,
            target: col.target_address,
            valid,
        })
    }

    pub fn send_mapti(&mut self, dev: &ItsDevice, lpi: u32, event_id: u32, col: &ItsCollection) -> Result<()> {
        self.send_single_command(ItsCmdDesc::Mapti {
            device_id: dev.device_id,
            event_id,
            phys_id: lpi,
            col_id: col.col_id,
        })
    }

    /// Map `event_id` to the LPI of the same number
    pub fn send_mapi(&mut self, dev: &ItsDevice, event_id: u32, col: &ItsCollection) -> Result<()> {
        self.send_single_command(ItsCmdDesc::Mapi {
            device_id: dev.device_id,
            event_id,
            col_id: col.col_id,
        })
    }

    pub fn send_movi(&mut self, dev: &ItsDevice, col: &ItsCollection, event_id: u32) -> Result<()> {
        self.send_single_command(ItsCmdDesc::Movi {
            device_id: dev.device_id,
            event_id,
            col_id: col.col_id,
        })
    }

    pub fn send_int(&mut self, dev: &ItsDevice, event_id: u32) -> Result<()> {
        self.send_single_command(ItsCmdDesc::Int {
            device_id: dev.device_id,
            event_id,
        })
    }

    pub fn send_inv(&mut self, dev: &ItsDevice, event_id: u32) -> Result<()> {
        self.send_single_command(ItsCmdDesc::Inv {
            device_id: dev.device_id,
            event_id,
        })
    }

    pub fn send_discard(&mut self, dev: &ItsDevice, event_id: u32) -> Result<()> {
        self.send_single_command(ItsCmdDesc::Discard {
            device_id: dev.device_id,
            event_id,
        })
    }

    pub fn send_clear(&mut self, dev: &ItsDevice, event_id: u32) -> Result<()> {
        self.send_single_command(ItsCmdDesc::Clear {
            device_id: dev.device_id,
            event_id,
        })
    }

    pub fn send_invall(&mut self, col: &ItsCollection) -> Result<()> {
        self.send_single_command(ItsCmdDesc::Invall { col_id: col.col_id })
    }

    pub fn send_sync(&mut self, col: &ItsCollection) -> Result<()> {
        self.send_single_command(ItsCmdDesc::Sync {
            target: col.target_address,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::debug::CaptureConsole;
    use crate::kernel::tests::lpi_stats::{LpiEvent, LpiStats};
    use crate::platform::sim::{SimOptions, SimPlatform};
    use crate::platform::Platform;
    use cmd::ItsCmdBlock;

    fn bring_up<'a>(
        plat: &'a SimPlatform,
        reporter: &'a Reporter<'a>,
        cfg: &HarnessConfig,
    ) -> (Gicv3<'a>, ItsData<'a>) {
        let mut gic = Gicv3::probe(plat).unwrap().unwrap();
        gic.enable_defaults().unwrap();
        let mut its = ItsData::probe(&gic, reporter, cfg).unwrap();
        its.enable_defaults(&mut gic).unwrap();
        (gic, its)
    }

    #[test]
    fn test_enable_defaults_programs_tables() {
        let plat = SimPlatform::new(SimOptions::default());
        let console = CaptureConsole::new();
        let reporter = Reporter::new(&console);
        let (_gic, its) = bring_up(&plat, &reporter, &HarnessConfig::default());

        let dev = its.lookup_baser(BaserType::Device).unwrap();
        let col = its.lookup_baser(BaserType::Collection).unwrap();
        assert!(dev.valid && col.valid);
        assert_ne!(dev.table_addr, 0);
        assert_eq!(dev.table_addr % dev.psz as u64, 0);
        assert!(its.lookup_baser(BaserType::Vcpu).is_none());

        let ctlr = plat.bus().read32(its.base() + GITS_CTLR);
        assert!(GitsCtlr::from_bits_retain(ctlr).contains(GitsCtlr::ENABLED));
        assert_eq!(plat.bus().read64(its.base() + GITS_CWRITER), 0);
    }

    #[test]
    fn test_device_itt_sizing() {
        let plat = SimPlatform::new(SimOptions::default());
        let console = CaptureConsole::new();
        let reporter = Reporter::new(&console);
        let (_gic, mut its) = bring_up(&plat, &reporter, &HarnessConfig::default());

        let dev = its.create_device(7, 8).unwrap();
        assert_eq!(dev.eventid_bits, 12);
        assert_eq!(dev.itt % cmd::ITS_ITT_ALIGN, 0);
        assert_eq!(its.get_device(7), Some(dev));
        assert!(its.get_device(3).is_none());

        let big = its.create_device(1, 5000).unwrap();
        assert_eq!(big.eventid_bits, 13);

        assert_eq!(its.create_device(1 << 20, 8), Err(GicError::InvalidArgs));
    }

    #[test]
    fn test_collection_target_forms() {
        let console = CaptureConsole::new();
        let reporter = Reporter::new(&console);

        let plat = SimPlatform::new(SimOptions::default());
        let (gic, mut its) = bring_up(&plat, &reporter, &HarnessConfig::default());
        let col = its.create_collection(&gic, 3, 3).unwrap();
        assert_eq!(col.target_address, 3 << 16);
        assert_eq!(its.create_collection(&gic, 4, 9), Err(GicError::InvalidArgs));

        let plat = SimPlatform::new(SimOptions {
            pta: true,
            ..SimOptions::default()
        });
        let (gic, mut its) = bring_up(&plat, &reporter, &HarnessConfig::default());
        let col = its.create_collection(&gic, 2, 2).unwrap();
        assert_eq!(col.target_address, gic.redist_base(2));
    }

    #[test]
    fn test_pools_are_bounded() {
        let plat = SimPlatform::new(SimOptions::default());
        let console = CaptureConsole::new();
        let reporter = Reporter::new(&console);
        let (gic, mut its) = bring_up(&plat, &reporter, &HarnessConfig::default());

        for id in 0..GITS_MAX_COLLECTIONS as u16 {
            its.create_collection(&gic, id, 0).unwrap();
        }
        assert_eq!(
            its.create_collection(&gic, 99, 0),
            Err(GicError::PoolExhausted {
                pool: "collection",
                capacity: GITS_MAX_COLLECTIONS
            })
        );
    }

    #[test]
    fn test_stalled_command_reports_timeout() {
        let plat = SimPlatform::new(SimOptions::default());
        let console = CaptureConsole::new();
        let reporter = Reporter::new(&console);
        let cfg = HarnessConfig {
            cmd_timeout_us: 2000,
            ..HarnessConfig::default()
        };
        let (gic, mut its) = bring_up(&plat, &reporter, &cfg);
        let col = its.create_collection(&gic, 2, 2).unwrap();

        plat.set_stalled(true);
        assert!(its.send_invall(&col).is_ok());
        assert_eq!(console.lines_with("FAIL:"), vec!["FAIL: INVALL timeout!"]);
        assert_eq!(console.lines_with("INFO: GITS_CREADR=").len(), 1);
        assert_eq!(reporter.failures(), 1);

        // The ITS catches up once released
        plat.set_stalled(false);
        assert!(its.send_sync(&col).is_ok());
        assert_eq!(reporter.failures(), 1);
    }

    #[test]
    fn test_send_without_queue() {
        let plat = SimPlatform::new(SimOptions::default());
        let console = CaptureConsole::new();
        let reporter = Reporter::new(&console);
        let gic = Gicv3::probe(&plat).unwrap().unwrap();
        let mut its = ItsData::probe(&gic, &reporter, &HarnessConfig::default()).unwrap();
        assert_eq!(
            its.send_single_command(ItsCmdDesc::Invall { col_id: 0 }),
            Err(GicError::NotPresent { what: "ITS command queue" })
        );
    }

    #[test]
    fn test_queue_wraps_around() {
        let plat = SimPlatform::new(SimOptions::default());
        let console = CaptureConsole::new();
        let reporter = Reporter::new(&console);
        let (gic, mut its) = bring_up(&plat, &reporter, &HarnessConfig::default());
        let col = its.create_collection(&gic, 0, 0).unwrap();

        let slots = ITS_CMD_QUEUE_BYTES / ItsCmdBlock::SIZE;
        for _ in 0..slots + 5 {
            its.send_sync(&col).unwrap();
        }
        assert_eq!(reporter.failures(), 0);
        assert_eq!(
            plat.bus().read64(its.base() + GITS_CREADR),
            (5 * ItsCmdBlock::SIZE) as u64
        );
    }

    #[test]
    fn test_remapping_is_idempotent() {
        static STATS: LpiStats = LpiStats::new();
        let plat = SimPlatform::new(SimOptions::default());
        let console = CaptureConsole::new();
        let reporter = Reporter::new(&console);
        let (gic, mut its) = bring_up(&plat, &reporter, &HarnessConfig::default());
        plat.set_irq_sink(&STATS);

        let dev = its.create_device(2, 8).unwrap();
        let col = its.create_collection(&gic, 0, 0).unwrap();
        for _ in 0..2 {
            its.send_mapd(&dev, true).unwrap();
            its.send_mapc(&col, true).unwrap();
            its.send_mapti(&dev, 8195, 20, &col).unwrap();
        }
        gic.lpi_set_config(8195, LPI_PROP_DEFAULT).unwrap();
        its.send_invall(&col).unwrap();

        STATS.expect(0, 8195);
        its.send_int(&dev, 20).unwrap();
        assert_eq!(STATS.observed(), LpiEvent::new(0, 8195));
        assert_eq!(reporter.failures(), 0);
    }

    #[test]
    fn test_config_change_needs_invalidation() {
        static STATS: LpiStats = LpiStats::new();
        let plat = SimPlatform::new(SimOptions::default());
        let console = CaptureConsole::new();
        let reporter = Reporter::new(&console);
        let (gic, mut its) = bring_up(&plat, &reporter, &HarnessConfig::default());
        plat.set_irq_sink(&STATS);

        let dev = its.create_device(2, 8).unwrap();
        let col = its.create_collection(&gic, 0, 0).unwrap();
        its.send_mapd(&dev, true).unwrap();
        its.send_mapc(&col, true).unwrap();
        its.send_mapti(&dev, 8195, 20, &col).unwrap();
        gic.lpi_set_config(8195, LPI_PROP_DEFAULT).unwrap();
        its.send_invall(&col).unwrap();

        STATS.expect(0, 8195);
        its.send_int(&dev, 20).unwrap();
        assert_eq!(STATS.observed(), LpiEvent::new(0, 8195));

        // Disabled in memory only: the redistributor still uses its copy
        let disabled = LPI_PROP_DEFAULT.difference(LpiProp::ENABLED);
        gic.lpi_set_config(8195, disabled).unwrap();
        STATS.expect_none();
        its.send_int(&dev, 20).unwrap();
        assert_eq!(STATS.observed(), LpiEvent::new(0, 8195));

        its.send_inv(&dev, 20).unwrap();
        STATS.expect_none();
        its.send_int(&dev, 20).unwrap();
        assert!(STATS.observed().is_none());
        assert_eq!(plat.pending_lpis(0), vec![8195]);

        // Re-enabling takes effect on the next INV and delivers the pending LPI
        gic.lpi_set_config(8195, LPI_PROP_DEFAULT).unwrap();
        STATS.expect(0, 8195);
        its.send_inv(&dev, 20).unwrap();
        assert_eq!(STATS.observed(), LpiEvent::new(0, 8195));
        assert!(plat.pending_lpis(0).is_empty());
        assert_eq!(reporter.failures(), 0);
    }

    #[test]
    fn test_unmapped_events_are_dropped() {
        let plat = SimPlatform::new(SimOptions::default());
        let console = CaptureConsole::new();
        let reporter = Reporter::new(&console);
        let (gic, mut its) = bring_up(&plat, &reporter, &HarnessConfig::default());

        // No IRQ sink: a translated INT stays pending on the redistributor
        let dev = its.create_device(2, 8).unwrap();
        let col = its.create_collection(&gic, 1, 0).unwrap();
        its.send_mapd(&dev, true).unwrap();
        its.send_mapc(&col, true).unwrap();
        its.send_mapti(&dev, 8195, 20, &col).unwrap();

        its.send_int(&dev, 20).unwrap();
        assert_eq!(plat.pending_lpis(0), vec![8195]);
        its.send_clear(&dev, 20).unwrap();
        assert!(plat.pending_lpis(0).is_empty());

        its.send_mapd(&dev, false).unwrap();
        its.send_int(&dev, 20).unwrap();
        assert!(plat.pending_lpis(0).is_empty());

        its.send_mapd(&dev, true).unwrap();
        its.send_mapc(&col, false).unwrap();
        its.send_int(&dev, 20).unwrap();
        assert!(plat.pending_lpis(0).is_empty());

        // Mapping the collection again restores translation
        its.send_mapc(&col, true).unwrap();
        its.send_int(&dev, 20).unwrap();
        assert_eq!(plat.pending_lpis(0), vec![8195]);
        assert_eq!(reporter.failures(), 0);
    }
}
