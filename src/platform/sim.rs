// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Software GICv3 + ITS
//!
//! A register-level model of the parts of a GICv3 the harness touches,
//! laid out at the QEMU `virt` addresses, plus RAM for the tables and
//! the command queue. It lets every subtest run on the host.
//!
//! # Model
//!
//! - Commands are executed synchronously when GITS_CWRITER is written,
//!   unless the ITS is disabled or the model is stalled
//! - Device, collection and ITT state live in the model, not in RAM
//! - Each redistributor caches LPI configuration bytes. A cache entry is
//!   filled on first use and dropped by INV (one LPI) or INVALL (all of
//!   them), so a property table change is not seen until invalidated
//! - Pending LPIs are delivered to the installed [`IrqSink`] on the
//!   calling thread, as if taken by the target CPU
//! - Secondary CPUs are host threads; a CPU takes no LPI until it has
//!   been booted
//!
//! Redistributor frames are laid out in reverse CPU order so discovery
//! has to go by affinity.

use crate::bits::genmask;
use crate::err::{GicError, Result};
use crate::kernel::dev::interrupt::arm_gic::v3::its::cmd::{ItsCmdBlock, ItsOpcode};
use crate::kernel::dev::interrupt::arm_gic::v3::regs::*;
use crate::kernel::dev::interrupt::arm_gic::{GicBases, GicVersion};
use crate::kernel::dev::interrupt::{CpuInterface, IrqSink, GIC_LPI_BASE, GIC_SPURIOUS_IRQ};
use crate::kernel::mp::{SecondaryEntry, Smp};
use crate::kernel::pmm::{PageAllocator, PageArena, PAGE_SIZE};
use crate::kernel::timer::{Clock, VirtualClock};
use crate::platform::Platform;
use crate::reg::{Barrier, PAddr, RegisterBus};
use std::collections::{BTreeSet, HashMap};

pub const SIM_GICD_BASE: PAddr = 0x0800_0000;
pub const SIM_ITS_BASE: PAddr = 0x0808_0000;
pub const SIM_GICR_BASE: PAddr = 0x080A_0000;
pub const SIM_RAM_BASE: PAddr = 0x4000_0000;
pub const SIM_RAM_BYTES: usize = 8 * 1024 * 1024;

/// Most CPUs the model can have
pub const SIM_MAX_CPUS: usize = 8;

const GICD_FRAME_BYTES: PAddr = 0x1_0000;
const GITS_FRAME_BYTES: PAddr = 0x2_0000;

const SIM_GICD_IIDR: u32 = 0x0000_043b;
const SIM_GITS_IIDR: u32 = 0x0100_043b;
const SIM_GICR_IIDR: u32 = 0x0000_043b;

/// 288 interrupt lines, LPIs, 16 INTID bits
const SIM_GICD_TYPER: u32 = 8 | GICD_TYPER_LPIS | (15 << 19);

/// GICD_PIDR2.ArchRev = 3
const SIM_GICD_PIDR2: u32 = 0x3b;

/// Read-only fields of GITS_BASER<n>: Type and Entry_Size
const BASER_RO_MASK: u64 = (0x7 << 56) | (0x1f << 48);

/// Knobs for the model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimOptions {
    /// Whether a GICv3 is present at all
    pub gic: bool,
    /// Whether the GIC has an ITS
    pub its: bool,
    pub cpus: usize,
    /// GITS_TYPER.PTA
    pub pta: bool,
    /// Let writes to GITS_TYPER stick (a broken implementation)
    pub writable_typer: bool,
    /// Cache LPI configuration in the redistributors
    pub lpi_cache: bool,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            gic: true,
            its: true,
            cpus: 4,
            pta: false,
            writable_typer: false,
            lpi_cache: true,
        }
    }
}

/// Interrupt acknowledge on a simulated CPU
///
/// Carries the one interrupt being delivered.
pub struct SimCpuInterface {
    pub cpu: usize,
    pub intid: u32,
}

impl CpuInterface for SimCpuInterface {
    fn cpu_id(&self) -> usize {
        self.cpu
    }

    fn ack(&self) -> u32 {
        self.intid
    }

    fn eoi(&self, iar: u32) {
        if iar != GIC_SPURIOUS_IRQ {
            log::trace!("sim: cpu {} EOI {}", self.cpu, iar);
        }
    }
}

/// Clock that yields to other host threads while time passes
pub struct SimClock {
    inner: VirtualClock,
}

impl SimClock {
    pub const fn new() -> Self {
        Self {
            inner: VirtualClock::new(),
        }
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SimClock {
    fn now_us(&self) -> u64 {
        self.inner.now_us()
    }

    fn udelay(&self, us: u64) {
        self.inner.udelay(us);
        std::thread::yield_now();
    }
}

// ============================================================================
// Model State
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct DevEntry {
    itt: PAddr,
    eventid_bits: u32,
}

#[derive(Debug, Clone, Copy)]
struct Ite {
    lpi: u32,
    col: u16,
}

struct Redist {
    enable_lpis: bool,
    sleep: bool,
    propbaser: u64,
    pendbaser: u64,
    pending: BTreeSet<u32>,
    cache: HashMap<u32, LpiProp>,
}

impl Redist {
    fn new() -> Self {
        Self {
            enable_lpis: false,
            sleep: true,
            propbaser: 0,
            pendbaser: 0,
            pending: BTreeSet::new(),
            cache: HashMap::new(),
        }
    }
}

struct SimState {
    ram: Vec<u8>,
    /// Plain registers with no side effects, one entry per 32-bit word
    regs: HashMap<PAddr, u32>,
    gicd_ctlr: u32,

    its_enabled: bool,
    typer: u64,
    basers: [u64; GITS_BASER_NR_REGS],
    cbaser: u64,
    cwriter: u64,
    creadr: u64,
    stalled: bool,

    devices: HashMap<u32, DevEntry>,
    itts: HashMap<PAddr, HashMap<u32, Ite>>,
    collections: HashMap<u16, usize>,

    redists: Vec<Redist>,
    online: Vec<bool>,
    sink_installed: bool,
}

/// Register frame an address falls in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    Dist(PAddr),
    Its(PAddr),
    Redist(usize, PAddr),
    Ram(usize),
    Unmapped,
}

type Deliveries = Vec<(usize, u32)>;

#[inline]
fn lo(v: u64) -> u32 {
    v as u32
}

#[inline]
fn hi(v: u64) -> u32 {
    (v >> 32) as u32
}

#[inline]
fn set_lo(v: u64, w: u32) -> u64 {
    (v & !0xffff_ffff) | w as u64
}

#[inline]
fn set_hi(v: u64, w: u32) -> u64 {
    (v & 0xffff_ffff) | ((w as u64) << 32)
}

fn ram_read8(ram: &[u8], addr: PAddr) -> u8 {
    addr.checked_sub(SIM_RAM_BASE)
        .and_then(|off| ram.get(off as usize).copied())
        .unwrap_or(0)
}

fn ram_read64(ram: &[u8], addr: PAddr) -> u64 {
    let mut bytes = [0u8; 8];
    for (i, b) in bytes.iter_mut().enumerate() {
        *b = ram_read8(ram, addr + i as PAddr);
    }
    u64::from_le_bytes(bytes)
}

/// The register and memory side of the model
pub struct SimGic {
    opts: SimOptions,
    state: spin::Mutex<SimState>,
    sink: spin::Mutex<Option<&'static dyn IrqSink>>,
}

impl SimGic {
    fn new(opts: SimOptions) -> Self {
        let typer = (7 << 4)            // 8-byte ITEs
            | (15 << 8)                 // 16 EventID bits
            | (15 << 13)                // 16 DeviceID bits
            | ((opts.pta as u64) << 19)
            | 1; // physical LPIs

        let mut basers = [0u64; GITS_BASER_NR_REGS];
        // Device and collection tables: 8-byte entries, 64K pages
        basers[0] = (1 << 56) | (7 << 48) | (2 << 8);
        basers[1] = (4 << 56) | (7 << 48) | (2 << 8);

        let mut online = vec![false; opts.cpus];
        if let Some(boot) = online.first_mut() {
            *boot = true;
        }

        Self {
            opts,
            state: spin::Mutex::new(SimState {
                ram: vec![0; SIM_RAM_BYTES],
                regs: HashMap::new(),
                gicd_ctlr: 0,
                its_enabled: false,
                typer,
                basers,
                cbaser: 0,
                cwriter: 0,
                creadr: 0,
                stalled: false,
                devices: HashMap::new(),
                itts: HashMap::new(),
                collections: HashMap::new(),
                redists: (0..opts.cpus).map(|_| Redist::new()).collect(),
                online,
                sink_installed: false,
            }),
            sink: spin::Mutex::new(None),
        }
    }

    /// RD_base of `cpu`'s redistributor
    pub fn redist_frame(&self, cpu: usize) -> PAddr {
        SIM_GICR_BASE + (self.opts.cpus - 1 - cpu) as PAddr * GICR_FRAME_STRIDE
    }

    fn decode(&self, addr: PAddr) -> Frame {
        let ram_end = SIM_RAM_BASE + SIM_RAM_BYTES as PAddr;
        let gicr_end = SIM_GICR_BASE + self.opts.cpus as PAddr * GICR_FRAME_STRIDE;

        if (SIM_RAM_BASE..ram_end).contains(&addr) {
            Frame::Ram((addr - SIM_RAM_BASE) as usize)
        } else if !self.opts.gic {
            Frame::Unmapped
        } else if (SIM_GICD_BASE..SIM_GICD_BASE + GICD_FRAME_BYTES).contains(&addr) {
            Frame::Dist(addr - SIM_GICD_BASE)
        } else if self.opts.its && (SIM_ITS_BASE..SIM_ITS_BASE + GITS_FRAME_BYTES).contains(&addr) {
            Frame::Its(addr - SIM_ITS_BASE)
        } else if (SIM_GICR_BASE..gicr_end).contains(&addr) {
            let index = ((addr - SIM_GICR_BASE) / GICR_FRAME_STRIDE) as usize;
            let off = (addr - SIM_GICR_BASE) % GICR_FRAME_STRIDE;
            Frame::Redist(self.opts.cpus - 1 - index, off)
        } else {
            Frame::Unmapped
        }
    }

    fn reg_read32(&self, st: &SimState, addr: PAddr) -> u32 {
        let plain = || st.regs.get(&addr).copied().unwrap_or(0);
        match self.decode(addr) {
            Frame::Dist(off) => match off {
                GICD_CTLR => st.gicd_ctlr,
                GICD_TYPER => SIM_GICD_TYPER,
                GICD_IIDR => SIM_GICD_IIDR,
                GICD_PIDR2 => SIM_GICD_PIDR2,
                _ => plain(),
            },
            Frame::Its(off) => match off {
                GITS_CTLR => {
                    if st.its_enabled {
                        GitsCtlr::ENABLED.bits()
                    } else {
                        GitsCtlr::QUIESCENT.bits()
                    }
                }
                GITS_IIDR => SIM_GITS_IIDR,
                GITS_TYPER => lo(st.typer),
                o if o == GITS_TYPER + 4 => hi(st.typer),
                GITS_CBASER => lo(st.cbaser),
                o if o == GITS_CBASER + 4 => hi(st.cbaser),
                GITS_CWRITER => lo(st.cwriter),
                o if o == GITS_CWRITER + 4 => hi(st.cwriter),
                GITS_CREADR => {
                    let stalled = st.stalled && st.creadr != st.cwriter & GITS_CMD_OFFSET_MASK;
                    lo(st.creadr | if stalled { GITS_CREADR_STALLED } else { 0 })
                }
                o if (GITS_BASER..gits_baser(GITS_BASER_NR_REGS)).contains(&o) => {
                    let n = ((o - GITS_BASER) / 8) as usize;
                    if o % 8 == 0 {
                        lo(st.basers[n])
                    } else {
                        hi(st.basers[n])
                    }
                }
                _ => plain(),
            },
            Frame::Redist(cpu, off) => {
                let rd = &st.redists[cpu];
                match off {
                    GICR_CTLR => {
                        if rd.enable_lpis {
                            GicrCtlr::ENABLE_LPIS.bits()
                        } else {
                            0
                        }
                    }
                    GICR_IIDR => SIM_GICR_IIDR,
                    GICR_TYPER => {
                        let last = if self.redist_frame(cpu) == SIM_GICR_BASE
                            + (self.opts.cpus as PAddr - 1) * GICR_FRAME_STRIDE
                        {
                            GICR_TYPER_LAST
                        } else {
                            0
                        };
                        lo(((cpu as u64) << 8) | GICR_TYPER_PLPIS | last)
                    }
                    o if o == GICR_TYPER + 4 => cpu as u32,
                    GICR_WAKER => {
                        if rd.sleep {
                            (GicrWaker::PROCESSOR_SLEEP | GicrWaker::CHILDREN_ASLEEP).bits()
                        } else {
                            0
                        }
                    }
                    GICR_PROPBASER => lo(rd.propbaser),
                    o if o == GICR_PROPBASER + 4 => hi(rd.propbaser),
                    GICR_PENDBASER => lo(rd.pendbaser),
                    o if o == GICR_PENDBASER + 4 => hi(rd.pendbaser),
                    _ => plain(),
                }
            }
            Frame::Ram(_) | Frame::Unmapped => 0,
        }
    }

    fn reg_write32(&self, st: &mut SimState, addr: PAddr, val: u32) {
        match self.decode(addr) {
            Frame::Dist(off) => match off {
                GICD_CTLR => st.gicd_ctlr = val & !GicdCtlr::RWP.bits(),
                GICD_TYPER | GICD_IIDR | GICD_PIDR2 => {}
                _ => {
                    st.regs.insert(addr, val);
                }
            },
            Frame::Its(off) => match off {
                GITS_CTLR => st.its_enabled = val & GitsCtlr::ENABLED.bits() != 0,
                GITS_IIDR => {}
                GITS_TYPER if self.opts.writable_typer => st.typer = set_lo(st.typer, val),
                o if o == GITS_TYPER + 4 && self.opts.writable_typer => {
                    st.typer = set_hi(st.typer, val)
                }
                GITS_TYPER => {}
                o if o == GITS_TYPER + 4 => {}
                GITS_CBASER => st.cbaser = set_lo(st.cbaser, val),
                o if o == GITS_CBASER + 4 => st.cbaser = set_hi(st.cbaser, val),
                GITS_CWRITER => st.cwriter = set_lo(st.cwriter, val),
                o if o == GITS_CWRITER + 4 => st.cwriter = set_hi(st.cwriter, val),
                GITS_CREADR => {}
                o if o == GITS_CREADR + 4 => {}
                o if (GITS_BASER..gits_baser(GITS_BASER_NR_REGS)).contains(&o) => {
                    let n = ((o - GITS_BASER) / 8) as usize;
                    let old = st.basers[n];
                    if old != 0 {
                        let new = if o % 8 == 0 { set_lo(old, val) } else { set_hi(old, val) };
                        st.basers[n] = (new & !BASER_RO_MASK) | (old & BASER_RO_MASK);
                    }
                }
                _ => {
                    st.regs.insert(addr, val);
                }
            },
            Frame::Redist(cpu, off) => {
                let rd = &mut st.redists[cpu];
                match off {
                    GICR_CTLR => rd.enable_lpis = val & GicrCtlr::ENABLE_LPIS.bits() != 0,
                    GICR_WAKER => rd.sleep = val & GicrWaker::PROCESSOR_SLEEP.bits() != 0,
                    GICR_IIDR => {}
                    GICR_TYPER => {}
                    o if o == GICR_TYPER + 4 => {}
                    GICR_PROPBASER => rd.propbaser = set_lo(rd.propbaser, val),
                    o if o == GICR_PROPBASER + 4 => rd.propbaser = set_hi(rd.propbaser, val),
                    GICR_PENDBASER => rd.pendbaser = set_lo(rd.pendbaser, val),
                    o if o == GICR_PENDBASER + 4 => rd.pendbaser = set_hi(rd.pendbaser, val),
                    _ => {
                        st.regs.insert(addr, val);
                    }
                }
            }
            Frame::Ram(_) => {}
            Frame::Unmapped => log::trace!("sim: write to unmapped {:#x}", addr),
        }
    }

    /// Side effects of a completed register write
    fn after_write(&self, st: &mut SimState, addr: PAddr, out: &mut Deliveries) {
        match self.decode(addr) {
            Frame::Its(GITS_CWRITER) | Frame::Its(GITS_CTLR) => self.process_queue(st, out),
            Frame::Redist(cpu, GICR_CTLR) => self.try_deliver(st, cpu, out),
            _ => {}
        }
    }

    fn read(&self, addr: PAddr, bytes: usize) -> u64 {
        let st = self.state.lock();
        if let Frame::Ram(off) = self.decode(addr) {
            let mut v = [0u8; 8];
            for (i, b) in v.iter_mut().take(bytes).enumerate() {
                *b = st.ram.get(off + i).copied().unwrap_or(0);
            }
            return u64::from_le_bytes(v);
        }

        let word = addr & !3;
        match bytes {
            8 => self.reg_read32(&st, word) as u64 | ((self.reg_read32(&st, word + 4) as u64) << 32),
            4 => self.reg_read32(&st, word) as u64,
            _ => {
                let shift = (addr & 3) * 8;
                (self.reg_read32(&st, word) as u64 >> shift) & genmask(bytes as u32 * 8 - 1, 0)
            }
        }
    }

    fn write(&self, addr: PAddr, bytes: usize, val: u64) {
        let mut out = Deliveries::new();
        {
            let mut st = self.state.lock();
            if let Frame::Ram(off) = self.decode(addr) {
                for (i, b) in val.to_le_bytes().iter().take(bytes).enumerate() {
                    if let Some(slot) = st.ram.get_mut(off + i) {
                        *slot = *b;
                    }
                }
                return;
            }

            let word = addr & !3;
            match bytes {
                8 => {
                    self.reg_write32(&mut st, word, lo(val));
                    self.reg_write32(&mut st, word + 4, hi(val));
                }
                4 => self.reg_write32(&mut st, word, val as u32),
                _ => {
                    let shift = (addr & 3) * 8;
                    let mask = genmask(bytes as u32 * 8 - 1, 0) << shift;
                    let old = self.reg_read32(&st, word) as u64;
                    let new = (old & !mask) | ((val << shift) & mask);
                    self.reg_write32(&mut st, word, new as u32);
                }
            }
            self.after_write(&mut st, word, &mut out);
        }
        self.deliver(out);
    }

    // ========================================================================
    // ITS
    // ========================================================================

    fn process_queue(&self, st: &mut SimState, out: &mut Deliveries) {
        if !st.its_enabled || st.stalled || st.cbaser & GITS_CBASER_VALID == 0 {
            return;
        }

        let base = st.cbaser & GITS_PA_MASK;
        let size = ((st.cbaser & GITS_CBASER_SIZE_MASK) + 1) * PAGE_SIZE as u64;
        let target = (st.cwriter & GITS_CMD_OFFSET_MASK) % size;

        while st.creadr != target {
            let slot = base + st.creadr;
            let mut raw = [0u64; 4];
            for (i, w) in raw.iter_mut().enumerate() {
                *w = ram_read64(&st.ram, slot + 8 * i as PAddr);
            }
            self.execute(st, &ItsCmdBlock::from_raw(raw), out);
            st.creadr = (st.creadr + ItsCmdBlock::SIZE as u64) % size;
        }
    }

    /// Translate a target address to a CPU index
    fn target_cpu(&self, target: u64) -> Option<usize> {
        if self.opts.pta {
            (0..self.opts.cpus).find(|&cpu| self.redist_frame(cpu) == target)
        } else {
            let cpu = (target >> 16) as usize;
            (cpu < self.opts.cpus).then_some(cpu)
        }
    }

    fn lookup_ite(st: &SimState, device_id: u32, event_id: u32) -> Option<Ite> {
        let dev = st.devices.get(&device_id)?;
        st.itts.get(&dev.itt)?.get(&event_id).copied()
    }

    /// Resolve a device/event pair to an LPI and the CPU it targets
    fn resolve(st: &SimState, device_id: u32, event_id: u32) -> Option<(u32, usize)> {
        let ite = Self::lookup_ite(st, device_id, event_id)?;
        let cpu = st.collections.get(&ite.col)?;
        Some((ite.lpi, *cpu))
    }

    fn map_event(&self, st: &mut SimState, device_id: u32, event_id: u32, lpi: u32, col: u16) {
        let Some(dev) = st.devices.get(&device_id).copied() else {
            log::debug!("sim: MAPTI to unmapped device {}", device_id);
            return;
        };
        if dev.eventid_bits < 32 && event_id >> dev.eventid_bits != 0 {
            log::debug!("sim: event {} out of range for device {}", event_id, device_id);
            return;
        }
        if lpi < GIC_LPI_BASE {
            log::debug!("sim: {} is not an LPI", lpi);
            return;
        }
        st.itts.entry(dev.itt).or_default().insert(event_id, Ite { lpi, col });
    }

    fn execute(&self, st: &mut SimState, cmd: &ItsCmdBlock, out: &mut Deliveries) {
        let (dev, ev) = (cmd.device_id(), cmd.event_id());

        match ItsOpcode::from_u8(cmd.opcode()) {
            Some(ItsOpcode::Mapd) => {
                if cmd.valid() {
                    st.devices.insert(
                        dev,
                        DevEntry {
                            itt: cmd.itt(),
                            eventid_bits: cmd.size() as u32 + 1,
                        },
                    );
                } else {
                    st.devices.remove(&dev);
                }
            }
            Some(ItsOpcode::Mapc) => {
                let col = cmd.collection();
                if !cmd.valid() {
                    st.collections.remove(&col);
                } else if let Some(cpu) = self.target_cpu(cmd.target()) {
                    st.collections.insert(col, cpu);
                } else {
                    log::debug!("sim: MAPC {} to bad target {:#x}", col, cmd.target());
                }
            }
            Some(ItsOpcode::Mapti) => self.map_event(st, dev, ev, cmd.phys_id(), cmd.collection()),
            Some(ItsOpcode::Mapi) => self.map_event(st, dev, ev, ev, cmd.collection()),
            Some(ItsOpcode::Movi) => {
                let new_col = cmd.collection();
                let (Some((lpi, old_cpu)), Some(&new_cpu)) =
                    (Self::resolve(st, dev, ev), st.collections.get(&new_col))
                else {
                    log::debug!("sim: MOVI dev {} event {} dropped", dev, ev);
                    return;
                };
                if st.redists[old_cpu].pending.remove(&lpi) {
                    st.redists[new_cpu].pending.insert(lpi);
                }
                if let Some(itt) = st.devices.get(&dev).map(|d| d.itt) {
                    if let Some(ite) = st.itts.get_mut(&itt).and_then(|t| t.get_mut(&ev)) {
                        ite.col = new_col;
                    }
                }
                self.try_deliver(st, new_cpu, out);
            }
            Some(ItsOpcode::Int) => match Self::resolve(st, dev, ev) {
                Some((lpi, cpu)) => {
                    st.redists[cpu].pending.insert(lpi);
                    self.try_deliver(st, cpu, out);
                }
                None => log::debug!("sim: INT dev {} event {} dropped", dev, ev),
            },
            Some(ItsOpcode::Inv) => {
                if let Some((lpi, cpu)) = Self::resolve(st, dev, ev) {
                    st.redists[cpu].cache.remove(&lpi);
                    self.try_deliver(st, cpu, out);
                }
            }
            Some(ItsOpcode::Invall) => {
                if let Some(&cpu) = st.collections.get(&cmd.collection()) {
                    st.redists[cpu].cache.clear();
                    self.try_deliver(st, cpu, out);
                }
            }
            Some(ItsOpcode::Discard) => {
                if let Some((lpi, cpu)) = Self::resolve(st, dev, ev) {
                    st.redists[cpu].pending.remove(&lpi);
                }
                if let Some(itt) = st.devices.get(&dev).map(|d| d.itt) {
                    if let Some(table) = st.itts.get_mut(&itt) {
                        table.remove(&ev);
                    }
                }
            }
            Some(ItsOpcode::Clear) => {
                if let Some((lpi, cpu)) = Self::resolve(st, dev, ev) {
                    st.redists[cpu].pending.remove(&lpi);
                }
            }
            Some(ItsOpcode::Sync) => {}
            Some(op) => log::warn!("sim: {} not modelled", op.name()),
            None => log::warn!("sim: bad ITS opcode {:#x}", cmd.opcode()),
        }
    }

    // ========================================================================
    // LPI delivery
    // ========================================================================

    /// Move every deliverable pending LPI of `cpu` to `out`
    fn try_deliver(&self, st: &mut SimState, cpu: usize, out: &mut Deliveries) {
        if !st.sink_installed || !st.online[cpu] {
            return;
        }
        let lpi_cache = self.opts.lpi_cache;
        let SimState { ram, redists, .. } = st;
        let ram: &[u8] = ram;
        let rd = &mut redists[cpu];
        if !rd.enable_lpis {
            return;
        }

        let prop = rd.propbaser & GITS_PA_MASK;
        let id_bits = (rd.propbaser & GICR_PROPBASER_IDBITS_MASK) as u32 + 1;
        let pending: Vec<u32> = rd.pending.iter().copied().collect();

        for lpi in pending {
            if id_bits < 32 && lpi >> id_bits != 0 {
                continue;
            }
            let read = || LpiProp::from_bits_retain(ram_read8(ram, prop + (lpi - GIC_LPI_BASE) as PAddr));
            let config = if lpi_cache {
                *rd.cache.entry(lpi).or_insert_with(read)
            } else {
                read()
            };
            if config.contains(LpiProp::ENABLED) {
                rd.pending.remove(&lpi);
                out.push((cpu, lpi));
            }
        }
    }

    fn deliver(&self, out: Deliveries) {
        if out.is_empty() {
            return;
        }
        let Some(sink) = *self.sink.lock() else {
            return;
        };
        for (cpu, intid) in out {
            log::trace!("sim: LPI {} -> cpu {}", intid, cpu);
            sink.handle_irq(&SimCpuInterface { cpu, intid });
        }
    }

    fn set_sink(&self, sink: &'static dyn IrqSink) {
        *self.sink.lock() = Some(sink);
        let mut out = Deliveries::new();
        {
            let mut st = self.state.lock();
            st.sink_installed = true;
            for cpu in 0..self.opts.cpus {
                self.try_deliver(&mut st, cpu, &mut out);
            }
        }
        self.deliver(out);
    }

    fn set_online(&self, cpu: usize) {
        let mut out = Deliveries::new();
        {
            let mut st = self.state.lock();
            st.online[cpu] = true;
            self.try_deliver(&mut st, cpu, &mut out);
        }
        self.deliver(out);
    }

    fn set_stalled(&self, stalled: bool) {
        let mut out = Deliveries::new();
        {
            let mut st = self.state.lock();
            st.stalled = stalled;
            self.process_queue(&mut st, &mut out);
        }
        self.deliver(out);
    }
}

impl RegisterBus for SimGic {
    fn read8(&self, addr: PAddr) -> u8 {
        self.read(addr, 1) as u8
    }

    fn read16(&self, addr: PAddr) -> u16 {
        self.read(addr, 2) as u16
    }

    fn read32(&self, addr: PAddr) -> u32 {
        self.read(addr, 4) as u32
    }

    fn read64(&self, addr: PAddr) -> u64 {
        self.read(addr, 8)
    }

    fn write8(&self, addr: PAddr, val: u8) {
        self.write(addr, 1, val as u64)
    }

    fn write16(&self, addr: PAddr, val: u16) {
        self.write(addr, 2, val as u64)
    }

    fn write32(&self, addr: PAddr, val: u32) {
        self.write(addr, 4, val as u64)
    }

    fn write64(&self, addr: PAddr, val: u64) {
        self.write(addr, 8, val)
    }

    fn barrier(&self, _kind: Barrier) {
        core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);
    }
}

// ============================================================================
// Platform
// ============================================================================

/// Host platform backed by [`SimGic`]
pub struct SimPlatform {
    gic: SimGic,
    clock: SimClock,
    arena: PageArena,
}

impl SimPlatform {
    pub fn new(mut opts: SimOptions) -> Self {
        opts.cpus = opts.cpus.clamp(1, SIM_MAX_CPUS);
        Self {
            gic: SimGic::new(opts),
            clock: SimClock::new(),
            arena: PageArena::new(SIM_RAM_BASE, SIM_RAM_BYTES / PAGE_SIZE),
        }
    }

    pub fn options(&self) -> SimOptions {
        self.gic.opts
    }

    /// RD_base of `cpu`'s redistributor
    pub fn redist_frame(&self, cpu: usize) -> PAddr {
        self.gic.redist_frame(cpu)
    }

    /// Stop or restart command processing
    ///
    /// Commands posted while stalled are executed on release.
    pub fn set_stalled(&self, stalled: bool) {
        self.gic.set_stalled(stalled)
    }

    /// LPIs pending on `cpu`'s redistributor
    pub fn pending_lpis(&self, cpu: usize) -> Vec<u32> {
        self.gic.state.lock().redists[cpu].pending.iter().copied().collect()
    }
}

impl Smp for SimPlatform {
    fn nr_cpus(&self) -> usize {
        self.gic.opts.cpus
    }

    fn current_cpu(&self) -> usize {
        0
    }

    fn boot_secondary(&self, cpu: usize, entry: SecondaryEntry) -> Result<()> {
        if cpu == 0 || cpu >= self.gic.opts.cpus {
            return Err(GicError::InvalidArgs);
        }
        self.gic.set_online(cpu);

        std::thread::Builder::new()
            .name(format!("sim-cpu{}", cpu))
            .spawn(move || entry(cpu))
            .map(|_| ())
            .map_err(|e| {
                log::error!("sim: cannot start cpu {}: {}", cpu, e);
                GicError::NotPresent { what: "secondary CPU" }
            })
    }
}

impl Platform for SimPlatform {
    fn name(&self) -> &'static str {
        "sim"
    }

    fn bus(&self) -> &dyn RegisterBus {
        &self.gic
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

    fn gic_bases(&self) -> Option<GicBases> {
        let opts = self.gic.opts;
        opts.gic.then_some(GicBases {
            version: GicVersion::V3,
            dist: SIM_GICD_BASE,
            redist: SIM_GICR_BASE,
            its: opts.its.then_some(SIM_ITS_BASE),
        })
    }

    fn set_irq_sink(&self, sink: &'static dyn IrqSink) {
        self.gic.set_sink(sink)
    }
}

// ============================================================================
// Tests
// ============================================================================
