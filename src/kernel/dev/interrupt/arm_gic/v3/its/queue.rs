// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! ITS Command Queue
//!
//! A ring of 32-byte commands in normal memory. Software owns the write
//! cursor and publishes it through GITS_CWRITER; the ITS reports how far
//! it has got through GITS_CREADR. Both are byte offsets from the base.
//!
//! Commands are submitted one at a time and waited for, so at most one
//! command is ever outstanding. [`CmdQueue::allocate_entry`] still
//! refuses to step onto the last read cursor it saw, which is what
//! happens after enough commands have been queued behind a stuck ITS.

use super::cmd::ItsCmdBlock;
use crate::err::{GicError, Result};
use crate::kernel::dev::interrupt::arm_gic::v3::regs::*;
use crate::kernel::timer::{wait_until, Clock};
use crate::reg::{Barrier, PAddr, RegisterBus};

/// Queue size
pub const ITS_CMD_QUEUE_BYTES: usize = 64 * 1024;

/// Poll interval while waiting for CREADR
const CMD_POLL_US: u64 = 1;

/// Whether the read cursor `rd` has left the window `[from, to)`
///
/// The window may wrap past the end of the queue, in which case it is
/// `[from, size) ∪ [0, to)`.
#[inline]
pub const fn range_consumed(rd: u64, from: u64, to: u64) -> bool {
    if from <= to {
        rd >= to || rd < from
    } else {
        rd >= to && rd < from
    }
}

/// Software side of the command queue
#[derive(Debug)]
pub struct CmdQueue {
    its: PAddr,
    base: PAddr,
    size: u64,
    write: u64,
    last_read: u64,
}

impl CmdQueue {
    /// Describe a queue of `size` bytes at `base` for the ITS at `its`
    pub const fn new(its: PAddr, base: PAddr, size: usize) -> Self {
        Self {
            its,
            base,
            size: size as u64,
            write: 0,
            last_read: 0,
        }
    }

    pub fn base(&self) -> PAddr {
        self.base
    }

    pub fn size(&self) -> usize {
        self.size as usize
    }

    /// Current write cursor
    pub fn write_offset(&self) -> u64 {
        self.write
    }

    /// GITS_CBASER value describing this queue
    pub fn cbaser(&self, cache: Cacheability) -> u64 {
        let pages = self.size / 4096;
        (self.base & GITS_PA_MASK)
            | GITS_CBASER_VALID
            | ((cache as u64) << GITS_CBASER_INNER_CACHE_SHIFT)
            | ((Shareability::for_cache(cache) as u64) << GITS_CBASER_SHAREABILITY_SHIFT)
            | ((pages - 1) & GITS_CBASER_SIZE_MASK)
    }

    /// Program GITS_CBASER and rewind both cursors
    pub fn init(&mut self, bus: &dyn RegisterBus, cache: Cacheability) {
        bus.write64(self.its + GITS_CBASER, self.cbaser(cache));
        self.write = 0;
        self.last_read = 0;
        bus.write64(self.its + GITS_CWRITER, 0);
        bus.barrier(Barrier::Write);
    }

    /// Claim the slot at the write cursor and advance the cursor
    ///
    /// Returns the slot's byte offset.
    pub fn allocate_entry(&mut self) -> Result<u64> {
        let slot = self.write;
        let next = (slot + ItsCmdBlock::SIZE as u64) % self.size;
        if next == self.last_read {
            log::error!(
                "ITS: command queue full (write={:#x} read={:#x})",
                slot,
                self.last_read
            );
            return Err(GicError::QueueFull);
        }
        self.write = next;
        Ok(slot)
    }

    /// Copy an encoded command into the queue
    pub fn write_cmd(&self, bus: &dyn RegisterBus, offset: u64, cmd: &ItsCmdBlock) {
        let slot = self.base + offset;
        for (i, word) in cmd.raw.iter().enumerate() {
            bus.write64(slot + 8 * i as PAddr, *word);
        }
    }

    /// Read back the command stored at `offset`
    pub fn read_cmd(&self, bus: &dyn RegisterBus, offset: u64) -> ItsCmdBlock {
        let slot = self.base + (offset % self.size);
        let mut raw = [0u64; 4];
        for (i, word) in raw.iter_mut().enumerate() {
            *word = bus.read64(slot + 8 * i as PAddr);
        }
        ItsCmdBlock::from_raw(raw)
    }

    /// Publish the write cursor to the ITS
    ///
    /// Returns the cursor written.
    pub fn post(&self, bus: &dyn RegisterBus) -> u64 {
        bus.barrier(Barrier::Write);
        bus.write64(self.its + GITS_CWRITER, self.write);
        self.write
    }

    /// GITS_CREADR offset and Stalled flag
    pub fn read_ptr(&self, bus: &dyn RegisterBus) -> (u64, bool) {
        let creadr = bus.read64(self.its + GITS_CREADR);
        (creadr & GITS_CMD_OFFSET_MASK, creadr & GITS_CREADR_STALLED != 0)
    }

    /// Poll CREADR until the ITS has consumed `[from, to)`
    pub fn wait_for_range_completion(
        &mut self,
        bus: &dyn RegisterBus,
        clock: &dyn Clock,
        from: u64,
        to: u64,
        timeout_us: u64,
    ) -> Result<()> {
        let mut rd = self.last_read;
        let done = wait_until(clock, timeout_us, CMD_POLL_US, || {
            rd = self.read_ptr(bus).0;
            range_consumed(rd, from, to)
        });
        self.last_read = rd;

        if done {
            Ok(())
        } else {
            Err(GicError::Timeout { what: "ITS command" })
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::timer::VirtualClock;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Memory plus a CREADR that follows CWRITER unless frozen
    #[derive(Default)]
    struct FakeIts {
        mem: Mutex<HashMap<PAddr, u64>>,
        frozen: Mutex<bool>,
    }

    const ITS: PAddr = 0x0808_0000;
    const QUEUE: PAddr = 0x4010_0000;

    impl RegisterBus for FakeIts {
        fn read8(&self, _addr: PAddr) -> u8 {
            0
        }

        fn read16(&self, _addr: PAddr) -> u16 {
            0
        }

        fn read32(&self, _addr: PAddr) -> u32 {
            0
        }

        fn read64(&self, addr: PAddr) -> u64 {
            *self.mem.lock().unwrap().get(&addr).unwrap_or(&0)
        }

        fn write8(&self, _addr: PAddr, _val: u8) {}

        fn write16(&self, _addr: PAddr, _val: u16) {}

        fn write32(&self, _addr: PAddr, _val: u32) {}

        fn write64(&self, addr: PAddr, val: u64) {
            let mut mem = self.mem.lock().unwrap();
            mem.insert(addr, val);
            if addr == ITS + GITS_CWRITER && !*self.frozen.lock().unwrap() {
                mem.insert(ITS + GITS_CREADR, val);
            }
        }

        fn barrier(&self, _kind: Barrier) {}
    }

    #[test]
    fn test_range_consumed() {
        // Plain window [0x20, 0x40)
        assert!(!range_consumed(0x20, 0x20, 0x40));
        assert!(range_consumed(0x40, 0x20, 0x40));
        assert!(range_consumed(0x00, 0x20, 0x40));

        // Wrapped window [0xffe0, 0x10000) then [0, 0)
        assert!(!range_consumed(0xffe0, 0xffe0, 0));
        assert!(range_consumed(0, 0xffe0, 0));
        assert!(range_consumed(0x100, 0xffe0, 0));
    }

    #[test]
    fn test_cursor_wraps() {
        let mut q = CmdQueue::new(ITS, QUEUE, ITS_CMD_QUEUE_BYTES);
        let mut last = 0;
        for i in 0..(ITS_CMD_QUEUE_BYTES / ItsCmdBlock::SIZE) {
            last = q.allocate_entry().unwrap();
            assert_eq!(last, (i * ItsCmdBlock::SIZE) as u64);
            // Pretend the ITS keeps up
            q.last_read = q.write;
        }
        assert_eq!(last, 0xffe0);
        assert_eq!(q.write_offset(), 0);
    }

    #[test]
    fn test_refuses_to_overrun_reader() {
        let mut q = CmdQueue::new(ITS, QUEUE, 4 * ItsCmdBlock::SIZE);
        assert_eq!(q.allocate_entry(), Ok(0x00));
        assert_eq!(q.allocate_entry(), Ok(0x20));
        assert_eq!(q.allocate_entry(), Ok(0x40));
        assert_eq!(q.allocate_entry(), Err(GicError::QueueFull));
        assert_eq!(q.write_offset(), 0x60);
    }

    #[test]
    fn test_submit_and_wait() {
        let bus = FakeIts::default();
        let clock = VirtualClock::new();
        let mut q = CmdQueue::new(ITS, QUEUE, ITS_CMD_QUEUE_BYTES);
        q.init(&bus, Cacheability::NonCacheable);

        let cbaser = bus.read64(ITS + GITS_CBASER);
        assert_eq!(cbaser & GITS_PA_MASK, QUEUE);
        assert_eq!(cbaser & GITS_CBASER_SIZE_MASK, 15);
        assert_ne!(cbaser & GITS_CBASER_VALID, 0);

        let from = q.allocate_entry().unwrap();
        let block = ItsCmdBlock::from_raw([0x3, 0, 0, 0]);
        q.write_cmd(&bus, from, &block);
        let to = q.post(&bus);
        assert_eq!(to, 0x20);
        assert_eq!(q.read_cmd(&bus, from), block);
        assert!(q.wait_for_range_completion(&bus, &clock, from, to, 100).is_ok());
        assert_eq!(clock.now_us(), 0);
    }

    #[test]
    fn test_wait_times_out() {
        let bus = FakeIts::default();
        *bus.frozen.lock().unwrap() = true;
        let clock = VirtualClock::new();
        let mut q = CmdQueue::new(ITS, QUEUE, ITS_CMD_QUEUE_BYTES);
        q.init(&bus, Cacheability::NonCacheable);

        let from = q.allocate_entry().unwrap();
        let to = q.post(&bus);
        assert_eq!(
            q.wait_for_range_completion(&bus, &clock, from, to, 500),
            Err(GicError::Timeout { what: "ITS command" })
        );
        assert!(clock.now_us() >= 500);
        assert_eq!(q.read_ptr(&bus), (0, false));
    }
}
