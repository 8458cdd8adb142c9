// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Register Access Module
//!
//! Every GIC register access in the harness goes through [`RegisterBus`].
//! On hardware the bus is [`Mmio`], a volatile identity-mapped window.
//! On the host the software GIC model implements the same trait.
//!
//! Writes are not guaranteed to reach the device until the matching
//! [`Barrier`] has been issued.

/// Physical address
pub type PAddr = u64;

/// Barrier flavours used by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Barrier {
    /// Order prior reads before later accesses (`dsb ld`)
    Read,
    /// Make prior writes visible to devices (`dsb st`)
    Write,
    /// Full system barrier (`dsb sy`)
    Full,
    /// Context synchronization (`isb`)
    Instruction,
}

/// Register access capability
///
/// All methods take `&self`: implementations either talk to real
/// hardware or use interior mutability.
pub trait RegisterBus: Sync {
    fn read8(&self, addr: PAddr) -> u8;
    fn read16(&self, addr: PAddr) -> u16;
    fn read32(&self, addr: PAddr) -> u32;
    fn read64(&self, addr: PAddr) -> u64;
    fn write8(&self, addr: PAddr, val: u8);
    fn write16(&self, addr: PAddr, val: u16);
    fn write32(&self, addr: PAddr, val: u32);
    fn write64(&self, addr: PAddr, val: u64);
    fn barrier(&self, kind: Barrier);
}

/// Volatile MMIO over an identity-mapped physical address space
pub struct Mmio {
    _private: (),
}

impl Mmio {
    /// Create the MMIO bus
    ///
    /// # Safety
    ///
    /// Physical addresses must be directly accessible (MMU off or an
    /// identity mapping), and callers must only pass addresses of real
    /// registers or memory owned by the harness.
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

macro_rules! mmio_rw {
    ($read:ident, $write:ident, $ty:ty) => {
        #[inline]
        fn $read(&self, addr: PAddr) -> $ty {
            // SAFETY: guaranteed by the contract of `Mmio::new`.
            unsafe { core::ptr::read_volatile(addr as usize as *const $ty) }
        }

        #[inline]
        fn $write(&self, addr: PAddr, val: $ty) {
            // SAFETY: guaranteed by the contract of `Mmio::new`.
            unsafe { core::ptr::write_volatile(addr as usize as *mut $ty, val) }
        }
    };
}

impl RegisterBus for Mmio {
    mmio_rw!(read8, write8, u8);
    mmio_rw!(read16, write16, u16);
    mmio_rw!(read32, write32, u32);
    mmio_rw!(read64, write64, u64);

    #[cfg(target_arch = "aarch64")]
    fn barrier(&self, kind: Barrier) {
        use aarch64_cpu::asm::barrier;
        match kind {
            // SAFETY: barriers have no operands and no side effects besides ordering.
            Barrier::Read => unsafe { core::arch::asm!("dsb ld", options(nostack)) },
            Barrier::Write => unsafe { core::arch::asm!("dsb st", options(nostack)) },
            Barrier::Full => barrier::dsb(barrier::SY),
            Barrier::Instruction => barrier::isb(barrier::SY),
        }
    }

    #[cfg(not(target_arch = "aarch64"))]
    fn barrier(&self, kind: Barrier) {
        use core::sync::atomic::{fence, Ordering};
        match kind {
            Barrier::Read => fence(Ordering::Acquire),
            Barrier::Write => fence(Ordering::Release),
            Barrier::Full | Barrier::Instruction => fence(Ordering::SeqCst),
        }
    }
}
