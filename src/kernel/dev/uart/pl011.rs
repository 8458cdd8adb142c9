// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! ARM PL011 UART Driver
//!
//! Polled transmit-only driver used as the harness console. There is no
//! receive path: the harness never reads input.
//!
//! # QEMU Support
//!
//! ```bash
//! qemu-system-aarch64 -M virt,gic-version=3 -cpu max -smp 4 \
//!   -kernel gictest -nographic -semihosting
//! ```
//!
//! # Register Map
//!
//! | Offset | Name    | Description                |
//! |--------|---------|----------------------------|
//! | 0x00   | DR      | Data Register              |
//! | 0x18   | FR      | Flag Register              |
//! | 0x2C   | LCRH    | Line Control Register      |
//! | 0x30   | CR      | Control Register           |
//! | 0x44   | ICR     | Interrupt Clear Register   |

use crate::kernel::debug::Console;
use crate::reg::{PAddr, RegisterBus};

// ============================================================================
// Register Offsets
// ============================================================================

const UART_DR: PAddr = 0x00; // Data Register
const UART_FR: PAddr = 0x18; // Flag Register
const UART_LCRH: PAddr = 0x2C; // Line Control Register
const UART_CR: PAddr = 0x30; // Control Register
const UART_IMSC: PAddr = 0x38; // Interrupt Mask Set/Clear
const UART_ICR: PAddr = 0x44; // Interrupt Clear Register

// ============================================================================
// Register Bits
// ============================================================================

const FR_TXFF: u32 = 1 << 5; // TX FIFO Full
const FR_BUSY: u32 = 1 << 3; // UART Busy

const LCRH_WLEN_8: u32 = 0b11 << 5; // 8 data bits
const LCRH_FEN: u32 = 1 << 4; // FIFO enable

const CR_TXE: u32 = 1 << 8; // TX Enable
const CR_UARTEN: u32 = 1 << 0; // UART Enable

const ICR_ALL: u32 = 0x7FF; // Clear all interrupts

/// Polled PL011 transmitter
pub struct Pl011<'a> {
    base: PAddr,
    bus: &'a dyn RegisterBus,
    lock: spin::Mutex<()>,
}

impl<'a> Pl011<'a> {
    pub const fn new(base: PAddr, bus: &'a dyn RegisterBus) -> Self {
        Self {
            base,
            bus,
            lock: spin::Mutex::new(()),
        }
    }

    /// Program 8N1 with FIFOs, interrupts masked, transmitter on
    ///
    /// The baud rate is left as firmware configured it.
    pub fn init(&self) {
        let _guard = self.lock.lock();
        self.bus.write32(self.base + UART_CR, 0);
        self.bus.write32(self.base + UART_IMSC, 0);
        self.bus.write32(self.base + UART_ICR, ICR_ALL);
        self.bus.write32(self.base + UART_LCRH, LCRH_WLEN_8 | LCRH_FEN);
        self.bus.write32(self.base + UART_CR, CR_UARTEN | CR_TXE);
    }

    fn putc(&self, c: u8) {
        while self.bus.read32(self.base + UART_FR) & FR_TXFF != 0 {
            core::hint::spin_loop();
        }
        self.bus.write32(self.base + UART_DR, c as u32);
    }

    /// Wait for the transmitter to drain
    pub fn flush(&self) {
        while self.bus.read32(self.base + UART_FR) & FR_BUSY != 0 {
            core::hint::spin_loop();
        }
    }
}

impl Console for Pl011<'_> {
    fn write_str(&self, s: &str) {
        let _guard = self.lock.lock();
        for &b in s.as_bytes() {
            if b == b'\n' {
                self.putc(b'\r');
            }
            self.putc(b);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reg::Barrier;
    use std::sync::Mutex;

    /// Records data register writes; FR reads report "full" a few times
    #[derive(Default)]
    struct FakeUart {
        tx: Mutex<Vec<u8>>,
        busy_polls: Mutex<u32>,
    }

    impl RegisterBus for FakeUart {
        fn read8(&self, _addr: PAddr) -> u8 { 0 }
        fn read16(&self, _addr: PAddr) -> u16 { 0 }
        fn read32(&self, addr: PAddr) -> u32 {
            if addr & 0xfff == UART_FR {
                let mut polls = self.busy_polls.lock().unwrap();
                if *polls > 0 {
                    *polls -= 1;
                    return FR_TXFF;
                }
            }
            0
        }
        fn read64(&self, _addr: PAddr) -> u64 { 0 }
        fn write8(&self, _addr: PAddr, _val: u8) {}
        fn write16(&self, _addr: PAddr, _val: u16) {}
        fn write32(&self, addr: PAddr, val: u32) {
            if addr & 0xfff == UART_DR {
                self.tx.lock().unwrap().push(val as u8);
            }
        }
        fn write64(&self, _addr: PAddr, _val: u64) {}
        fn barrier(&self, _kind: Barrier) {}
    }

    #[test]
    fn test_newline_translation() {
        let fake = FakeUart::default();
        *fake.busy_polls.lock().unwrap() = 3;
        let uart = Pl011::new(0x0900_0000, &fake);
        uart.init();
        uart.write_str("ok\n");
        assert_eq!(fake.tx.lock().unwrap().as_slice(), b"ok\r\n");
    }
}
