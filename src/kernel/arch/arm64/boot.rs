// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Boot
//!
//! `_start` runs on the boot CPU only: it enables FP/SIMD, takes the
//! first stack, clears `.bss` and enters [`primary_main`]. Secondaries
//! are started through PSCI CPU_ON at `secondary_entry` with their
//! logical index in x0 and get the matching stack.
//!
//! The binary provides `gictest_main`, which the boot CPU runs once the
//! vectors and the CPU interface are set up.

use super::{exceptions, irq_enable, MAX_CPUS, STACK_SHIFT, STACK_SIZE};
use crate::err::{GicError, Result};
use crate::kernel::dev::interrupt::arm_gic::v3::cpu_interface::SysregCpuInterface;
use crate::kernel::dev::psci::Psci;
use crate::kernel::mp::SecondaryEntry;
use core::arch::global_asm;

extern "Rust" {
    fn gictest_main() -> !;
}

extern "C" {
    fn secondary_entry();
}

/// Entry points handed to secondaries by [`start_secondary`]
static SECONDARY_ENTRIES: spin::Mutex<[Option<SecondaryEntry>; MAX_CPUS]> =
    spin::Mutex::new([None; MAX_CPUS]);

global_asm!(
    r#"
.section ".text.boot", "ax"
.global _start
_start:
    // FP/SIMD on: compiled code may use vector registers
    mov x1, #(0x3 << 20)
    msr cpacr_el1, x1
    isb

    ldr x1, =__stacks_start
    mov x2, #{stack_size}
    add x1, x1, x2
    mov sp, x1

    ldr x1, =__bss_start
    ldr x2, =__bss_end
1:
    cmp x1, x2
    b.hs 2f
    str xzr, [x1], #8
    b 1b
2:
    bl {primary}
3:
    wfe
    b 3b

.global secondary_entry
secondary_entry:
    mov x1, #(0x3 << 20)
    msr cpacr_el1, x1
    isb

    // sp = __stacks_start + (cpu + 1) * STACK_SIZE
    ldr x1, =__stacks_start
    add x2, x0, #1
    lsl x2, x2, #{stack_shift}
    add x1, x1, x2
    mov sp, x1
    bl {secondary}
4:
    wfe
    b 4b
"#,
    stack_size = const STACK_SIZE,
    stack_shift = const STACK_SHIFT,
    primary = sym primary_main,
    secondary = sym secondary_main,
);

extern "C" fn primary_main() -> ! {
    exceptions::install();
    SysregCpuInterface::enable();
    // SAFETY: provided by the binary; never returns.
    unsafe { gictest_main() }
}

extern "C" fn secondary_main(cpu: usize) -> ! {
    exceptions::install();
    SysregCpuInterface::enable();

    let entry = SECONDARY_ENTRIES.lock().get(cpu).copied().flatten();
    match entry {
        Some(entry) => {
            irq_enable();
            entry(cpu)
        }
        None => loop {
            aarch64_cpu::asm::wfe();
        },
    }
}

/// Power on `cpu` and have it run `entry` with IRQs unmasked
pub fn start_secondary(psci: &Psci, cpu: usize, mpidr: u64, entry: SecondaryEntry) -> Result<()> {
    if cpu == 0 || cpu >= MAX_CPUS {
        return Err(GicError::InvalidArgs);
    }
    SECONDARY_ENTRIES.lock()[cpu] = Some(entry);

    log::debug!("cpu {}: CPU_ON mpidr {:#x}", cpu, mpidr);
    psci.cpu_on(mpidr, secondary_entry as usize as u64, cpu as u64)
}
