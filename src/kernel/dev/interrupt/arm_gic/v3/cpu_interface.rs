// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! GICv3 CPU interface through the ICC system registers

use crate::kernel::dev::interrupt::CpuInterface;

macro_rules! read_icc {
    ($name:ident, $sysreg:literal) => {
        #[inline]
        fn $name() -> u32 {
            let value: u64;
            // SAFETY: reading an ICC register has no memory side effects.
            unsafe {
                core::arch::asm!(concat!("mrs {}, ", $sysreg), out(reg) value, options(nostack));
            }
            value as u32
        }
    };
}

macro_rules! write_icc {
    ($name:ident, $sysreg:literal) => {
        #[inline]
        fn $name(value: u32) {
            // SAFETY: the ICC registers written here only affect this CPU's
            // interrupt state.
            unsafe {
                core::arch::asm!(concat!("msr ", $sysreg, ", {}"), in(reg) value as u64, options(nostack));
            }
        }
    };
}

read_icc!(read_icc_iar1_el1, "S3_0_C12_C12_0");
write_icc!(write_icc_eoir1_el1, "S3_0_C12_C12_1");
write_icc!(write_icc_sre_el1, "S3_0_C12_C12_5");
write_icc!(write_icc_igrpen1_el1, "S3_0_C12_C12_7");
write_icc!(write_icc_pmr_el1, "S3_0_C4_C6_0");

/// Lowest priority mask: every priority above 0xf0 is signalled
const ICC_PMR_DEFAULT: u32 = 0xf0;

/// ICC_SRE_EL1.SRE
const ICC_SRE_SRE: u32 = 1 << 0;

/// The calling CPU's interface
pub struct SysregCpuInterface {
    cpu: usize,
}

impl SysregCpuInterface {
    pub const fn new(cpu: usize) -> Self {
        Self { cpu }
    }

    /// Enable system register access, open the priority mask and enable
    /// group 1 on the calling CPU
    pub fn enable() {
        write_icc_sre_el1(ICC_SRE_SRE);
        aarch64_cpu::asm::barrier::isb(aarch64_cpu::asm::barrier::SY);
        write_icc_pmr_el1(ICC_PMR_DEFAULT);
        write_icc_igrpen1_el1(1);
        aarch64_cpu::asm::barrier::isb(aarch64_cpu::asm::barrier::SY);
    }
}

impl CpuInterface for SysregCpuInterface {
    fn cpu_id(&self) -> usize {
        self.cpu
    }

    fn ack(&self) -> u32 {
        let iar = read_icc_iar1_el1();
        // Order the acknowledge before any reads the handler makes
        aarch64_cpu::asm::barrier::dsb(aarch64_cpu::asm::barrier::SY);
        iar
    }

    fn eoi(&self, iar: u32) {
        write_icc_eoir1_el1(iar);
        aarch64_cpu::asm::barrier::isb(aarch64_cpu::asm::barrier::SY);
    }
}
