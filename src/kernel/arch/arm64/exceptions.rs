// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! ARM64 Exceptions
//!
//! One vector table shared by every CPU. IRQs taken at EL1h go to the
//! installed [`IrqSink`]; every other exception is fatal and powers the
//! machine off. Semihosting is not used on that path since a missing
//! semihosting trap is itself one of the ways to get there.

use super::cpu_index;
use crate::kernel::dev::interrupt::arm_gic::v3::cpu_interface::SysregCpuInterface;
use crate::kernel::dev::interrupt::{CpuInterface, IrqSink};
use crate::kernel::dev::psci::{Psci, PsciCallType};
use aarch64_cpu::asm::barrier;
use aarch64_cpu::registers::*;
use core::arch::global_asm;

/// Registers saved on exception entry
///
/// Must match `SAVE_FRAME` below.
#[repr(C)]
pub struct ExceptionFrame {
    /// x0-x18, x29, x30
    pub regs: [u64; 21],
    pub elr: u64,
    pub spsr: u64,
    _pad: u64,
    pub vregs: [u128; 32],
    pub fpcr: u64,
    pub fpsr: u64,
}

const _: () = assert!(core::mem::size_of::<ExceptionFrame>() == 720);

const VECTOR_NAMES: [&str; 16] = [
    "sync (EL1t)",
    "irq (EL1t)",
    "fiq (EL1t)",
    "serror (EL1t)",
    "sync (EL1h)",
    "irq (EL1h)",
    "fiq (EL1h)",
    "serror (EL1h)",
    "sync (EL0, AArch64)",
    "irq (EL0, AArch64)",
    "fiq (EL0, AArch64)",
    "serror (EL0, AArch64)",
    "sync (EL0, AArch32)",
    "irq (EL0, AArch32)",
    "fiq (EL0, AArch32)",
    "serror (EL0, AArch32)",
];

static IRQ_SINK: spin::Once<&'static dyn IrqSink> = spin::Once::new();

extern "C" {
    static exception_vectors: u8;
}

global_asm!(
    r#"
.macro SAVE_FRAME
    sub sp, sp, #720
    stp x0,  x1,  [sp, #0]
    stp x2,  x3,  [sp, #16]
    stp x4,  x5,  [sp, #32]
    stp x6,  x7,  [sp, #48]
    stp x8,  x9,  [sp, #64]
    stp x10, x11, [sp, #80]
    stp x12, x13, [sp, #96]
    stp x14, x15, [sp, #112]
    stp x16, x17, [sp, #128]
    stp x18, x29, [sp, #144]
    str x30,      [sp, #160]
    mrs x0, elr_el1
    mrs x1, spsr_el1
    stp x0, x1, [sp, #168]
    add x0, sp, #192
    stp q0,  q1,  [x0, #0]
    stp q2,  q3,  [x0, #32]
    stp q4,  q5,  [x0, #64]
    stp q6,  q7,  [x0, #96]
    stp q8,  q9,  [x0, #128]
    stp q10, q11, [x0, #160]
    stp q12, q13, [x0, #192]
    stp q14, q15, [x0, #224]
    stp q16, q17, [x0, #256]
    stp q18, q19, [x0, #288]
    stp q20, q21, [x0, #320]
    stp q22, q23, [x0, #352]
    stp q24, q25, [x0, #384]
    stp q26, q27, [x0, #416]
    stp q28, q29, [x0, #448]
    stp q30, q31, [x0, #480]
    mrs x1, fpcr
    mrs x2, fpsr
    stp x1, x2, [sp, #704]
.endm

.macro RESTORE_FRAME
    ldp x1, x2, [sp, #704]
    msr fpcr, x1
    msr fpsr, x2
    add x0, sp, #192
    ldp q0,  q1,  [x0, #0]
    ldp q2,  q3,  [x0, #32]
    ldp q4,  q5,  [x0, #64]
    ldp q6,  q7,  [x0, #96]
    ldp q8,  q9,  [x0, #128]
    ldp q10, q11, [x0, #160]
    ldp q12, q13, [x0, #192]
    ldp q14, q15, [x0, #224]
    ldp q16, q17, [x0, #256]
    ldp q18, q19, [x0, #288]
    ldp q20, q21, [x0, #320]
    ldp q22, q23, [x0, #352]
    ldp q24, q25, [x0, #384]
    ldp q26, q27, [x0, #416]
    ldp q28, q29, [x0, #448]
    ldp q30, q31, [x0, #480]
    ldp x0, x1, [sp, #168]
    msr elr_el1, x0
    msr spsr_el1, x1
    ldp x0,  x1,  [sp, #0]
    ldp x2,  x3,  [sp, #16]
    ldp x4,  x5,  [sp, #32]
    ldp x6,  x7,  [sp, #48]
    ldp x8,  x9,  [sp, #64]
    ldp x10, x11, [sp, #80]
    ldp x12, x13, [sp, #96]
    ldp x14, x15, [sp, #112]
    ldp x16, x17, [sp, #128]
    ldp x18, x29, [sp, #144]
    ldr x30,      [sp, #160]
    add sp, sp, #720
.endm

.macro FATAL_VECTOR kind
    .balign 0x80
    b fatal_\kind
.endm

.macro FATAL_STUB kind
fatal_\kind:
    SAVE_FRAME
    mov x0, sp
    mov x1, #\kind
    bl {fatal}
    b .
.endm

.section .text.vectors, "ax"
.balign 0x800
.global exception_vectors
exception_vectors:
    FATAL_VECTOR 0
    FATAL_VECTOR 1
    FATAL_VECTOR 2
    FATAL_VECTOR 3
    FATAL_VECTOR 4
    .balign 0x80
    b irq_el1h
    FATAL_VECTOR 6
    FATAL_VECTOR 7
    FATAL_VECTOR 8
    FATAL_VECTOR 9
    FATAL_VECTOR 10
    FATAL_VECTOR 11
    FATAL_VECTOR 12
    FATAL_VECTOR 13
    FATAL_VECTOR 14
    FATAL_VECTOR 15

irq_el1h:
    SAVE_FRAME
    bl {irq}
    RESTORE_FRAME
    eret

    FATAL_STUB 0
    FATAL_STUB 1
    FATAL_STUB 2
    FATAL_STUB 3
    FATAL_STUB 4
    FATAL_STUB 6
    FATAL_STUB 7
    FATAL_STUB 8
    FATAL_STUB 9
    FATAL_STUB 10
    FATAL_STUB 11
    FATAL_STUB 12
    FATAL_STUB 13
    FATAL_STUB 14
    FATAL_STUB 15
"#,
    irq = sym irq_entry,
    fatal = sym fatal_entry,
);

/// Point VBAR_EL1 of the calling CPU at the vector table
pub fn install() {
    // SAFETY: only the address of the linker-provided symbol is taken.
    let vectors = unsafe { core::ptr::addr_of!(exception_vectors) } as u64;
    VBAR_EL1.set(vectors);
    barrier::isb(barrier::SY);
}

/// Route IRQs on every CPU to `sink`
///
/// The first sink installed stays for the whole run.
pub fn set_irq_sink(sink: &'static dyn IrqSink) {
    if IRQ_SINK.is_completed() {
        log::debug!("irq: sink already installed");
        return;
    }
    IRQ_SINK.call_once(|| sink);
}

extern "C" fn irq_entry() {
    let cpu = SysregCpuInterface::new(cpu_index());
    match IRQ_SINK.get() {
        Some(sink) => sink.handle_irq(&cpu),
        None => {
            // Nobody to hand it to: complete it so it does not fire again
            let iar = cpu.ack();
            cpu.eoi(iar);
        }
    }
}

extern "C" fn fatal_entry(frame: &ExceptionFrame, kind: u64) -> ! {
    let name = VECTOR_NAMES.get(kind as usize).copied().unwrap_or("?");
    log::error!(
        "cpu {}: unexpected exception {}: ESR {:#x} FAR {:#x} ELR {:#x} SPSR {:#x}",
        cpu_index(),
        name,
        ESR_EL1.get(),
        FAR_EL1.get(),
        frame.elr,
        frame.spsr
    );
    Psci::new(PsciCallType::Hvc).system_off();
    loop {
        aarch64_cpu::asm::wfe();
    }
}
