// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! ARM Power State Coordination Interface (PSCI)
//!
//! The harness uses PSCI to start secondary CPUs and to power the machine
//! off after a fatal exception.
//!
//! # PSCI Functions
//!
//! - `CPU_ON` - Power on a CPU
//! - `AFFINITY_INFO` - Get CPU affinity state
//! - `SYSTEM_OFF` - Power down the system
//!
//! # Usage
//!
//! ```rust,ignore
//! let psci = Psci::new(PsciCallType::Hvc);
//! psci.cpu_on(mpidr, secondary_entry as u64, cpu as u64)?;
//! ```

use crate::err::{GicError, Result};

/// PSCI function identifiers (64-bit)
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PsciFunction {
    /// CPU on
    CpuOn = 0xC4000003,

    /// Affinity info
    AffinityInfo = 0xC4000004,

    /// System off
    SystemOff = 0x84000008,
}

/// PSCI return codes
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PsciReturn {
    Success = 0,
    NotSupported = -1,
    InvalidParameters = -2,
    Denied = -3,
    AlreadyOn = -4,
    OnPending = -5,
    InternalFailure = -6,
    NotPresent = -7,
    Disabled = -8,
    InvalidAddress = -9,
}

impl PsciReturn {
    fn from_raw(raw: i32) -> Self {
        match raw {
            0 => PsciReturn::Success,
            -1 => PsciReturn::NotSupported,
            -2 => PsciReturn::InvalidParameters,
            -3 => PsciReturn::Denied,
            -4 => PsciReturn::AlreadyOn,
            -5 => PsciReturn::OnPending,
            -7 => PsciReturn::NotPresent,
            -8 => PsciReturn::Disabled,
            -9 => PsciReturn::InvalidAddress,
            _ => PsciReturn::InternalFailure,
        }
    }
}

/// PSCI calling convention
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PsciCallType {
    /// Use SMC (Secure Monitor Call)
    Smc,

    /// Use HVC (Hypervisor Call)
    Hvc,
}

/// PSCI conduit
pub struct Psci {
    call_type: PsciCallType,
}

impl Psci {
    pub const fn new(call_type: PsciCallType) -> Self {
        Self { call_type }
    }

    /// Make a PSCI call using the configured convention
    fn call(&self, function: PsciFunction, arg0: u64, arg1: u64, arg2: u64) -> u64 {
        let mut x0 = function as u64;
        // SAFETY: SMCCC calls clobber only x0-x17; the firmware validates
        // its arguments.
        unsafe {
            match self.call_type {
                PsciCallType::Smc => core::arch::asm!(
                    "smc #0",
                    inout("x0") x0,
                    inout("x1") arg0 => _,
                    inout("x2") arg1 => _,
                    inout("x3") arg2 => _,
                    out("x4") _, out("x5") _, out("x6") _, out("x7") _,
                    out("x8") _, out("x9") _, out("x10") _, out("x11") _,
                    out("x12") _, out("x13") _, out("x14") _, out("x15") _,
                    out("x16") _, out("x17") _,
                    options(nostack),
                ),
                PsciCallType::Hvc => core::arch::asm!(
                    "hvc #0",
                    inout("x0") x0,
                    inout("x1") arg0 => _,
                    inout("x2") arg1 => _,
                    inout("x3") arg2 => _,
                    out("x4") _, out("x5") _, out("x6") _, out("x7") _,
                    out("x8") _, out("x9") _, out("x10") _, out("x11") _,
                    out("x12") _, out("x13") _, out("x14") _, out("x15") _,
                    out("x16") _, out("x17") _,
                    options(nostack),
                ),
            }
        }
        x0
    }

    /// Power on the CPU with affinity `mpidr` at physical address `entry`
    ///
    /// `context` is handed to the new CPU in x0.
    pub fn cpu_on(&self, mpidr: u64, entry: u64, context: u64) -> Result<()> {
        let ret = PsciReturn::from_raw(self.call(PsciFunction::CpuOn, mpidr, entry, context) as i32);
        match ret {
            PsciReturn::Success | PsciReturn::AlreadyOn => Ok(()),
            other => {
                log::error!("PSCI: CPU_ON({:#x}) failed: {:?}", mpidr, other);
                Err(GicError::NotPresent { what: "secondary cpu" })
            }
        }
    }

    /// Affinity state of a CPU (0 = ON, 1 = OFF, 2 = ON_PENDING)
    pub fn affinity_info(&self, mpidr: u64) -> i32 {
        self.call(PsciFunction::AffinityInfo, mpidr, 0, 0) as i32
    }

    /// System off - power down the system
    pub fn system_off(&self) {
        log::info!("PSCI: System powering off...");
        self.call(PsciFunction::SystemOff, 0, 0, 0);
        log::warn!("PSCI system_off returned unexpectedly");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_psci_function_values() {
        assert_eq!(PsciFunction::AffinityInfo as u32, 0xC4000004);
        assert_eq!(PsciFunction::CpuOn as u32, 0xC4000003);
        assert_eq!(PsciFunction::SystemOff as u32, 0x84000008);
    }

    #[test]
    fn test_psci_return_codes() {
        assert_eq!(PsciReturn::from_raw(0), PsciReturn::Success);
        assert_eq!(PsciReturn::from_raw(-4), PsciReturn::AlreadyOn);
        assert_eq!(PsciReturn::from_raw(-42), PsciReturn::InternalFailure);
    }
}
