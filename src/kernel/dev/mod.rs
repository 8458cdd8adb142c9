// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Device Drivers
//!
//! Drivers for the handful of peripherals the harness touches. The GIC
//! and UART drivers go through [`crate::reg::RegisterBus`] and build on
//! every target; PSCI and the generic timer need aarch64 instructions.

// UART drivers
pub mod uart;

// Interrupt controllers
pub mod interrupt;

// Power state coordination (firmware calls)
#[cfg(target_arch = "aarch64")]
pub mod psci;

// Hardware timers
#[cfg(target_arch = "aarch64")]
pub mod timer;
