// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! UART Drivers
//!
//! # Supported UARTs
//!
//! - **PL011**: ARM PrimeCell PL011 UART (QEMU ARM virt)

pub mod pl011;

// Re-exports
pub use pl011::Pl011;
