// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! GICv3 ITS Conformance Harness
//!
//! A bare-metal test image that drives the GICv3 Interrupt Translation
//! Service through its command queue and checks that LPIs are routed,
//! invalidated and withdrawn the way the architecture requires.
//!
//! # Layout
//!
//! - [`reg`] - register bus abstraction and volatile MMIO backend
//! - [`kernel::dev::interrupt::arm_gic::v3`] - GICv3 and ITS driver model
//! - [`kernel::tests`] - the subtests, reporter and LPI result channel
//! - [`platform`] - QEMU `virt` board and the software GIC model
//!
//! Hosted builds link `std` and run everything against [`platform::sim`].

#![cfg_attr(target_os = "none", no_std)]

pub mod bits;
pub mod err;
pub mod kernel;
pub mod platform;
pub mod reg;

pub use err::{GicError, Result};
