// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Hardware Timers
//!
//! # Supported Timers
//!
//! - **ARM Generic Timer**: Standard timer in ARMv8 systems (QEMU ARM virt)

pub mod arm_generic;

// Re-exports
pub use arm_generic::GenericTimer;
