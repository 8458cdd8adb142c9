// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Harness Core
//!
//! Everything that runs on the target: device drivers, boot support,
//! services shared by the subtests, and the subtests themselves.

// Architecture module
#[cfg(all(target_arch = "aarch64", target_os = "none"))]
pub mod arch;

// Device drivers
pub mod dev;

pub mod cmdline;
pub mod debug;
pub mod mp;
pub mod pmm;
pub mod tests;
pub mod timer;
