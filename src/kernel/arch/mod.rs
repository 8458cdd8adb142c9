// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Architecture Support
//!
//! Boot, exception vectors and the GIC CPU interface. Only built for the
//! bare-metal aarch64 image.

#[cfg(target_arch = "aarch64")]
pub mod arm64;
