// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Build script for the gictest image
//!
//! Bare-metal aarch64 builds link against the QEMU `virt` linker script.
//! Hosted builds (unit tests, the software GIC model) need nothing.

use std::env;
use std::path::PathBuf;

fn main() {
    let target_arch = env::var("CARGO_CFG_TARGET_ARCH").unwrap();
    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();

    println!("cargo:rerun-if-env-changed=GICTEST_CMDLINE");

    if target_arch == "aarch64" && target_os == "none" {
        configure_linker_arm64();
    }
}

fn configure_linker_arm64() {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let script = manifest_dir.join("src/kernel/arch/arm64/kernel.ld");

    // Use custom linker script for the bare-metal image
    println!("cargo:rustc-link-arg-bins=-T{}", script.display());

    // Disable PIE
    println!("cargo:rustc-link-arg-bins=--no-pie");

    println!("cargo:rerun-if-changed={}", script.display());
}
