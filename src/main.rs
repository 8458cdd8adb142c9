// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! gictest - Main Entry Point
//!
//! On `aarch64-unknown-none` this is the QEMU image: the subtest and
//! options come from `GICTEST_CMDLINE` at build time and the exit status
//! is reported through semihosting.
//!
//! Everywhere else it runs the same subtests against the software GIC
//! model, taking the command line from the process arguments:
//!
//! ```bash
//! gictest its-trigger log=debug
//! ```

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
mod bare {
    use core::panic::PanicInfo;
    use gictest::kernel::cmdline::HarnessConfig;
    use gictest::kernel::debug::ConsoleLogger;
    use gictest::kernel::dev::uart::pl011::Pl011;
    use gictest::kernel::tests::{self, lpi_stats::LpiStats, runner::Reporter};
    use gictest::platform::virt::{VirtPlatform, VIRT_UART0_BASE};
    use gictest::platform::Platform;
    use gictest::reg::Mmio;
    use qemu_exit::QEMUExit;

    /// Command line baked into the image
    const CMDLINE: &str = match option_env!("GICTEST_CMDLINE") {
        Some(cmdline) => cmdline,
        None => "its-trigger",
    };

    // SAFETY: the image runs with the MMU off.
    static BUS: Mmio = unsafe { Mmio::new() };
    static UART: Pl011<'static> = Pl011::new(VIRT_UART0_BASE, &BUS);
    static LOGGER: ConsoleLogger = ConsoleLogger::new(&UART);
    static STATS: LpiStats = LpiStats::new();

    extern "C" {
        static __arena_start: u8;
    }

    /// Boot CPU entry, called once vectors and the CPU interface are up
    #[no_mangle]
    pub fn gictest_main() -> ! {
        UART.init();

        let cfg = HarnessConfig::parse(CMDLINE);
        LOGGER.install(cfg.log_level, cfg.colors);

        // SAFETY: only the address of the linker-provided symbol is taken.
        let arena = unsafe { core::ptr::addr_of!(__arena_start) } as u64;
        // SAFETY: MMU is off; the arena follows the image in RAM.
        let plat = unsafe { VirtPlatform::new(arena, cfg.cpus) };
        log::info!("gictest on {}: '{}'", plat.name(), CMDLINE);

        let reporter = Reporter::new(&UART);
        let status = tests::run(&plat, &reporter, &cfg, &STATS);

        UART.flush();
        qemu_exit::AArch64::new().exit(status as u32)
    }

    #[panic_handler]
    fn panic(info: &PanicInfo) -> ! {
        log::error!("panic: {}", info);
        UART.flush();
        qemu_exit::AArch64::new().exit_failure()
    }
}

#[cfg(not(target_os = "none"))]
fn main() {
    use gictest::kernel::cmdline::HarnessConfig;
    use gictest::kernel::debug::{ConsoleLogger, StdoutConsole};
    use gictest::kernel::tests::{self, lpi_stats::LpiStats, runner::Reporter};
    use gictest::platform::sim::{SimOptions, SimPlatform};

    static CONSOLE: StdoutConsole = StdoutConsole;
    static LOGGER: ConsoleLogger = ConsoleLogger::new(&CONSOLE);
    static STATS: LpiStats = LpiStats::new();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let cfg = HarnessConfig::from_args(args.iter().map(String::as_str));
    LOGGER.install(cfg.log_level, cfg.colors);

    let plat = SimPlatform::new(SimOptions {
        cpus: cfg.cpus.unwrap_or(SimOptions::default().cpus),
        ..SimOptions::default()
    });
    let reporter = Reporter::new(&CONSOLE);
    let status = tests::run(&plat, &reporter, &cfg, &STATS);

    std::process::exit(status);
}
