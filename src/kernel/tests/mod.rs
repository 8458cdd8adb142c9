// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! GIC Test Suite
//!
//! Named subtests run against whatever [`Platform`] the harness was
//! started on.
//!
//! # Organization
//!
//! - [`runner`] - PASS/FAIL reporting and the summary line
//! - [`lpi_stats`] - expected/observed LPI record and the IRQ handler
//! - [`its`] - the ITS subtests
//!
//! # Running Tests
//!
//! ```text
//! gictest its-trigger
//! ```
//!
//! Every line is prefixed with `gicv3` and the subtest name. A run with
//! no GIC prints a notice and an empty summary.

pub mod lpi_stats;

use crate::err::Result;
use crate::kernel::cmdline::HarnessConfig;
use crate::kernel::dev::interrupt::arm_gic::v3::Gicv3;
use crate::platform::Platform;
use lpi_stats::LpiStats;
use runner::Reporter;

/// Everything a subtest needs
pub struct HarnessCtx<'a> {
    pub plat: &'a dyn Platform,
    pub reporter: &'a Reporter<'a>,
    pub cfg: &'a HarnessConfig<'a>,
    pub stats: &'static LpiStats,
    pub gic: Gicv3<'a>,
}

impl<'a> HarnessCtx<'a> {
    /// Wait for the armed LPI expectation and report `msg`
    pub fn check_lpi(&self, msg: &str) -> bool {
        self.stats
            .check(self.reporter, self.plat.clock(), self.cfg.lpi_wait_ms, msg)
    }
}

/// A named subtest
pub struct Subtest {
    pub name: &'static str,
    pub description: &'static str,
    pub run: fn(&mut HarnessCtx<'_>) -> Result<()>,
}

/// Subtests selectable by name
pub static SUBTESTS: &[Subtest] = &[
    Subtest {
        name: "its-introspection",
        description: "ITS identification and capability registers",
        run: its::test_its_introspection,
    },
    Subtest {
        name: "its-trigger",
        description: "LPI routing, invalidation and unmapping",
        run: its::test_its_trigger,
    },
    Subtest {
        name: "its-migration",
        description: "MAPI, MOVI and DISCARD",
        run: its::test_its_migration,
    },
];

/// Look up a subtest by name
pub fn find(name: &str) -> Option<&'static Subtest> {
    SUBTESTS.iter().find(|t| t.name == name)
}

/// Log the available subtests
pub fn list() {
    for t in SUBTESTS {
        log::info!("  {:<20} {}", t.name, t.description);
    }
}

/// Run the subtest named in `cfg` and return the exit status
///
/// LPIs are reported to `stats`, which is installed as the IRQ handler
/// on every CPU.
pub fn run<'a>(
    plat: &'a dyn Platform,
    reporter: &'a Reporter<'a>,
    cfg: &'a HarnessConfig<'a>,
    stats: &'static LpiStats,
) -> i32 {
    let gic = match Gicv3::probe(plat) {
        Ok(Some(gic)) => gic,
        Ok(None) => {
            reporter.print("No supported gic present, skipping tests...");
            return reporter.summary();
        }
        Err(e) => {
            reporter.report_abort(format_args!("GIC probe failed: {}", e));
            return reporter.exit_status();
        }
    };

    reporter.push_prefix("gicv3");

    let Some(name) = cfg.test else {
        reporter.report_abort("no test specified");
        return reporter.exit_status();
    };
    let Some(subtest) = find(name) else {
        reporter.report_abort(format_args!("Unknown subtest '{}'", name));
        return reporter.exit_status();
    };

    log::info!("{}: running {} on {} cpus", plat.name(), subtest.name, gic.nr_cpus());

    let mut ctx = HarnessCtx {
        plat,
        reporter,
        cfg,
        stats,
        gic,
    };

    reporter.push_prefix(subtest.name);
    let res = (subtest.run)(&mut ctx);
    if let Err(e) = res {
        log::error!("{} failed: {:?}", subtest.name, e);
        reporter.report_abort(e);
        reporter.pop_prefix();
        reporter.pop_prefix();
        return reporter.exit_status();
    }
    reporter.pop_prefix();
    reporter.pop_prefix();

    reporter.summary()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::debug::CaptureConsole;
    use crate::platform::sim::{SimOptions, SimPlatform};

    fn run_with(opts: SimOptions, test: Option<&str>) -> (i32, CaptureConsole) {
        static STATS: LpiStats = LpiStats::new();
        let plat = SimPlatform::new(opts);
        let console = CaptureConsole::new();
        let status = {
            let reporter = Reporter::new(&console);
            let cfg = HarnessConfig {
                test,
                ..HarnessConfig::default()
            };
            run(&plat, &reporter, &cfg, &STATS)
        };
        (status, console)
    }

    #[test]
    fn test_subtest_names() {
        assert!(find("its-trigger").is_some());
        assert!(find("its-introspection").is_some());
        assert!(find("its-migration").is_some());
        assert!(find("its").is_none());
        list();
    }

    #[test]
    fn test_no_gic_is_not_a_failure() {
        let (status, console) = run_with(
            SimOptions {
                gic: false,
                ..SimOptions::default()
            },
            Some("its-trigger"),
        );
        assert_eq!(status, 0);
        assert_eq!(
            console.lines_with(""),
            vec![
                "No supported gic present, skipping tests...",
                "SUMMARY: 0 tests, 0 unexpected failures, 0 skipped",
            ]
        );
    }

    #[test]
    fn test_missing_subtest_aborts() {
        let (status, console) = run_with(SimOptions::default(), None);
        assert_eq!(status, 1);
        assert_eq!(console.lines_with(""), vec!["ABORT: gicv3: no test specified"]);
    }

    #[test]
    fn test_unknown_subtest_aborts() {
        let (status, console) = run_with(SimOptions::default(), Some("its-frobnicate"));
        assert_eq!(status, 1);
        assert_eq!(
            console.lines_with(""),
            vec!["ABORT: gicv3: Unknown subtest 'its-frobnicate'"]
        );
        assert!(console.lines_with("SUMMARY:").is_empty());
    }
}
