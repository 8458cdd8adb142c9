// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Harness Command Line Parsing
//!
//! The command line is a whitespace separated list of tokens. The first
//! token without an `=` names the subtest; every other token is a
//! `key=value` setting. Unknown keys and malformed values are logged and
//! ignored, leaving the default in place.
//!
//! # Keys
//!
//! | Key | Default | Meaning |
//! |-----|---------|---------|
//! | `log` | `info` | minimum log level (`off`..`trace`) |
//! | `color` | `true` | ANSI colors in log output |
//! | `cpus` | platform | number of CPUs to use |
//! | `its.cmd_timeout_us` | `1000000` | ITS command completion timeout |
//! | `lpi.wait_ms` | `100` | window to wait for an LPI to arrive |
//! | `its.cache` | `nc` | table cacheability: `nc`, `wawb`, `rawawb` |
//!
//! # Usage
//!
//! ```rust
//! use gictest::kernel::cmdline::HarnessConfig;
//!
//! let cfg = HarnessConfig::parse("its-trigger cpus=4 lpi.wait_ms=0x20");
//! assert_eq!(cfg.test, Some("its-trigger"));
//! assert_eq!(cfg.cpus, Some(4));
//! assert_eq!(cfg.lpi_wait_ms, 32);
//! ```

use crate::kernel::debug::parse_level;
use crate::kernel::dev::interrupt::arm_gic::v3::regs::Cacheability;
use log::LevelFilter;

/// Default ITS command completion timeout (1s)
pub const DEFAULT_CMD_TIMEOUT_US: u64 = 1_000_000;

/// Default LPI observation window
pub const DEFAULT_LPI_WAIT_MS: u64 = 100;

/// Settings for one harness run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig<'a> {
    /// Selected subtest
    pub test: Option<&'a str>,
    /// Minimum log level
    pub log_level: LevelFilter,
    /// ANSI colors in log output
    pub colors: bool,
    /// CPU count override
    pub cpus: Option<usize>,
    /// ITS command completion timeout
    pub cmd_timeout_us: u64,
    /// LPI observation window
    pub lpi_wait_ms: u64,
    /// Cacheability programmed into GITS_BASER/GITS_CBASER
    pub table_cache: Cacheability,
}

impl Default for HarnessConfig<'_> {
    fn default() -> Self {
        Self {
            test: None,
            log_level: LevelFilter::Info,
            colors: true,
            cpus: None,
            cmd_timeout_us: DEFAULT_CMD_TIMEOUT_US,
            lpi_wait_ms: DEFAULT_LPI_WAIT_MS,
            table_cache: Cacheability::NonCacheable,
        }
    }
}

impl<'a> HarnessConfig<'a> {
    /// Parse a whole command line string
    pub fn parse(cmdline: &'a str) -> Self {
        Self::from_args(cmdline.split_whitespace())
    }

    /// Parse pre-split arguments (program name already removed)
    pub fn from_args<I>(args: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut cfg = Self::default();

        for arg in args {
            let Some((key, value)) = arg.split_once('=') else {
                if cfg.test.is_none() {
                    cfg.test = Some(arg);
                } else {
                    log::warn!("cmdline: ignoring extra argument '{}'", arg);
                }
                continue;
            };

            let applied = match key {
                "log" => parse_level(value).map(|l| cfg.log_level = l),
                "color" => parse_bool(value).map(|b| cfg.colors = b),
                "cpus" => parse_uint(value).map(|n| cfg.cpus = Some(n as usize)),
                "its.cmd_timeout_us" => parse_uint(value).map(|n| cfg.cmd_timeout_us = n),
                "lpi.wait_ms" => parse_uint(value).map(|n| cfg.lpi_wait_ms = n),
                "its.cache" => parse_cache(value).map(|c| cfg.table_cache = c),
                _ => {
                    log::warn!("cmdline: unknown key '{}'", key);
                    continue;
                }
            };

            if applied.is_none() {
                log::warn!("cmdline: bad value '{}' for '{}'", value, key);
            }
        }

        cfg
    }
}

/// Parse a boolean value
///
/// "0", "false" and "off" are false; "1", "true" and "on" are true.
pub fn parse_bool(v: &str) -> Option<bool> {
    match v {
        "0" | "false" | "off" => Some(false),
        "1" | "true" | "on" => Some(true),
        _ => None,
    }
}

/// Parse an unsigned integer, decimal or `0x`-prefixed hex
pub fn parse_uint(v: &str) -> Option<u64> {
    match v.strip_prefix("0x").or_else(|| v.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => v.parse().ok(),
    }
}

fn parse_cache(v: &str) -> Option<Cacheability> {
    match v {
        "nc" => Some(Cacheability::NonCacheable),
        "wawb" => Some(Cacheability::WaWb),
        "rawawb" => Some(Cacheability::RaWaWb),
        _ => None,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cmdline_empty() {
        let cfg = HarnessConfig::parse("");
        assert_eq!(cfg, HarnessConfig::default());
        assert!(cfg.test.is_none());
    }

    #[test]
    fn test_cmdline_subtest_and_keys() {
        let cfg = HarnessConfig::parse(
            "log=debug its-introspection color=off its.cmd_timeout_us=5000 its.cache=rawawb",
        );
        assert_eq!(cfg.test, Some("its-introspection"));
        assert_eq!(cfg.log_level, LevelFilter::Debug);
        assert!(!cfg.colors);
        assert_eq!(cfg.cmd_timeout_us, 5000);
        assert_eq!(cfg.table_cache, Cacheability::RaWaWb);
    }

    #[test]
    fn test_cmdline_bad_values_keep_defaults() {
        let cfg = HarnessConfig::parse("cpus=four lpi.wait_ms=0xzz bogus=1 its-trigger extra");
        assert_eq!(cfg.cpus, None);
        assert_eq!(cfg.lpi_wait_ms, DEFAULT_LPI_WAIT_MS);
        assert_eq!(cfg.test, Some("its-trigger"));
    }

    #[test]
    fn test_parse_uint() {
        assert_eq!(parse_uint("123"), Some(123));
        assert_eq!(parse_uint("0x1ff"), Some(0x1ff));
        assert_eq!(parse_uint("0XABC"), Some(0xabc));
        assert_eq!(parse_uint(""), None);
        assert_eq!(parse_uint("-1"), None);
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("on"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
