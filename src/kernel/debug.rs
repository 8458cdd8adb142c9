// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Harness Logging and Console
//!
//! Two output streams share one console:
//!
//! - the test report (`PASS:`/`FAIL:` lines), written by
//!   [`crate::kernel::tests::runner::Reporter`]
//! - diagnostics, emitted through the `log` facade and formatted here
//!
//! # Features
//!
//! - **Log levels**: Trace, Debug, Info, Warning, Error
//! - **ANSI colors**: optional, per level
//! - **Console sink**: PL011 on hardware, stdout on the host
//!
//! # Usage
//!
//! ```rust,ignore
//! static LOGGER: ConsoleLogger = ConsoleLogger::new(&UART_CONSOLE);
//! LOGGER.install(log::LevelFilter::Info, true);
//! log::info!("ITS at {:#x}", its_base);
//! ```

use core::fmt::{self, Write};
use core::sync::atomic::{AtomicBool, Ordering};
use log::{Level, LevelFilter, Log, Metadata, Record};

/// Byte sink for human-readable output
pub trait Console: Sync {
    fn write_str(&self, s: &str);
}

/// `fmt::Write` adapter over a [`Console`]
pub struct ConsoleWriter<'a>(pub &'a dyn Console);

impl fmt::Write for ConsoleWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.write_str(s);
        Ok(())
    }
}

/// Level name used in the `[LEVEL]` prefix
pub fn level_str(level: Level) -> &'static str {
    match level {
        Level::Trace => "TRACE",
        Level::Debug => "DEBUG",
        Level::Info => "INFO",
        Level::Warn => "WARN",
        Level::Error => "ERROR",
    }
}

/// ANSI color for a level
pub fn level_color(level: Level) -> &'static str {
    match level {
        Level::Trace => "\x1b[36m", // Cyan
        Level::Debug => "\x1b[34m", // Blue
        Level::Info => "\x1b[32m",  // Green
        Level::Warn => "\x1b[33m",  // Yellow
        Level::Error => "\x1b[31m", // Red
    }
}

const ANSI_RESET: &str = "\x1b[0m";

/// `log` backend writing `[LEVEL] message` lines to a console
pub struct ConsoleLogger {
    console: &'static dyn Console,
    use_colors: AtomicBool,
    lock: spin::Mutex<()>,
}

impl ConsoleLogger {
    pub const fn new(console: &'static dyn Console) -> Self {
        Self {
            console,
            use_colors: AtomicBool::new(true),
            lock: spin::Mutex::new(()),
        }
    }

    /// Register as the global logger
    ///
    /// A second call only updates the level and color settings.
    pub fn install(&'static self, level: LevelFilter, colors: bool) {
        self.use_colors.store(colors, Ordering::Relaxed);
        let _ = log::set_logger(self);
        log::set_max_level(level);
    }
}

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        // Keep lines from different CPUs from interleaving
        let _guard = self.lock.lock();
        let mut out = ConsoleWriter(self.console);
        let level = record.level();
        let _ = if self.use_colors.load(Ordering::Relaxed) {
            writeln!(out, "{}[{}]{} {}", level_color(level), level_str(level), ANSI_RESET, record.args())
        } else {
            writeln!(out, "[{}] {}", level_str(level), record.args())
        };
    }

    fn flush(&self) {}
}

/// Parse a level name as accepted on the command line
pub fn parse_level(name: &str) -> Option<LevelFilter> {
    match name {
        "off" => Some(LevelFilter::Off),
        "error" => Some(LevelFilter::Error),
        "warn" => Some(LevelFilter::Warn),
        "info" => Some(LevelFilter::Info),
        "debug" => Some(LevelFilter::Debug),
        "trace" => Some(LevelFilter::Trace),
        _ => None,
    }
}

/// Console that keeps everything written to it (host only)
#[cfg(not(target_os = "none"))]
#[derive(Default)]
pub struct CaptureConsole {
    buf: spin::Mutex<String>,
}

#[cfg(not(target_os = "none"))]
impl CaptureConsole {
    pub const fn new() -> Self {
        Self {
            buf: spin::Mutex::new(String::new()),
        }
    }

    pub fn contents(&self) -> String {
        self.buf.lock().clone()
    }

    /// All lines starting with `prefix`
    pub fn lines_with(&self, prefix: &str) -> Vec<String> {
        self.buf
            .lock()
            .lines()
            .filter(|l| l.starts_with(prefix))
            .map(String::from)
            .collect()
    }
}

#[cfg(not(target_os = "none"))]
impl Console for CaptureConsole {
    fn write_str(&self, s: &str) {
        self.buf.lock().push_str(s);
    }
}

/// Console writing to the process stdout (host only)
#[cfg(not(target_os = "none"))]
pub struct StdoutConsole;

#[cfg(not(target_os = "none"))]
impl Console for StdoutConsole {
    fn write_str(&self, s: &str) {
        use std::io::Write as _;
        let _ = std::io::stdout().write_all(s.as_bytes());
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug"), Some(LevelFilter::Debug));
        assert_eq!(parse_level("off"), Some(LevelFilter::Off));
        assert_eq!(parse_level("loud"), None);
    }

    #[test]
    fn test_capture_console() {
        let console = CaptureConsole::new();
        let mut w = ConsoleWriter(&console);
        writeln!(w, "PASS: a").unwrap();
        writeln!(w, "INFO: b").unwrap();
        writeln!(w, "PASS: c").unwrap();
        assert_eq!(console.lines_with("PASS:"), vec!["PASS: a", "PASS: c"]);
        assert!(console.contents().contains("INFO: b"));
    }

    #[test]
    fn test_level_names() {
        assert_eq!(level_str(Level::Warn), "WARN");
        assert_eq!(level_color(Level::Error), "\x1b[31m");
    }
}
