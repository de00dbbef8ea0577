//! Stderr logger for the `log` facade.
//!
//! Diagnostics go to stderr so they never mix with the menu on stdout.

use std::io::Write;

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

use crate::config::Verbosity;

pub struct StderrLogger;

impl StderrLogger {
    /// Install the logger. Call once at startup; the level can be changed
    /// later with [`log::set_max_level`].
    pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        static LOGGER: StderrLogger = StderrLogger;
        log::set_logger(&LOGGER)?;
        log::set_max_level(level);
        Ok(())
    }
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut err = std::io::stderr().lock();
        // Format: "[LEVEL] target: message"
        let _ = writeln!(err, "{}", format_record(record));
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

fn format_record(record: &Record) -> String {
    format!("[{}] {}: {}", record.level(), record.target(), record.args())
}

/// Level for a `-v` count, falling back to the configured verbosity when
/// no flag was given.
pub fn level_for(verbose: u8, configured: Verbosity) -> LevelFilter {
    match verbose {
        0 => match configured {
            Verbosity::Quiet => LevelFilter::Error,
            Verbosity::Normal => LevelFilter::Warn,
            Verbosity::Verbose => LevelFilter::Info,
            Verbosity::Debug => LevelFilter::Debug,
        },
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Level;

    #[test]
    fn flag_count_overrides_config() {
        assert_eq!(level_for(0, Verbosity::Quiet), LevelFilter::Error);
        assert_eq!(level_for(0, Verbosity::Normal), LevelFilter::Warn);
        assert_eq!(level_for(1, Verbosity::Quiet), LevelFilter::Info);
        assert_eq!(level_for(2, Verbosity::Normal), LevelFilter::Debug);
        assert_eq!(level_for(5, Verbosity::Normal), LevelFilter::Trace);
    }

    #[test]
    fn record_format_has_level_and_target() {
        let line = format_record(
            &Record::builder()
                .args(format_args!("opened {}", "0x1000"))
                .level(Level::Info)
                .target("diagmenu::diag::pci")
                .build(),
        );
        assert_eq!(line, "[INFO] diagmenu::diag::pci: opened 0x1000");
    }
}
