// Basis Tracker
// Written in 2025 by
//   the Basis Tracker developers
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.
//
// You should have received a copy of the CC0 Public Domain Dedication
// along with this software.
// If not, see <http://creativecommons.org/publicdomain/zero/1.0/>.
//

//! Logging
//!
//! Log infrastructure. This uses the traits and macros from the log 0.4 crate.
//!
//! Will write INFO and more urgent messages to stdout; will also log everything
//! DEBUG and up to a debug log (with more precise timestamp/severity
//! information).
//!
//! Any errors related to writing are simply dropped and the messages won't be
//! logged. Errors related to initially opening the files should kill the program.
//!

use crate::units::UtcTime;
use std::fs::File;
use std::io::Write;
use std::sync::Mutex;

/// Internal marker structure used to indicate that we only log to stdout
struct StdoutOnly;

impl log::Log for StdoutOnly {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::Level::Info
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            println!("{}", record.args());
        }
    }

    fn flush(&self) {}
}

/// Actual logging structure
pub struct Logger {
    /// Log for general output
    ///
    /// Info and greater logs will also be put to stdout
    debug_log: Mutex<File>,
}

impl Logger {
    /// Initialize a global logger
    pub fn init(debug_log: &str) -> Result<(), anyhow::Error> {
        log::set_max_level(log::LevelFilter::Debug);
        log::set_boxed_logger(Box::new(Logger {
            debug_log: Mutex::new(File::create(debug_log)?),
        }))
        .map_err(From::from)
    }

    /// Initialize a global logger (without the debug file)
    pub fn init_stdout_only() -> Result<(), log::SetLoggerError> {
        log::set_max_level(log::LevelFilter::Info);
        log::set_logger(&StdoutOnly)
    }
}

impl log::Log for Logger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::Level::Debug
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            // If it's more important than info, log to stdout
            if record.level() <= log::Level::Info {
                println!("{}", record.args());
            }
            // Regardless, log to debug log with more precise timestamp and log level
            let now = UtcTime::now();
            let _ = write!(
                self.debug_log.lock().unwrap(),
                "{} [{}] {}\n",
                now.format("%Y-%m-%d %H:%M:%S%.6f"),
                record.level(),
                record.args(),
            );
        }
    }

    fn flush(&self) {
        let _ = self.debug_log.lock().unwrap().flush();
    }
}
