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

//! Command-line Argument Parsing
//!

use crate::units::Asset;
use std::{env, ffi::OsString, fmt, path::PathBuf, process, str::FromStr};

/// Structure representing parsing of command-line options
pub enum Command {
    /// Run the full pipeline and write a report directory
    Report {
        config_file: PathBuf,
        events_files: Vec<PathBuf>,
    },
    /// Normalize and reconcile the events, printing what would be
    /// excluded, without writing a report
    CheckEvents {
        config_file: PathBuf,
        events_files: Vec<PathBuf>,
    },
    /// Read a CSV file of price data, storing it as JSON in the
    /// configured price data directory
    InitializePriceData { config_file: PathBuf, csv: PathBuf },
    /// Return the latest stored price of an asset. Mainly useful as a test.
    LatestPrice { config_file: PathBuf, asset: Asset },
}

/// Master list of supported commands
#[allow(clippy::type_complexity)]
static COMMANDS: &[(&str, &str, fn(&str, env::ArgsOs) -> Command)] = &[
    (
        "report",
        "<config file> <events file> [<events file>...]",
        report,
    ),
    (
        "check-events",
        "<config file> <events file> [<events file>...]",
        check_events,
    ),
    (
        "initialize-price-data",
        "<config file> <csv filename>",
        initialize_price_data,
    ),
    ("latest-price", "<config file> <asset>", latest_price),
];

/// Parse the "report" command
fn report(invocation: &str, args: env::ArgsOs) -> Command {
    let (config_file, events_files) = config_and_events(invocation, args);
    Command::Report {
        config_file,
        events_files,
    }
}

/// Parse the "check-events" command
fn check_events(invocation: &str, args: env::ArgsOs) -> Command {
    let (config_file, events_files) = config_and_events(invocation, args);
    Command::CheckEvents {
        config_file,
        events_files,
    }
}

/// Helper for the two commands taking a config plus event files
fn config_and_events(invocation: &str, mut args: env::ArgsOs) -> (PathBuf, Vec<PathBuf>) {
    let config_file = match args.next() {
        Some(x) => x.into(),
        None => {
            eprintln!("Missing configuration filename");
            usage(invocation);
        }
    };
    let events_files: Vec<PathBuf> = args.map(From::from).collect();
    if events_files.is_empty() {
        eprintln!("Missing events filename");
        usage(invocation);
    }
    (config_file, events_files)
}

/// Parse the "initialize-price-data" command
fn initialize_price_data(invocation: &str, mut args: env::ArgsOs) -> Command {
    let config_file = match args.next() {
        Some(x) => x.into(),
        None => {
            eprintln!("Missing configuration filename");
            usage(invocation);
        }
    };
    match args.next() {
        Some(x) => Command::InitializePriceData {
            config_file,
            csv: x.into(),
        },
        None => {
            eprintln!("Missing CSV filename");
            usage(invocation)
        }
    }
}

/// Parse the "latest-price" command
fn latest_price(invocation: &str, mut args: env::ArgsOs) -> Command {
    let config_file = match args.next() {
        Some(x) => x.into(),
        None => {
            eprintln!("Missing configuration filename");
            usage(invocation);
        }
    };
    Command::LatestPrice {
        config_file,
        asset: parse_os_string_required(args.next(), "asset", invocation),
    }
}

impl Command {
    /// Parse the command-line arguments
    ///
    /// If this fails, it will output a usage text to stderr and then
    /// terminate the process. It should not be called once the program
    /// is "really" running.
    pub fn from_args() -> Self {
        let mut args = env::args_os();
        // Obtain name we were called with
        let invocation = match args.next().map(OsString::into_string) {
            Some(Ok(inv)) => inv,
            Some(Err(_)) => "non-utf8-command-name".into(),
            None => panic!("called with no arguments, not even a command-line name"),
        };

        // Obtain primary command
        match args.next().map(OsString::into_string) {
            Some(Ok(inv)) => {
                for (cmd, _, f) in COMMANDS {
                    if inv == *cmd {
                        return f(&invocation, args);
                    }
                }
                eprintln!("Unknown command {inv}");
                usage(&invocation);
            }
            Some(Err(inv)) => {
                eprintln!("Unknown non-UTF8 command {}", inv.to_string_lossy());
                usage(&invocation);
            }
            None => usage(&invocation),
        }
    }

    /// The name to prefix log files with
    pub fn log_name(&self) -> &'static str {
        match *self {
            Command::Report { .. } => "report",
            Command::CheckEvents { .. } => "check-events",
            Command::InitializePriceData { .. } => "init-price-data",
            Command::LatestPrice { .. } => "latest-price",
        }
    }
}

fn usage(invocation: &str) -> ! {
    eprintln!();
    eprintln!("Usage:");
    for (cmd, help, _) in COMMANDS {
        eprintln!("    {invocation} {cmd} {help}");
    }
    process::exit(1)
}

/// Helper function to parse some string data from an OsString
fn parse_os_string<T>(iter_res: Option<OsString>, desc: &str, invocation: &str) -> Option<T>
where
    T: FromStr,
    <T as FromStr>::Err: fmt::Display,
{
    iter_res.map(|oss| match oss.into_string() {
        Ok(s) => match T::from_str(&s) {
            Ok(obj) => obj,
            Err(e) => {
                eprintln!("Unable to parse {desc}: {e}");
                usage(invocation);
            }
        },
        Err(s) => {
            eprintln!("Unable to non-UTF8 {desc} {}", s.to_string_lossy());
            usage(invocation);
        }
    })
}

/// Helper function to parse some string data from an OsString
fn parse_os_string_required<T>(iter_res: Option<OsString>, desc: &str, invocation: &str) -> T
where
    T: FromStr,
    <T as FromStr>::Err: fmt::Display,
{
    match parse_os_string(iter_res, desc, invocation) {
        Some(x) => x,
        None => {
            eprintln!("Missing required {desc}.");
            usage(invocation);
        }
    }
}
