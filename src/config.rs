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

//! Configuration
//!
//! Run configuration, read from a JSON file. Unknown fields are
//! rejected so that a typo'd option fails loudly instead of silently
//! taking a default. The insufficient-lots policy in particular has no
//! default at all: the user must say what a shortfall means.
//!

use crate::engine::InsufficientLotsPolicy;
use crate::ledger::TransferTolerance;
use crate::lots::MatchingStrategy;
use crate::price::FallbackStep;
use crate::units::{Asset, UtcTime};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::{fmt, fs, io};

/// Which disposals a report covers
#[derive(Copy, Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ReportingPeriod {
    /// One calendar year, UTC
    Year(i32),
    /// A half-open range `[from, until)`
    Range { from: UtcTime, until: UtcTime },
}

impl ReportingPeriod {
    /// Whether a disposal timestamp falls inside the period
    pub fn contains(&self, at: UtcTime) -> bool {
        match *self {
            ReportingPeriod::Year(y) => at.year() == y,
            ReportingPeriod::Range { from, until } => from <= at && at < until,
        }
    }
}

impl fmt::Display for ReportingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ReportingPeriod::Year(y) => write!(f, "{}", y),
            ReportingPeriod::Range { from, until } => write!(f, "{}..{}", from, until),
        }
    }
}

/// Structure of the config file
///
/// Every option that changes the output is in here, so that the config
/// hash recorded next to a report pins down the whole run.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    /// Which open lot a disposal consumes first
    pub matching_strategy: MatchingStrategy,
    /// The fiat currency all values are reported in
    pub reporting_currency: Asset,
    /// What a disposal exceeding open lots means; deliberately has no
    /// default
    pub insufficient_lots_policy: InsufficientLotsPolicy,
    /// Tolerances for pairing up self-transfers
    #[serde(default)]
    pub transfer_tolerance: TransferTolerance,
    /// What to try, in order, when an exact price lookup fails
    #[serde(default)]
    pub price_fallback: Vec<FallbackStep>,
    /// Restricts the report to disposals in this period; all of them
    /// if absent
    #[serde(default)]
    pub reporting_period: Option<ReportingPeriod>,
    /// Directory of historic price data; an empty store if absent
    #[serde(default)]
    pub price_data_dir: Option<PathBuf>,
}

impl Configuration {
    /// Reads the configuration from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let input = io::BufReader::new(
            fs::File::open(path)
                .with_context(|| format!("opening config file {}", path.display()))?,
        );
        serde_json::from_reader(input)
            .with_context(|| format!("parsing config file {}", path.display()))
    }

    /// A hash pinning down every output-affecting option
    ///
    /// Recorded in the report metadata so that two reports can be
    /// compared run-to-run.
    pub fn hash(&self) -> anyhow::Result<String> {
        let canonical = serde_json::to_string(self).context("serializing config for hashing")?;
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        Ok(hex::encode(&hasher.finalize()[..16]))
    }
}
