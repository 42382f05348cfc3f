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

//! Assets
//!
//! Asset identifiers. The engine is generic over assets; an asset is
//! whatever ticker string the normalized event stream uses, compared
//! case-sensitively. The reporting currency is itself an [Asset].
//!

use serde::{Deserialize, Serialize};
use std::{fmt, str};

/// An asset identifier, e.g. "BTC" or "USD"
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Asset(String);

impl Asset {
    /// Constructs an asset from a ticker string
    pub fn new<S: Into<String>>(ticker: S) -> Self {
        Asset(ticker.into())
    }

    /// Accessor for the ticker string
    pub fn ticker(&self) -> &str {
        &self.0
    }

    /// Whether the ticker is empty, which no valid event should have
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl str::FromStr for Asset {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Asset(s.into()))
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl crate::csv::PrintCsv for Asset {
    fn print(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.as_str().print(f)
    }
}
