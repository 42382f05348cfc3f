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

//! Price Data
//!
//! The price-resolver boundary, a file-backed historic price store
//! that implements it, and the valuation adapter which applies the
//! configured fallback chain and memoizes lookups per (asset, day).
//!
//! The engine never fabricates a price: every resolved value carries a
//! [PriceFidelity] saying whether it was exact or which fallback
//! produced it, and that fidelity is visible in the output.
//!

use crate::timemap::TimeMap;
use crate::units::{Asset, Price, UtcTime};
use anyhow::Context;
use chrono::{Duration, NaiveDate};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::{fmt, fs, io, path::Path, path::PathBuf};

/// Why a price lookup did not resolve
#[derive(Copy, Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    /// The resolver has no data at or before the requested time
    NoData,
    /// The resolver is temporarily refusing lookups
    RateLimited,
    /// The resolver cannot quote this asset in this currency
    UnsupportedPair,
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            UnavailableReason::NoData => f.write_str("no data"),
            UnavailableReason::RateLimited => f.write_str("rate limited"),
            UnavailableReason::UnsupportedPair => f.write_str("unsupported pair"),
        }
    }
}

/// The outcome of one resolver call
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum PriceResult {
    Price(Price),
    Unavailable(UnavailableReason),
}

/// External price lookup boundary
///
/// Lookups are treated as pure: repeated calls with the same key must
/// be idempotent, which is what makes the per-(asset, day) cache in
/// [Valuation] sound. A resolver must never block indefinitely; if its
/// backend times out it reports `Unavailable` instead.
pub trait PriceResolver {
    fn price_of(&self, asset: &Asset, at: UtcTime, currency: &Asset) -> PriceResult;
}

/// How a price made it into the output
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceFidelity {
    /// Straight from the resolver at the requested time
    Exact,
    /// Nearest prior day fallback, this many days back
    PriorDay { days: i64 },
    /// The configured stand-in price
    StandIn,
}

impl PriceFidelity {
    /// The worse of two fidelities; `Exact` < `PriorDay` < `StandIn`
    pub fn worst(self, other: PriceFidelity) -> PriceFidelity {
        std::cmp::max(self, other)
    }

    /// Whether any fallback was involved
    pub fn is_exact(&self) -> bool {
        *self == PriceFidelity::Exact
    }
}

impl fmt::Display for PriceFidelity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            PriceFidelity::Exact => f.write_str("exact"),
            PriceFidelity::PriorDay { days } => write!(f, "prior-day-{days}"),
            PriceFidelity::StandIn => f.write_str("stand-in"),
        }
    }
}

impl crate::csv::PrintCsv for PriceFidelity {
    fn print(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// One step of the configured fallback chain
#[derive(Copy, Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FallbackStep {
    /// Retry at earlier days, up to this many days back
    NearestPriorDay { max_days: i64 },
    /// Give up and use a fixed price
    StandIn { price: Price },
}

/// A price lookup failed and the fallback chain is exhausted
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PriceUnavailable {
    pub asset: Asset,
    pub at: UtcTime,
    pub reason: UnavailableReason,
}

impl fmt::Display for PriceUnavailable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "no price for {} at {} ({}) and fallback chain exhausted",
            self.asset, self.at, self.reason,
        )
    }
}

impl std::error::Error for PriceUnavailable {}

/// The valuation adapter
///
/// Wraps a [PriceResolver], applies the fallback chain, and memoizes
/// per (asset, calendar day). Constructed per run and discarded with
/// it; never a hidden global.
pub struct Valuation<'r> {
    resolver: &'r dyn PriceResolver,
    currency: Asset,
    fallback: Vec<FallbackStep>,
    cache: HashMap<(Asset, NaiveDate), (Price, PriceFidelity)>,
}

impl<'r> Valuation<'r> {
    /// Constructs a fresh adapter for one run
    pub fn new(resolver: &'r dyn PriceResolver, currency: Asset, fallback: Vec<FallbackStep>) -> Self {
        Valuation {
            resolver,
            currency,
            fallback,
            cache: HashMap::new(),
        }
    }

    /// Accessor for the reporting currency
    pub fn currency(&self) -> &Asset {
        &self.currency
    }

    /// The unit price of an asset in the reporting currency
    ///
    /// The reporting currency itself is always worth exactly 1.
    pub fn value_of(
        &mut self,
        asset: &Asset,
        at: UtcTime,
    ) -> Result<(Price, PriceFidelity), PriceUnavailable> {
        if *asset == self.currency {
            return Ok((price!(1), PriceFidelity::Exact));
        }

        let key = (asset.clone(), at.calendar_day());
        if let Some(&hit) = self.cache.get(&key) {
            return Ok(hit);
        }

        let resolved = self.resolve_uncached(asset, at)?;
        self.cache.insert(key, resolved);
        Ok(resolved)
    }

    fn resolve_uncached(
        &self,
        asset: &Asset,
        at: UtcTime,
    ) -> Result<(Price, PriceFidelity), PriceUnavailable> {
        let mut reason = match self.resolver.price_of(asset, at, &self.currency) {
            PriceResult::Price(p) => {
                debug!("price of {} at {}: {} (exact)", asset, at, p);
                return Ok((p, PriceFidelity::Exact));
            }
            PriceResult::Unavailable(r) => r,
        };

        for step in &self.fallback {
            match *step {
                FallbackStep::NearestPriorDay { max_days } => {
                    for days in 1..=max_days {
                        let earlier = at - Duration::days(days);
                        match self.resolver.price_of(asset, earlier, &self.currency) {
                            PriceResult::Price(p) => {
                                warn!(
                                    "price of {} at {} unavailable; using {} from {} days prior",
                                    asset, at, p, days,
                                );
                                return Ok((p, PriceFidelity::PriorDay { days }));
                            }
                            PriceResult::Unavailable(r) => reason = r,
                        }
                    }
                }
                FallbackStep::StandIn { price } => {
                    warn!(
                        "price of {} at {} unavailable; using stand-in price {}",
                        asset, at, price,
                    );
                    return Ok((price, PriceFidelity::StandIn));
                }
            }
        }

        Err(PriceUnavailable {
            asset: asset.clone(),
            at,
            reason,
        })
    }
}

/// One recorded price point
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct PricePoint {
    pub asset: Asset,
    /// Timestamp the price was recorded at, in UNIX seconds
    pub timestamp: i64,
    pub price: Price,
}

impl PricePoint {
    /// Parses a price point from a CSV line `unix_ts,asset,price`
    pub fn from_csv(data: &str) -> anyhow::Result<PricePoint> {
        let mut data = data.split(',');

        let timestamp = match data.next() {
            Some(ts) => i64::from_str(ts).context("parsing CSV timestamp")?,
            None => return Err(anyhow::Error::msg("CSV line had no timestamp")),
        };
        let asset = match data.next() {
            Some(asset) if !asset.is_empty() => Asset::new(asset),
            _ => return Err(anyhow::Error::msg("CSV line had no asset")),
        };
        let price = match data.next() {
            Some(price) => Price::from_str(price).context("parsing CSV price")?,
            None => return Err(anyhow::Error::msg("CSV line had no price")),
        };
        if data.next().is_some() {
            return Err(anyhow::Error::msg("CSV line had extra data"));
        }

        Ok(PricePoint {
            asset,
            timestamp,
            price,
        })
    }
}

impl fmt::Display for PricePoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} @ {}", self.asset, self.price, self.timestamp)
    }
}

/// Historic price data, one time series per asset
///
/// All prices are in a single quote currency, fixed at construction.
/// This is the bundled offline [PriceResolver]: it is fed from files
/// by the user, it fetches nothing.
pub struct Historic {
    currency: Asset,
    data: HashMap<Asset, TimeMap<Price>>,
}

impl Historic {
    /// Constructs an empty store quoting in the given currency
    pub fn new(currency: Asset) -> Self {
        Historic {
            currency,
            data: HashMap::new(),
        }
    }

    /// Records a price
    pub fn record(&mut self, point: PricePoint) -> anyhow::Result<()> {
        let at = UtcTime::from_unix_i64(point.timestamp)
            .with_context(|| format!("timestamp of price point {point}"))?;
        self.data
            .entry(point.asset)
            .or_insert_with(TimeMap::new)
            .insert(at, point.price);
        Ok(())
    }

    /// Number of price entries recorded across all assets
    pub fn len(&self) -> usize {
        self.data.values().map(TimeMap::len).sum()
    }

    /// Whether the store has no entries at all
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The most recent price for an asset strictly before the given time
    pub fn price_at(&self, asset: &Asset, time: UtcTime) -> Option<(UtcTime, Price)> {
        self.data
            .get(asset)
            .and_then(|series| series.most_recent(time))
            .map(|(t, p)| (t, *p))
    }

    /// Reads a bunch of price records from CSV data
    pub fn read_csv<R: io::Read>(&mut self, data: R) -> anyhow::Result<()> {
        use io::BufRead;
        for (lineno, entry) in io::BufReader::new(data).lines().enumerate() {
            let entry = entry.with_context(|| format!("reading line {}", lineno))?;
            if entry.is_empty() {
                continue;
            }
            let point = PricePoint::from_csv(&entry)
                .with_context(|| format!("decoding price \"{}\" at line {}", entry, lineno))?;
            self.record(point)?;

            if lineno % 1_000_000 == 0 && lineno > 0 {
                info!("Read {}M lines, recorded {} datapoints.", lineno / 1_000_000, self.len());
            }
        }
        Ok(())
    }

    /// Reads all price records from a store directory of JSON files
    pub fn read_json<P: AsRef<Path>>(currency: Asset, datadir: P) -> anyhow::Result<Self> {
        let mut new = Historic::new(currency);
        for file in fs::read_dir(&datadir).context("opening pricedata directory")? {
            let filepath = file.context("getting file path")?.path();
            if filepath.extension().map(|e| e != "json").unwrap_or(true) {
                continue;
            }
            let input = io::BufReader::new(fs::File::open(&filepath).context("opening json file")?);
            let points: Vec<PricePoint> = serde_json::from_reader(input).context("decoding json")?;
            for point in points {
                new.record(point)?;
            }
        }
        Ok(new)
    }

    /// Writes out all price records, one JSON file per asset
    pub fn write_out(&self, datadir: &PathBuf) -> anyhow::Result<()> {
        fs::create_dir_all(datadir).context("creating pricedata directory")?;
        let mut assets: Vec<&Asset> = self.data.keys().collect();
        assets.sort();
        for asset in assets {
            let points: Vec<PricePoint> = self.data[asset]
                .iter()
                .map(|(t, p)| PricePoint {
                    asset: asset.clone(),
                    timestamp: t.unix(),
                    price: *p,
                })
                .collect();
            let mut path = datadir.clone();
            path.push(format!("{}.json", asset));
            serde_json::to_writer(
                io::BufWriter::new(fs::File::create(&path).context("creating json file")?),
                &points,
            )
            .context("writing json")?;
        }
        Ok(())
    }
}

impl PriceResolver for Historic {
    fn price_of(&self, asset: &Asset, at: UtcTime, currency: &Asset) -> PriceResult {
        if *currency != self.currency {
            return PriceResult::Unavailable(UnavailableReason::UnsupportedPair);
        }
        match self.price_at(asset, at) {
            Some((_, price)) => PriceResult::Price(price),
            None => PriceResult::Unavailable(UnavailableReason::NoData),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> UtcTime {
        s.parse().unwrap()
    }

    fn store() -> Historic {
        let mut h = Historic::new(Asset::new("USD"));
        h.record(PricePoint {
            asset: Asset::new("BTC"),
            timestamp: t("2021-01-01T00:00:00Z").unix(),
            price: price!(10000),
        })
        .unwrap();
        h.record(PricePoint {
            asset: Asset::new("BTC"),
            timestamp: t("2021-01-02T00:00:00Z").unix(),
            price: price!(20000),
        })
        .unwrap();
        h
    }

    #[test]
    fn historic_lookup_is_strictly_prior() {
        let h = store();
        let btc = Asset::new("BTC");
        assert_eq!(
            h.price_at(&btc, t("2021-01-01T12:00:00Z")).map(|(_, p)| p),
            Some(price!(10000)),
        );
        assert_eq!(h.price_at(&btc, t("2021-01-01T00:00:00Z")), None);
        assert_eq!(h.price_at(&Asset::new("ETH"), t("2021-06-01T00:00:00Z")), None);
    }

    #[test]
    fn valuation_caches_per_day() {
        let h = store();
        let mut val = Valuation::new(&h, Asset::new("USD"), vec![]);
        let btc = Asset::new("BTC");
        let one = val.value_of(&btc, t("2021-01-01T06:00:00Z")).unwrap();
        // Later the same day: served from cache, same price
        let two = val.value_of(&btc, t("2021-01-01T23:00:00Z")).unwrap();
        assert_eq!(one, two);
        assert_eq!(one.0, price!(10000));
        assert!(one.1.is_exact());
    }

    #[test]
    fn reporting_currency_is_unity() {
        let h = store();
        let mut val = Valuation::new(&h, Asset::new("USD"), vec![]);
        let (p, fid) = val.value_of(&Asset::new("USD"), t("2021-01-01T00:00:00Z")).unwrap();
        assert_eq!(p, price!(1));
        assert!(fid.is_exact());
    }

    #[test]
    fn fallback_chain_walks_prior_days_then_stand_in() {
        let h = store();
        let btc = Asset::new("BTC");
        // An asset with no data at all exhausts the prior-day lookback
        let mut val = Valuation::new(
            &h,
            Asset::new("USD"),
            vec![FallbackStep::NearestPriorDay { max_days: 3 }],
        );
        let eth = Asset::new("ETH");
        assert!(val.value_of(&eth, t("2021-01-05T00:00:00Z")).is_err());

        let mut val = Valuation::new(
            &h,
            Asset::new("USD"),
            vec![
                FallbackStep::NearestPriorDay { max_days: 3 },
                FallbackStep::StandIn { price: price!(0) },
            ],
        );
        let (p, fid) = val.value_of(&eth, t("2021-01-05T00:00:00Z")).unwrap();
        assert_eq!(p, price!(0));
        assert_eq!(fid, PriceFidelity::StandIn);

        // The exact lookup path still works and reports exact
        let (p, fid) = val.value_of(&btc, t("2021-01-03T00:00:00Z")).unwrap();
        assert_eq!(p, price!(20000));
        assert!(fid.is_exact());
    }

    #[test]
    fn wrong_currency_is_unsupported() {
        let h = store();
        match h.price_of(&Asset::new("BTC"), t("2021-01-02T00:00:00Z"), &Asset::new("EUR")) {
            PriceResult::Unavailable(UnavailableReason::UnsupportedPair) => {}
            other => panic!("expected unsupported pair, got {:?}", other),
        }
    }
}
