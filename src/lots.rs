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

//! Acquisition Lots
//!
//! The per-asset ledger of open acquisition lots, and the matching
//! strategies that decide which lot a disposal consumes first. FIFO,
//! LIFO and HIFO keep one lot per acquisition and split lots on
//! partial consumption; average-cost folds every acquisition into a
//! single synthetic lot whose unit cost is the running weighted
//! average.
//!

use crate::ledger::EventId;
use crate::price::PriceFidelity;
use crate::timemap::TimeMap;
use crate::units::{Amount, Asset, Price, UtcTime};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which open lot a disposal consumes first
#[derive(Copy, Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchingStrategy {
    /// Oldest acquisition first
    Fifo,
    /// Newest acquisition first
    Lifo,
    /// Highest unit cost basis first
    Hifo,
    /// One synthetic lot at the running weighted-average cost
    AverageCost,
}

impl fmt::Display for MatchingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            MatchingStrategy::Fifo => f.write_str("FIFO"),
            MatchingStrategy::Lifo => f.write_str("LIFO"),
            MatchingStrategy::Hifo => f.write_str("HIFO"),
            MatchingStrategy::AverageCost => f.write_str("AVERAGE_COST"),
        }
    }
}

/// Newtype for unique lot IDs
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct LotId(String);

impl LotId {
    /// The id of the lot opened by an acquisition event
    pub fn from_event(id: &EventId) -> LotId {
        LotId(format!("lot-{id}"))
    }

    /// The id of a zero-basis lot synthesized for a shortfall
    pub fn zero_basis(id: &EventId) -> LotId {
        LotId(format!("lot-zero-{id}"))
    }

    /// The id of the synthetic average-cost lot for an asset
    pub fn average(asset: &Asset) -> LotId {
        LotId(format!("lot-avg-{asset}"))
    }
}

impl fmt::Display for LotId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl crate::csv::PrintCsv for LotId {
    fn print(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.as_str().print(f)
    }
}

/// An open tax lot
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct AcquisitionLot {
    id: LotId,
    asset: Asset,
    /// Invariant: strictly positive; a fully consumed lot is removed
    quantity_remaining: Amount,
    /// Cost per unit in the reporting currency
    unit_cost_basis: Price,
    acquired_at: UtcTime,
    /// Fidelity of the price that set the basis
    basis_fidelity: PriceFidelity,
}

impl AcquisitionLot {
    pub fn new(
        id: LotId,
        asset: Asset,
        quantity: Amount,
        unit_cost_basis: Price,
        acquired_at: UtcTime,
        basis_fidelity: PriceFidelity,
    ) -> Self {
        assert!(quantity.is_positive(), "lot quantity must be positive");
        AcquisitionLot {
            id,
            asset,
            quantity_remaining: quantity,
            unit_cost_basis,
            acquired_at,
            basis_fidelity,
        }
    }

    pub fn id(&self) -> &LotId {
        &self.id
    }
    pub fn asset(&self) -> &Asset {
        &self.asset
    }
    pub fn quantity_remaining(&self) -> Amount {
        self.quantity_remaining
    }
    pub fn unit_cost_basis(&self) -> Price {
        self.unit_cost_basis
    }
    pub fn acquired_at(&self) -> UtcTime {
        self.acquired_at
    }
    pub fn basis_fidelity(&self) -> PriceFidelity {
        self.basis_fidelity
    }

    /// Total cost basis of what remains in the lot
    pub fn cost_remaining(&self) -> Price {
        self.unit_cost_basis * self.quantity_remaining
    }
}

impl fmt::Display for AcquisitionLot {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}: {} {} at {} acquired {}",
            self.id, self.quantity_remaining, self.asset, self.unit_cost_basis, self.acquired_at,
        )
    }
}

/// A slice of one lot consumed by a disposal
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Consumed {
    pub lot_id: LotId,
    /// Positive quantity taken from the lot
    pub quantity: Amount,
    pub unit_cost_basis: Price,
    pub acquired_at: UtcTime,
    pub basis_fidelity: PriceFidelity,
}

impl Consumed {
    /// Total cost basis of the consumed slice
    pub fn cost_basis(&self) -> Price {
        self.unit_cost_basis * self.quantity
    }
}

/// The outcome of disposing some quantity against the ledger
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Disposal {
    /// Lot slices consumed, in strategy order
    pub consumed: Vec<Consumed>,
    /// Quantity that no open lot could cover; zero when fully covered
    pub shortfall: Amount,
}

/// The open lots of a single asset, ordered for one matching strategy
///
/// Lots live in a [TimeMap] keyed by acquisition time, so FIFO is
/// `pop_first`, LIFO is `pop_last` and HIFO scans for the maximum unit
/// cost. Average-cost keeps at most one entry, re-merged on every
/// acquisition.
pub struct LotLedger {
    asset: Asset,
    strategy: MatchingStrategy,
    lots: TimeMap<AcquisitionLot>,
}

impl LotLedger {
    /// Constructs an empty ledger for one asset
    pub fn new(asset: Asset, strategy: MatchingStrategy) -> Self {
        LotLedger {
            asset,
            strategy,
            lots: TimeMap::new(),
        }
    }

    pub fn asset(&self) -> &Asset {
        &self.asset
    }

    /// Total quantity held across all open lots
    pub fn total_quantity(&self) -> Amount {
        self.lots
            .values()
            .map(AcquisitionLot::quantity_remaining)
            .sum()
    }

    /// Total cost basis of all open lots
    pub fn total_cost(&self) -> Price {
        self.lots.values().map(AcquisitionLot::cost_remaining).sum()
    }

    /// Number of open lots
    pub fn n_lots(&self) -> usize {
        self.lots.len()
    }

    /// The open lots in acquisition-time order
    pub fn open_lots(&self) -> impl Iterator<Item = &AcquisitionLot> {
        self.lots.values()
    }

    /// Records an acquisition, opening a lot (or re-averaging, under
    /// average-cost)
    pub fn acquire(&mut self, lot: AcquisitionLot) {
        debug_assert_eq!(lot.asset, self.asset);
        debug!("open {}", lot);
        match self.strategy {
            MatchingStrategy::AverageCost => {
                let merged = match self.lots.pop_first() {
                    Some((_, held)) => held.merge_average(lot),
                    None => AcquisitionLot {
                        id: LotId::average(&self.asset),
                        ..lot
                    },
                };
                self.lots.insert(merged.acquired_at, merged);
            }
            _ => {
                self.lots.insert(lot.acquired_at, lot);
            }
        }
    }

    /// Consumes quantity from open lots in strategy order
    ///
    /// `quantity` must be positive. Lots are consumed whole or split;
    /// a split leaves the remainder open with its id, unit cost and
    /// acquisition date unchanged. If the ledger runs dry the unmet
    /// remainder comes back as `shortfall` and the ledger is left
    /// empty; the caller decides what a shortfall means.
    pub fn dispose(&mut self, quantity: Amount) -> Disposal {
        assert!(quantity.is_positive(), "disposal quantity must be positive");
        let mut left = quantity;
        let mut consumed = vec![];

        while left.is_positive() {
            let (key, mut lot) = match self.pop_next() {
                Some(entry) => entry,
                None => break,
            };
            let take = left.min(lot.quantity_remaining);
            consumed.push(Consumed {
                lot_id: lot.id.clone(),
                quantity: take,
                unit_cost_basis: lot.unit_cost_basis,
                acquired_at: lot.acquired_at,
                basis_fidelity: lot.basis_fidelity,
            });
            left -= take;

            lot.quantity_remaining -= take;
            if lot.quantity_remaining.is_positive() {
                debug!("partial close of {}, taking {}", lot, take);
                self.lots.insert(key, lot);
            } else {
                debug!("full close of {}", lot);
            }
        }

        Disposal {
            consumed,
            shortfall: left,
        }
    }

    fn pop_next(&mut self) -> Option<(UtcTime, AcquisitionLot)> {
        match self.strategy {
            MatchingStrategy::Fifo | MatchingStrategy::AverageCost => self.lots.pop_first(),
            MatchingStrategy::Lifo => self.lots.pop_last(),
            MatchingStrategy::Hifo => self.lots.pop_max(AcquisitionLot::unit_cost_basis),
        }
    }
}

impl AcquisitionLot {
    /// Folds a new acquisition into the synthetic average-cost lot
    ///
    /// The merged unit cost is the quantity-weighted average; the
    /// acquisition date stays the earliest of the two so that the
    /// holding period is never shortened by a later buy.
    fn merge_average(self, incoming: AcquisitionLot) -> AcquisitionLot {
        let quantity = self.quantity_remaining + incoming.quantity_remaining;
        let cost = self.cost_remaining() + incoming.cost_remaining();
        AcquisitionLot {
            id: LotId::average(&self.asset),
            asset: self.asset,
            quantity_remaining: quantity,
            unit_cost_basis: cost / quantity,
            acquired_at: self.acquired_at.min(incoming.acquired_at),
            basis_fidelity: self.basis_fidelity.worst(incoming.basis_fidelity),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amt;

    fn t(s: &str) -> UtcTime {
        s.parse().unwrap()
    }

    fn lot(n: u64, time: &str, quantity: Amount, cost: Price) -> AcquisitionLot {
        AcquisitionLot::new(
            LotId(format!("lot-test-{n}")),
            Asset::new("BTC"),
            quantity,
            cost,
            t(time),
            PriceFidelity::Exact,
        )
    }

    fn seeded(strategy: MatchingStrategy) -> LotLedger {
        let mut ledger = LotLedger::new(Asset::new("BTC"), strategy);
        ledger.acquire(lot(1, "2021-01-01T00:00:00Z", amt!(1.0), price!(10000)));
        ledger.acquire(lot(2, "2021-01-02T00:00:00Z", amt!(1.0), price!(20000)));
        ledger
    }

    #[test]
    fn fifo_consumes_oldest_first() {
        let mut ledger = seeded(MatchingStrategy::Fifo);
        let disposal = ledger.dispose(amt!(1.5));
        assert!(disposal.shortfall.is_zero());
        assert_eq!(disposal.consumed.len(), 2);
        assert_eq!(disposal.consumed[0].quantity, amt!(1.0));
        assert_eq!(disposal.consumed[0].unit_cost_basis, price!(10000));
        assert_eq!(disposal.consumed[1].quantity, amt!(0.5));
        assert_eq!(disposal.consumed[1].unit_cost_basis, price!(20000));
        // half of lot 2 stays open
        assert_eq!(ledger.total_quantity(), amt!(0.5));
        assert_eq!(ledger.total_cost(), price!(10000));
    }

    #[test]
    fn lifo_consumes_newest_first() {
        let mut ledger = seeded(MatchingStrategy::Lifo);
        let disposal = ledger.dispose(amt!(1.5));
        assert!(disposal.shortfall.is_zero());
        assert_eq!(disposal.consumed[0].quantity, amt!(1.0));
        assert_eq!(disposal.consumed[0].unit_cost_basis, price!(20000));
        assert_eq!(disposal.consumed[1].quantity, amt!(0.5));
        assert_eq!(disposal.consumed[1].unit_cost_basis, price!(10000));
    }

    #[test]
    fn hifo_consumes_highest_cost_first() {
        let mut ledger = LotLedger::new(Asset::new("BTC"), MatchingStrategy::Hifo);
        ledger.acquire(lot(1, "2021-01-01T00:00:00Z", amt!(1.0), price!(15000)));
        ledger.acquire(lot(2, "2021-01-02T00:00:00Z", amt!(1.0), price!(30000)));
        ledger.acquire(lot(3, "2021-01-03T00:00:00Z", amt!(1.0), price!(5000)));
        let disposal = ledger.dispose(amt!(2.0));
        assert_eq!(disposal.consumed[0].unit_cost_basis, price!(30000));
        assert_eq!(disposal.consumed[1].unit_cost_basis, price!(15000));
        assert_eq!(ledger.total_cost(), price!(5000));
    }

    #[test]
    fn average_cost_keeps_one_lot() {
        let mut ledger = seeded(MatchingStrategy::AverageCost);
        assert_eq!(ledger.n_lots(), 1);
        let held = ledger.open_lots().next().unwrap();
        assert_eq!(held.unit_cost_basis(), price!(15000));
        assert_eq!(held.acquired_at(), t("2021-01-01T00:00:00Z"));

        let disposal = ledger.dispose(amt!(1.5));
        assert_eq!(disposal.consumed.len(), 1);
        assert_eq!(disposal.consumed[0].quantity, amt!(1.5));
        assert_eq!(disposal.consumed[0].unit_cost_basis, price!(15000));
        assert_eq!(ledger.total_quantity(), amt!(0.5));
    }

    #[test]
    fn partial_split_preserves_id_and_date() {
        let mut ledger = seeded(MatchingStrategy::Fifo);
        let first = ledger.dispose(amt!(0.25));
        let second = ledger.dispose(amt!(0.25));
        assert_eq!(first.consumed[0].lot_id, second.consumed[0].lot_id);
        assert_eq!(first.consumed[0].acquired_at, second.consumed[0].acquired_at);
        assert_eq!(ledger.total_quantity(), amt!(1.5));
    }

    #[test]
    fn shortfall_reports_unmet_quantity() {
        let mut ledger = seeded(MatchingStrategy::Fifo);
        let disposal = ledger.dispose(amt!(3.0));
        assert_eq!(disposal.shortfall, amt!(1.0));
        assert_eq!(disposal.consumed.len(), 2);
        assert!(ledger.total_quantity().is_zero());
    }

    #[test]
    fn lot_snapshot_round_trips_at_full_precision() {
        let lot = AcquisitionLot::new(
            LotId("lot-test-roundtrip".into()),
            Asset::new("BTC"),
            amt!("0.123456789012345678"),
            price!("29999.000000000000000001"),
            t("2021-01-01T00:00:00Z"),
            PriceFidelity::PriorDay { days: 2 },
        );
        let json = serde_json::to_string(&lot).unwrap();
        let back: AcquisitionLot = serde_json::from_str(&json).unwrap();
        assert_eq!(lot, back);
        assert_eq!(back.cost_remaining(), lot.cost_remaining());
    }

    #[test]
    fn conservation_of_quantity() {
        let mut ledger = seeded(MatchingStrategy::Hifo);
        let before = ledger.total_quantity();
        let disposal = ledger.dispose(amt!(1.2));
        let consumed: Amount = disposal.consumed.iter().map(|c| c.quantity).sum();
        assert_eq!(before, consumed + ledger.total_quantity());
    }
}
