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

//! Matching Engine
//!
//! Walks the reconciled event stream in total order, maintaining one
//! [LotLedger] per asset, and emits a [TaxableEvent] for every lot
//! slice a disposal consumes. All valuation goes through the
//! [Valuation] adapter; the engine itself never invents a price.
//!
//! The reporting currency is not lot-tracked: legs denominated in it
//! set the value of the other leg and are otherwise skipped.
//!

use crate::ledger::{EventId, EventType, LedgerEvent};
use crate::lots::{AcquisitionLot, Consumed, LotId, LotLedger, MatchingStrategy};
use crate::price::{PriceFidelity, PriceUnavailable, Valuation};
use crate::units::{Amount, Asset, Price, UtcTime};
use chrono::Duration;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Holding periods beyond this are long-term
const LONG_TERM_DAYS: i64 = 365;

/// What to do when a disposal exceeds the open lots of its asset
#[derive(Copy, Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InsufficientLotsPolicy {
    /// Synthesize a zero-basis lot for the unmet quantity and flag the
    /// resulting taxable event
    ZeroCostBasis,
    /// Fail the whole run; no partial output
    Abort,
}

/// Short or long term, by holding period
#[derive(Copy, Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GainTerm {
    Short,
    Long,
}

impl GainTerm {
    /// Classifies a holding period
    pub fn from_dates(acquired_at: UtcTime, disposed_at: UtcTime) -> GainTerm {
        if disposed_at - acquired_at > Duration::days(LONG_TERM_DAYS) {
            GainTerm::Long
        } else {
            GainTerm::Short
        }
    }
}

impl fmt::Display for GainTerm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            GainTerm::Short => f.write_str("short"),
            GainTerm::Long => f.write_str("long"),
        }
    }
}

impl crate::csv::PrintCsv for GainTerm {
    fn print(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// One realized gain or loss: a disposal consuming one lot slice
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct TaxableEvent {
    pub asset: Asset,
    /// Positive quantity disposed from this lot
    pub quantity: Amount,
    /// Total proceeds attributed to this slice, in the reporting currency
    pub proceeds: Price,
    /// Total cost basis of this slice
    pub cost_basis: Price,
    /// `proceeds - cost_basis`; negative is a loss
    pub gain_loss: Price,
    pub acquired_at: UtcTime,
    pub disposed_at: UtcTime,
    pub term: GainTerm,
    pub lot_id: LotId,
    /// The disposal event this slice came from
    pub source_event_id: EventId,
    /// Worst fidelity among the prices behind proceeds and basis
    pub price_fidelity: PriceFidelity,
    /// Set when the basis comes from a synthesized zero-basis lot
    pub zero_basis: bool,
}

impl fmt::Display for TaxableEvent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "dispose {} {} from {}: proceeds {} basis {} gain {} ({})",
            self.quantity,
            self.asset,
            self.lot_id,
            self.proceeds,
            self.cost_basis,
            self.gain_loss,
            self.term,
        )
    }
}

/// A fatal condition that ends the run with no output
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum RunError {
    /// A disposal exceeded open lots under the `Abort` policy
    InsufficientLots {
        asset: Asset,
        event_id: EventId,
        at: UtcTime,
        shortfall: Amount,
    },
    /// A price lookup failed with the fallback chain exhausted
    PriceUnavailable(PriceUnavailable),
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            RunError::InsufficientLots {
                ref asset,
                ref event_id,
                at,
                shortfall,
            } => write!(
                f,
                "disposal {} at {} exceeds open {} lots by {}; aborting with no output",
                event_id, at, asset, shortfall,
            ),
            RunError::PriceUnavailable(ref e) => fmt::Display::fmt(e, f),
        }
    }
}

impl std::error::Error for RunError {}

impl From<PriceUnavailable> for RunError {
    fn from(e: PriceUnavailable) -> RunError {
        RunError::PriceUnavailable(e)
    }
}

/// One leg of an event: a signed quantity of one asset
#[derive(Clone, Debug)]
struct Leg {
    asset: Asset,
    amount: Amount,
}

/// The matching engine
///
/// Single-threaded by design: events must be applied in total order,
/// and lot state after event N is the input to event N+1.
pub struct MatchingEngine<'r> {
    strategy: MatchingStrategy,
    policy: InsufficientLotsPolicy,
    valuation: Valuation<'r>,
    ledgers: BTreeMap<Asset, LotLedger>,
    taxable: Vec<TaxableEvent>,
}

impl<'r> MatchingEngine<'r> {
    pub fn new(
        strategy: MatchingStrategy,
        policy: InsufficientLotsPolicy,
        valuation: Valuation<'r>,
    ) -> Self {
        MatchingEngine {
            strategy,
            policy,
            valuation,
            ledgers: BTreeMap::new(),
            taxable: Vec::new(),
        }
    }

    /// The taxable events emitted so far, in emission order
    pub fn taxable_events(&self) -> &[TaxableEvent] {
        &self.taxable
    }

    /// The per-asset ledgers, in asset order
    pub fn ledgers(&self) -> impl Iterator<Item = &LotLedger> {
        self.ledgers.values()
    }

    /// Current holdings of one asset
    pub fn holding(&self, asset: &Asset) -> Amount {
        self.ledgers
            .get(asset)
            .map(LotLedger::total_quantity)
            .unwrap_or(Amount::ZERO)
    }

    /// Applies a whole stream of events, in the order given
    pub fn apply_all(&mut self, events: &[LedgerEvent]) -> Result<(), RunError> {
        for event in events {
            self.apply(event)?;
        }
        info!(
            "matched {} events into {} taxable events across {} assets",
            events.len(),
            self.taxable.len(),
            self.ledgers.len(),
        );
        Ok(())
    }

    /// Applies one event to the lot state
    ///
    /// For trades the disposal leg is applied before the acquisition
    /// leg, so a sale's lots are consumed before the purchase's lot
    /// opens. In-kind fees are applied last, as a separate
    /// zero-proceeds disposal.
    pub fn apply(&mut self, event: &LedgerEvent) -> Result<(), RunError> {
        debug!("apply {}", event);
        let main = Leg {
            asset: event.asset.clone(),
            amount: event.amount,
        };
        let counter = match (&event.counter_asset, event.counter_amount) {
            (Some(asset), Some(amount)) => Some(Leg {
                asset: asset.clone(),
                amount,
            }),
            _ => None,
        };

        let (disposal, acquisition) = if main.amount.is_negative() {
            (Some(main), counter)
        } else {
            (counter, Some(main))
        };

        // A fee in the reporting currency adjusts the trade value; an
        // in-kind fee is its own disposal afterwards.
        let mut fee_value = Price::ZERO;
        let mut fee_in_kind = None;
        if let (Some(asset), Some(amount)) = (&event.fee_asset, event.fee_amount) {
            if asset == self.valuation.currency() {
                fee_value = Price::from(amount.as_decimal());
            } else if amount.is_nonzero() {
                fee_in_kind = Some(Leg {
                    asset: asset.clone(),
                    amount,
                });
            }
        }

        // Both legs of a trade exchange at a single value, fixed by
        // the reporting-currency leg if there is one.
        let trade_value = match (&disposal, &acquisition) {
            (Some(d), Some(a)) => Some(self.trade_value(event, d, a)?),
            _ => None,
        };

        if let Some(ref leg) = disposal {
            if !self.is_reporting_currency(leg) {
                let gross = match trade_value {
                    Some(v) => v,
                    None => self.solo_value(event, leg)?,
                };
                let proceeds = ProceedsTotal {
                    value: gross.value - fee_value,
                    fidelity: gross.fidelity,
                };
                self.dispose_leg(event, leg, proceeds)?;
                // The fee already reduced proceeds; don't also add it
                // to the acquisition's basis.
                fee_value = Price::ZERO;
            }
        }

        if let Some(ref leg) = acquisition {
            if !self.is_reporting_currency(leg) {
                let gross = match trade_value {
                    Some(v) => v,
                    None => self.solo_value(event, leg)?,
                };
                let basis = ProceedsTotal {
                    value: gross.value + fee_value,
                    fidelity: gross.fidelity,
                };
                self.acquire_leg(event, leg, basis);
            }
        }

        if let Some(ref leg) = fee_in_kind {
            let zero = ProceedsTotal {
                value: Price::ZERO,
                fidelity: PriceFidelity::Exact,
            };
            // Fee amounts are recorded nonnegative; it is a disposal
            let leg = Leg {
                asset: leg.asset.clone(),
                amount: -leg.amount.abs(),
            };
            self.dispose_leg(event, &leg, zero)?;
        }

        Ok(())
    }

    fn is_reporting_currency(&self, leg: &Leg) -> bool {
        leg.asset == *self.valuation.currency()
    }

    /// The reporting-currency value the two legs of a trade exchange at
    ///
    /// If either leg is denominated in the reporting currency that
    /// amount is the value, exactly. Otherwise the acquired leg is
    /// marked to market at the event time.
    fn trade_value(
        &mut self,
        event: &LedgerEvent,
        disposal: &Leg,
        acquisition: &Leg,
    ) -> Result<ProceedsTotal, RunError> {
        for leg in [disposal, acquisition] {
            if leg.asset == *self.valuation.currency() {
                return Ok(ProceedsTotal {
                    value: Price::from(leg.amount.abs().as_decimal()),
                    fidelity: PriceFidelity::Exact,
                });
            }
        }
        let (unit, fidelity) = self.valuation.value_of(&acquisition.asset, event.timestamp)?;
        Ok(ProceedsTotal {
            value: unit * acquisition.amount.abs(),
            fidelity,
        })
    }

    /// The value of a single-leg event
    fn solo_value(&mut self, event: &LedgerEvent, leg: &Leg) -> Result<ProceedsTotal, RunError> {
        if event.event_type == EventType::Loss {
            // Lost funds realize nothing
            return Ok(ProceedsTotal {
                value: Price::ZERO,
                fidelity: PriceFidelity::Exact,
            });
        }
        let (unit, fidelity) = self.valuation.value_of(&leg.asset, event.timestamp)?;
        Ok(ProceedsTotal {
            value: unit * leg.amount.abs(),
            fidelity,
        })
    }

    fn acquire_leg(&mut self, event: &LedgerEvent, leg: &Leg, basis: ProceedsTotal) {
        let quantity = leg.amount.abs();
        let lot = AcquisitionLot::new(
            LotId::from_event(&event.id),
            leg.asset.clone(),
            quantity,
            basis.value / quantity,
            event.timestamp,
            basis.fidelity,
        );
        self.ledger_mut(&leg.asset).acquire(lot);
    }

    fn dispose_leg(
        &mut self,
        event: &LedgerEvent,
        leg: &Leg,
        proceeds: ProceedsTotal,
    ) -> Result<(), RunError> {
        let quantity = leg.amount.abs();
        let unit_proceeds = proceeds.value / quantity;
        let disposal = self.ledger_mut(&leg.asset).dispose(quantity);

        for slice in &disposal.consumed {
            self.push_taxable(event, &leg.asset, slice, unit_proceeds, proceeds.fidelity);
        }

        if disposal.shortfall.is_positive() {
            match self.policy {
                InsufficientLotsPolicy::Abort => {
                    return Err(RunError::InsufficientLots {
                        asset: leg.asset.clone(),
                        event_id: event.id.clone(),
                        at: event.timestamp,
                        shortfall: disposal.shortfall,
                    });
                }
                InsufficientLotsPolicy::ZeroCostBasis => {
                    info!(
                        "disposal {} exceeds open {} lots by {}; using zero cost basis",
                        event.id, leg.asset, disposal.shortfall,
                    );
                    let synthetic = Consumed {
                        lot_id: LotId::zero_basis(&event.id),
                        quantity: disposal.shortfall,
                        unit_cost_basis: Price::ZERO,
                        acquired_at: event.timestamp,
                        basis_fidelity: PriceFidelity::Exact,
                    };
                    let n = self.taxable.len();
                    self.push_taxable(
                        event,
                        &leg.asset,
                        &synthetic,
                        unit_proceeds,
                        proceeds.fidelity,
                    );
                    self.taxable[n].zero_basis = true;
                }
            }
        }
        Ok(())
    }

    fn push_taxable(
        &mut self,
        event: &LedgerEvent,
        asset: &Asset,
        slice: &Consumed,
        unit_proceeds: Price,
        proceeds_fidelity: PriceFidelity,
    ) {
        let proceeds = unit_proceeds * slice.quantity;
        let cost_basis = slice.cost_basis();
        let taxable = TaxableEvent {
            asset: asset.clone(),
            quantity: slice.quantity,
            proceeds,
            cost_basis,
            gain_loss: proceeds - cost_basis,
            acquired_at: slice.acquired_at,
            disposed_at: event.timestamp,
            term: GainTerm::from_dates(slice.acquired_at, event.timestamp),
            lot_id: slice.lot_id.clone(),
            source_event_id: event.id.clone(),
            price_fidelity: proceeds_fidelity.worst(slice.basis_fidelity),
            zero_basis: false,
        };
        debug!("emit {}", taxable);
        self.taxable.push(taxable);
    }

    fn ledger_mut(&mut self, asset: &Asset) -> &mut LotLedger {
        let strategy = self.strategy;
        self.ledgers
            .entry(asset.clone())
            .or_insert_with(|| LotLedger::new(asset.clone(), strategy))
    }
}

/// A total value in the reporting currency plus how it was obtained
#[derive(Copy, Clone, Debug)]
struct ProceedsTotal {
    value: Price,
    fidelity: PriceFidelity,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amt;
    use crate::price::{FallbackStep, Historic, PricePoint};

    fn t(s: &str) -> UtcTime {
        s.parse().unwrap()
    }

    fn usd() -> Asset {
        Asset::new("USD")
    }

    fn event(
        seq: u64,
        time: &str,
        event_type: EventType,
        asset: &str,
        amount: Amount,
        counter: Option<(&str, Amount)>,
    ) -> LedgerEvent {
        let timestamp = t(time);
        let asset = Asset::new(asset);
        LedgerEvent {
            id: EventId::derive("test", seq, timestamp, event_type, &asset, amount),
            timestamp,
            event_type,
            asset,
            amount,
            counter_asset: counter.map(|(a, _)| Asset::new(a)),
            counter_amount: counter.map(|(_, am)| am),
            source_id: "test".into(),
            source_seq: seq,
            link_id: None,
            fee_asset: None,
            fee_amount: None,
        }
    }

    fn buy(seq: u64, time: &str, qty: Amount, total_usd: Amount) -> LedgerEvent {
        event(seq, time, EventType::Trade, "BTC", qty, Some(("USD", -total_usd)))
    }

    fn sell(seq: u64, time: &str, qty: Amount, total_usd: Amount) -> LedgerEvent {
        event(seq, time, EventType::Trade, "BTC", -qty, Some(("USD", total_usd)))
    }

    fn engine(strategy: MatchingStrategy, prices: &Historic) -> MatchingEngine {
        MatchingEngine::new(
            strategy,
            InsufficientLotsPolicy::Abort,
            Valuation::new(prices, usd(), vec![]),
        )
    }

    fn two_buys_one_sell() -> Vec<LedgerEvent> {
        vec![
            buy(0, "2021-01-01T00:00:00Z", amt!(1.0), amt!(10000)),
            buy(1, "2021-01-02T00:00:00Z", amt!(1.0), amt!(20000)),
            sell(2, "2021-01-03T00:00:00Z", amt!(1.5), amt!(45000)),
        ]
    }

    #[test]
    fn fifo_worked_example() {
        let prices = Historic::new(usd());
        let mut engine = engine(MatchingStrategy::Fifo, &prices);
        engine.apply_all(&two_buys_one_sell()).unwrap();

        let taxable = engine.taxable_events();
        assert_eq!(taxable.len(), 2);
        assert_eq!(taxable[0].quantity, amt!(1.0));
        assert_eq!(taxable[0].proceeds, price!(30000));
        assert_eq!(taxable[0].cost_basis, price!(10000));
        assert_eq!(taxable[0].gain_loss, price!(20000));
        assert_eq!(taxable[1].quantity, amt!(0.5));
        assert_eq!(taxable[1].cost_basis, price!(10000));
        assert_eq!(taxable[1].gain_loss, price!(5000));
        // 0.5 BTC remains, at the day-2 basis
        assert_eq!(engine.holding(&Asset::new("BTC")), amt!(0.5));
    }

    #[test]
    fn lifo_worked_example() {
        let prices = Historic::new(usd());
        let mut engine = engine(MatchingStrategy::Lifo, &prices);
        engine.apply_all(&two_buys_one_sell()).unwrap();

        let taxable = engine.taxable_events();
        assert_eq!(taxable.len(), 2);
        assert_eq!(taxable[0].quantity, amt!(1.0));
        assert_eq!(taxable[0].cost_basis, price!(20000));
        assert_eq!(taxable[0].gain_loss, price!(10000));
        assert_eq!(taxable[1].quantity, amt!(0.5));
        assert_eq!(taxable[1].cost_basis, price!(5000));
        assert_eq!(taxable[1].gain_loss, price!(10000));
    }

    #[test]
    fn average_cost_single_slice() {
        let prices = Historic::new(usd());
        let mut engine = engine(MatchingStrategy::AverageCost, &prices);
        engine.apply_all(&two_buys_one_sell()).unwrap();

        let taxable = engine.taxable_events();
        assert_eq!(taxable.len(), 1);
        assert_eq!(taxable[0].quantity, amt!(1.5));
        assert_eq!(taxable[0].cost_basis, price!(22500));
        assert_eq!(taxable[0].gain_loss, price!(22500));
    }

    #[test]
    fn term_splits_at_365_days() {
        let prices = Historic::new(usd());
        let mut engine = engine(MatchingStrategy::Fifo, &prices);
        engine
            .apply_all(&[
                buy(0, "2020-01-01T00:00:00Z", amt!(1.0), amt!(10000)),
                buy(1, "2021-06-01T00:00:00Z", amt!(1.0), amt!(30000)),
                sell(2, "2021-06-02T00:00:00Z", amt!(2.0), amt!(80000)),
            ])
            .unwrap();
        let taxable = engine.taxable_events();
        assert_eq!(taxable[0].term, GainTerm::Long);
        assert_eq!(taxable[1].term, GainTerm::Short);
    }

    #[test]
    fn abort_policy_is_fatal() {
        let prices = Historic::new(usd());
        let mut engine = engine(MatchingStrategy::Fifo, &prices);
        let err = engine
            .apply_all(&[
                buy(0, "2021-01-01T00:00:00Z", amt!(1.0), amt!(10000)),
                sell(1, "2021-01-02T00:00:00Z", amt!(1.5), amt!(45000)),
            ])
            .unwrap_err();
        match err {
            RunError::InsufficientLots { shortfall, .. } => assert_eq!(shortfall, amt!(0.5)),
            other => panic!("expected insufficient lots, got {}", other),
        }
    }

    #[test]
    fn zero_cost_basis_policy_flags_the_event() {
        let prices = Historic::new(usd());
        let mut engine = MatchingEngine::new(
            MatchingStrategy::Fifo,
            InsufficientLotsPolicy::ZeroCostBasis,
            Valuation::new(&prices, usd(), vec![]),
        );
        engine
            .apply_all(&[
                buy(0, "2021-01-01T00:00:00Z", amt!(1.0), amt!(10000)),
                sell(1, "2021-01-02T00:00:00Z", amt!(1.5), amt!(45000)),
            ])
            .unwrap();
        let taxable = engine.taxable_events();
        assert_eq!(taxable.len(), 2);
        assert!(!taxable[0].zero_basis);
        assert!(taxable[1].zero_basis);
        assert_eq!(taxable[1].quantity, amt!(0.5));
        assert_eq!(taxable[1].cost_basis, price!(0));
        assert_eq!(taxable[1].proceeds, price!(15000));
        assert_eq!(taxable[1].gain_loss, price!(15000));
    }

    #[test]
    fn rewards_take_market_value_basis() {
        let mut prices = Historic::new(usd());
        prices
            .record(PricePoint {
                asset: Asset::new("BTC"),
                timestamp: t("2021-01-01T00:00:00Z").unix(),
                price: price!(10000),
            })
            .unwrap();
        let mut engine = engine(MatchingStrategy::Fifo, &prices);
        engine
            .apply_all(&[
                event(0, "2021-01-02T00:00:00Z", EventType::Reward, "BTC", amt!(2.0), None),
                sell(1, "2021-01-03T00:00:00Z", amt!(2.0), amt!(30000)),
            ])
            .unwrap();
        let taxable = engine.taxable_events();
        assert_eq!(taxable.len(), 1);
        assert_eq!(taxable[0].cost_basis, price!(20000));
        assert_eq!(taxable[0].gain_loss, price!(10000));
        // the reward was valued off the prior day's price point
        assert!(taxable[0].price_fidelity.is_exact());
    }

    #[test]
    fn loss_disposes_at_zero_proceeds() {
        let prices = Historic::new(usd());
        let mut engine = engine(MatchingStrategy::Fifo, &prices);
        engine
            .apply_all(&[
                buy(0, "2021-01-01T00:00:00Z", amt!(1.0), amt!(10000)),
                event(1, "2021-01-02T00:00:00Z", EventType::Loss, "BTC", amt!(-1.0), None),
            ])
            .unwrap();
        let taxable = engine.taxable_events();
        assert_eq!(taxable.len(), 1);
        assert_eq!(taxable[0].proceeds, price!(0));
        assert_eq!(taxable[0].gain_loss, price!(-10000));
    }

    #[test]
    fn crypto_to_crypto_values_the_received_leg() {
        let mut prices = Historic::new(usd());
        prices
            .record(PricePoint {
                asset: Asset::new("ETH"),
                timestamp: t("2021-01-01T00:00:00Z").unix(),
                price: price!(1000),
            })
            .unwrap();
        let mut engine = MatchingEngine::new(
            MatchingStrategy::Fifo,
            InsufficientLotsPolicy::Abort,
            Valuation::new(&prices, usd(), vec![FallbackStep::NearestPriorDay { max_days: 7 }]),
        );
        engine
            .apply_all(&[
                buy(0, "2021-01-01T12:00:00Z", amt!(1.0), amt!(10000)),
                // trade 1 BTC for 10 ETH
                event(
                    1,
                    "2021-01-02T00:00:00Z",
                    EventType::Trade,
                    "BTC",
                    amt!(-1.0),
                    Some(("ETH", amt!(10.0))),
                ),
            ])
            .unwrap();
        let taxable = engine.taxable_events();
        // BTC disposal valued at the ETH received: 10 * 1000 = 10000
        assert_eq!(taxable.len(), 1);
        assert_eq!(taxable[0].proceeds, price!(10000));
        assert_eq!(taxable[0].gain_loss, price!(0));
        // and 10 ETH opened with the same total basis
        assert_eq!(engine.holding(&Asset::new("ETH")), amt!(10.0));
        let eth_ledger = engine.ledgers().find(|l| *l.asset() == Asset::new("ETH")).unwrap();
        assert_eq!(eth_ledger.total_cost(), price!(10000));
    }

    #[test]
    fn reporting_currency_fee_adjusts_the_trade() {
        let prices = Historic::new(usd());
        let mut engine = engine(MatchingStrategy::Fifo, &prices);
        let mut b = buy(0, "2021-01-01T00:00:00Z", amt!(1.0), amt!(10000));
        b.fee_asset = Some(usd());
        b.fee_amount = Some(amt!(50));
        let mut s = sell(1, "2021-01-02T00:00:00Z", amt!(1.0), amt!(20000));
        s.fee_asset = Some(usd());
        s.fee_amount = Some(amt!(50));
        engine.apply_all(&[b, s]).unwrap();

        let taxable = engine.taxable_events();
        assert_eq!(taxable.len(), 1);
        // basis 10050, proceeds 19950
        assert_eq!(taxable[0].cost_basis, price!(10050));
        assert_eq!(taxable[0].proceeds, price!(19950));
        assert_eq!(taxable[0].gain_loss, price!(9900));
    }

    #[test]
    fn taxable_events_round_trip_at_full_precision() {
        let prices = Historic::new(usd());
        let mut engine = engine(MatchingStrategy::Fifo, &prices);
        engine
            .apply_all(&[
                buy(0, "2021-01-01T00:00:00Z", amt!("0.123456789012345678"), amt!(10000)),
                sell(1, "2021-01-02T00:00:00Z", amt!("0.123456789012345678"), amt!(20000)),
            ])
            .unwrap();
        let taxable = engine.taxable_events();
        let json = serde_json::to_string(taxable).unwrap();
        let back: Vec<TaxableEvent> = serde_json::from_str(&json).unwrap();
        assert_eq!(taxable, &back[..]);
    }

    #[test]
    fn identical_input_gives_identical_output() {
        let prices = Historic::new(usd());
        let run = || {
            let mut engine = engine(MatchingStrategy::Hifo, &prices);
            engine.apply_all(&two_buys_one_sell()).unwrap();
            engine.taxable_events().to_vec()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn reconciled_transfers_leave_lots_untouched() {
        use crate::ledger::transfer::{reconcile, TransferTolerance};
        use rust_decimal::Decimal;

        let prices = Historic::new(usd());
        let transfer = |seq, time: &str, amount| {
            event(seq, time, EventType::Transfer, "BTC", amount, None)
        };
        let events = vec![
            buy(0, "2021-01-01T00:00:00Z", amt!(1.0), amt!(10000)),
            transfer(1, "2021-02-01T00:00:00Z", amt!(-1.0)),
            transfer(2, "2021-02-01T00:10:00Z", amt!(1.0)),
            sell(3, "2021-03-01T00:00:00Z", amt!(1.0), amt!(30000)),
        ];
        let reconciled = reconcile(
            events,
            TransferTolerance {
                time_window_secs: 3600,
                amount_tolerance_pct: Decimal::ONE,
            },
        );
        assert_eq!(reconciled.matches.len(), 1);

        let mut engine = engine(MatchingStrategy::Fifo, &prices);
        engine.apply_all(&reconciled.events).unwrap();
        // The sale still consumes the original lot with its original
        // basis and date; the transfer changed nothing.
        let taxable = engine.taxable_events();
        assert_eq!(taxable.len(), 1);
        assert_eq!(taxable[0].cost_basis, price!(10000));
        assert_eq!(
            taxable[0].acquired_at,
            "2021-01-01T00:00:00Z".parse().unwrap(),
        );
        assert_eq!(taxable[0].term, GainTerm::Short);
    }

    #[test]
    fn in_kind_fee_is_a_zero_proceeds_disposal() {
        let prices = Historic::new(usd());
        let mut engine = engine(MatchingStrategy::Fifo, &prices);
        let mut s = sell(1, "2021-01-02T00:00:00Z", amt!(0.5), amt!(10000));
        s.fee_asset = Some(Asset::new("BTC"));
        s.fee_amount = Some(amt!(0.01));
        engine
            .apply_all(&[buy(0, "2021-01-01T00:00:00Z", amt!(1.0), amt!(10000)), s])
            .unwrap();

        let taxable = engine.taxable_events();
        assert_eq!(taxable.len(), 2);
        assert_eq!(taxable[1].quantity, amt!(0.01));
        assert_eq!(taxable[1].proceeds, price!(0));
        assert_eq!(taxable[1].cost_basis, price!(100));
        assert_eq!(taxable[1].gain_loss, price!(-100));
        assert_eq!(engine.holding(&Asset::new("BTC")), amt!(0.49));
    }
}
