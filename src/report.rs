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

//! Reports
//!
//! Aggregates taxable events into period totals and writes the run
//! output: a metadata file, CSV files for disposals, holdings,
//! reconciled transfers and malformed records, and a JSON summary.
//! Everything lands in a fresh timestamped directory; nothing is ever
//! overwritten.
//!

use crate::config::{Configuration, ReportingPeriod};
use crate::csv::{CsvPrinter, DateOnly, DateTime};
use crate::engine::{GainTerm, TaxableEvent};
use crate::file::create_text_file;
use crate::ledger::{MalformedEvent, TransferMatch};
use crate::lots::LotLedger;
use crate::units::{Amount, Asset, Price, UtcTime};
use anyhow::Context;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;

/// Running totals over a set of taxable events
#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize)]
pub struct Totals {
    pub events: usize,
    pub proceeds: Price,
    pub cost_basis: Price,
    pub gain_loss: Price,
}

impl Totals {
    fn absorb(&mut self, ev: &TaxableEvent) {
        self.events += 1;
        self.proceeds += ev.proceeds;
        self.cost_basis += ev.cost_basis;
        self.gain_loss += ev.gain_loss;
    }
}

/// One asset's open position at the end of the run
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct HoldingRow {
    pub asset: Asset,
    pub quantity: Amount,
    pub cost_basis: Price,
    pub open_lots: usize,
}

/// The aggregated view of one run
#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
pub struct Summary {
    pub short_term: Totals,
    pub long_term: Totals,
    pub total: Totals,
    /// Disposals that consumed a synthesized zero-basis lot
    pub zero_basis_events: usize,
    /// Disposals priced through a fallback rather than exactly
    pub fallback_priced_events: usize,
    pub holdings: Vec<HoldingRow>,
}

impl Summary {
    /// Aggregates the in-period taxable events and final holdings
    pub fn aggregate<'l, I>(taxable: &[&TaxableEvent], ledgers: I) -> Summary
    where
        I: Iterator<Item = &'l LotLedger>,
    {
        let mut summary = Summary {
            short_term: Totals::default(),
            long_term: Totals::default(),
            total: Totals::default(),
            zero_basis_events: 0,
            fallback_priced_events: 0,
            holdings: vec![],
        };
        for ev in taxable {
            match ev.term {
                GainTerm::Short => summary.short_term.absorb(ev),
                GainTerm::Long => summary.long_term.absorb(ev),
            }
            summary.total.absorb(ev);
            if ev.zero_basis {
                summary.zero_basis_events += 1;
            }
            if !ev.price_fidelity.is_exact() {
                summary.fallback_priced_events += 1;
            }
        }
        for ledger in ledgers {
            if ledger.total_quantity().is_zero() {
                continue;
            }
            summary.holdings.push(HoldingRow {
                asset: ledger.asset().clone(),
                quantity: ledger.total_quantity(),
                cost_basis: ledger.total_cost(),
                open_lots: ledger.n_lots(),
            });
        }
        summary
    }
}

/// Selects the taxable events whose disposal falls in the period
pub fn in_period<'t>(
    taxable: &'t [TaxableEvent],
    period: Option<&ReportingPeriod>,
) -> Vec<&'t TaxableEvent> {
    taxable
        .iter()
        .filter(|ev| period.map(|p| p.contains(ev.disposed_at)).unwrap_or(true))
        .collect()
}

/// Writes the full report into a fresh timestamped directory
///
/// Returns the directory name. Refuses to run if the directory already
/// exists, so a report can never be partially overwritten.
pub fn write_report<'l, I>(
    config: &Configuration,
    taxable: &[TaxableEvent],
    ledgers: I,
    malformed: &[MalformedEvent],
    transfers: &[TransferMatch],
) -> anyhow::Result<String>
where
    I: Iterator<Item = &'l LotLedger>,
{
    let now = UtcTime::now();
    let dir_path = format!("basis_report_{}", now.format("%Y%m%d-%H%M"));
    if fs::metadata(&dir_path).is_ok() {
        return Err(anyhow::Error::msg(format!(
            "Output directory {dir_path} exists. Refusing to run."
        )));
    }
    fs::create_dir(&dir_path)
        .with_context(|| format!("Creating directory {dir_path} to put report output into"))?;
    info!("Creating directory {} to hold output.", dir_path);

    let selected = in_period(taxable, config.reporting_period.as_ref());
    let ledgers: Vec<&LotLedger> = ledgers.collect();
    let summary = Summary::aggregate(&selected, ledgers.iter().copied());

    // Metadata first, in part to make sure we can create files before
    // doing any real work.
    let mut metadata = create_text_file(
        format!("{dir_path}/metadata"),
        "with metadata about this run",
    )?;
    writeln!(metadata, "Started on: {now}")?;
    writeln!(metadata, "Config hash: {}", config.hash()?)?;
    writeln!(metadata, "Matching strategy: {}", config.matching_strategy)?;
    writeln!(metadata, "Reporting currency: {}", config.reporting_currency)?;
    match config.reporting_period {
        Some(ref period) => writeln!(metadata, "Reporting period: {period}")?,
        None => writeln!(metadata, "Reporting period: all")?,
    }
    writeln!(metadata, "Taxable events: {}", selected.len())?;
    writeln!(metadata, "Zero-basis events: {}", summary.zero_basis_events)?;
    writeln!(metadata, "Reconciled transfers: {}", transfers.len())?;
    writeln!(metadata, "Malformed records: {}", malformed.len())?;

    let mut disposals = create_text_file(
        format!("{dir_path}/disposals.csv"),
        "with one row per consumed lot slice",
    )?;
    writeln!(
        disposals,
        "disposed_date,asset,quantity,proceeds,cost_basis,gain_loss,term,acquired_date,lot_id,event_id,price_fidelity,notes",
    )?;
    for ev in &selected {
        let notes = if ev.zero_basis { "zero_basis" } else { "" };
        writeln!(
            disposals,
            "{}",
            CsvPrinter((
                DateOnly(ev.disposed_at),
                &ev.asset,
                ev.quantity,
                ev.proceeds,
                ev.cost_basis,
                ev.gain_loss,
                ev.term,
                DateOnly(ev.acquired_at),
                &ev.lot_id,
                &ev.source_event_id,
                ev.price_fidelity,
                notes,
            )),
        )?;
    }

    let mut holdings = create_text_file(
        format!("{dir_path}/holdings.csv"),
        "with one row per open lot",
    )?;
    writeln!(
        holdings,
        "asset,quantity,unit_cost,cost_basis,acquired_date,lot_id,price_fidelity",
    )?;
    for ledger in &ledgers {
        for lot in ledger.open_lots() {
            writeln!(
                holdings,
                "{}",
                CsvPrinter((
                    lot.asset(),
                    lot.quantity_remaining(),
                    lot.unit_cost_basis(),
                    lot.cost_remaining(),
                    DateOnly(lot.acquired_at()),
                    lot.id(),
                    lot.basis_fidelity(),
                )),
            )?;
        }
    }

    let mut transfers_csv = create_text_file(
        format!("{dir_path}/transfers.csv"),
        "with one row per reconciled self-transfer",
    )?;
    writeln!(
        transfers_csv,
        "asset,outgoing_id,incoming_id,outgoing_time,incoming_time",
    )?;
    for tr in transfers {
        writeln!(
            transfers_csv,
            "{}",
            CsvPrinter((
                &tr.asset,
                &tr.outgoing_id,
                &tr.incoming_id,
                DateTime(tr.outgoing_at),
                DateTime(tr.incoming_at),
            )),
        )?;
    }

    let mut malformed_csv = create_text_file(
        format!("{dir_path}/malformed.csv"),
        "with one row per excluded source record",
    )?;
    writeln!(malformed_csv, "source,seq,reason")?;
    for bad in malformed {
        writeln!(
            malformed_csv,
            "{}",
            CsvPrinter((bad.source_id.as_str(), bad.source_seq, bad.reason.as_str())),
        )?;
    }

    let mut summary_json = create_text_file(
        format!("{dir_path}/summary.json"),
        "with the aggregated totals",
    )?;
    write!(
        summary_json,
        "{}",
        serde_json::to_string_pretty(&summary).context("serializing summary")?,
    )?;

    info!(
        "Wrote {} taxable events, gain/loss {}.",
        selected.len(),
        summary.total.gain_loss,
    );
    Ok(dir_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amt;
    use crate::engine::GainTerm;
    use crate::ledger::EventId;
    use crate::lots::LotId;
    use crate::price::PriceFidelity;

    fn taxable(disposed: &str, gain: Price, term: GainTerm, zero_basis: bool) -> TaxableEvent {
        let disposed_at: UtcTime = disposed.parse().unwrap();
        TaxableEvent {
            asset: Asset::new("BTC"),
            quantity: amt!(1.0),
            proceeds: gain + price!(1000),
            cost_basis: price!(1000),
            gain_loss: gain,
            acquired_at: "2020-01-01T00:00:00Z".parse().unwrap(),
            disposed_at,
            term,
            lot_id: LotId::zero_basis(&"ev-0".parse().unwrap()),
            source_event_id: "ev-0".parse::<EventId>().unwrap(),
            price_fidelity: PriceFidelity::Exact,
            zero_basis,
        }
    }

    #[test]
    fn totals_split_by_term() {
        let events = vec![
            taxable("2021-03-01T00:00:00Z", price!(100), GainTerm::Long, false),
            taxable("2021-06-01T00:00:00Z", price!(-40), GainTerm::Short, false),
            taxable("2021-09-01T00:00:00Z", price!(60), GainTerm::Long, true),
        ];
        let selected = in_period(&events, None);
        let summary = Summary::aggregate(&selected, std::iter::empty());
        assert_eq!(summary.long_term.events, 2);
        assert_eq!(summary.long_term.gain_loss, price!(160));
        assert_eq!(summary.short_term.gain_loss, price!(-40));
        assert_eq!(summary.total.gain_loss, price!(120));
        assert_eq!(summary.zero_basis_events, 1);
        assert_eq!(summary.fallback_priced_events, 0);
    }

    #[test]
    fn holding_row_round_trips_at_full_precision() {
        let row = HoldingRow {
            asset: Asset::new("ETH"),
            quantity: amt!("10.000000000000000003"),
            cost_basis: price!("12345.678901234567890123"),
            open_lots: 4,
        };
        let json = serde_json::to_string(&row).unwrap();
        let back: HoldingRow = serde_json::from_str(&json).unwrap();
        assert_eq!(row, back);
    }

    #[test]
    fn period_filters_disposals() {
        let events = vec![
            taxable("2020-06-01T00:00:00Z", price!(10), GainTerm::Short, false),
            taxable("2021-06-01T00:00:00Z", price!(20), GainTerm::Short, false),
        ];
        let selected = in_period(&events, Some(&ReportingPeriod::Year(2021)));
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].gain_loss, price!(20));
    }
}
