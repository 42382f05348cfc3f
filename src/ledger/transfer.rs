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

//! Transfer Reconciliation
//!
//! Detects pairs of transfer events that represent one physical
//! movement of funds between two of the user's own accounts, and
//! removes both legs from the stream so the matching engine never sees
//! them as a disposal/acquisition.
//!
//! Legs that carry the same `link_id` are paired outright. The rest
//! are paired greedily: outgoing legs in time order, each taking the
//! nearest-in-time incoming leg of the same asset within the tolerance
//! window whose amount matches up to the fee-adjusted tolerance. Ties
//! break by earliest timestamp, then event id. This policy is
//! deliberately simple and deterministic, not claimed optimal.
//!

use crate::ledger::event::{EventId, EventType, LedgerEvent};
use crate::units::{Asset, UtcTime};
use chrono::Duration;
use log::{debug, info};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Tolerances for deciding that two transfer legs are one movement
#[derive(Copy, Clone, PartialEq, Eq, Deserialize, Serialize, Debug)]
pub struct TransferTolerance {
    /// Maximum seconds between the two legs' timestamps
    pub time_window_secs: i64,
    /// Maximum difference between sent and received amounts, as a
    /// percentage of the sent amount; covers network/withdrawal fees
    pub amount_tolerance_pct: Decimal,
}

impl TransferTolerance {
    fn window(&self) -> Duration {
        Duration::seconds(self.time_window_secs)
    }
}

impl Default for TransferTolerance {
    /// One hour and 1%, which covers typical exchange withdrawal fees
    fn default() -> Self {
        TransferTolerance {
            time_window_secs: 3600,
            amount_tolerance_pct: Decimal::ONE,
        }
    }
}

/// A reconciled pair of transfer legs
#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
pub struct TransferMatch {
    pub asset: Asset,
    pub outgoing_id: EventId,
    pub incoming_id: EventId,
    pub outgoing_at: UtcTime,
    pub incoming_at: UtcTime,
}

/// The stream after reconciliation
#[derive(Clone, Debug, Default)]
pub struct ReconciledStream {
    /// Events for the matching engine, still in total order; matched
    /// transfer legs are gone, unmatched ones flow through
    pub events: Vec<LedgerEvent>,
    /// The self-transfers that were cancelled
    pub matches: Vec<TransferMatch>,
}

/// Pairs up self-transfers and drops them from the stream
///
/// Input must already be in total order; output preserves the order of
/// the surviving events.
pub fn reconcile(events: Vec<LedgerEvent>, tolerance: TransferTolerance) -> ReconciledStream {
    let mut matched = vec![false; events.len()];
    let mut matches = vec![];

    // Indices of transfer legs, in stream (time) order
    let outgoing: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| e.event_type == EventType::Transfer && e.is_disposal())
        .map(|(i, _)| i)
        .collect();
    let incoming: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| e.event_type == EventType::Transfer && e.is_acquisition())
        .map(|(i, _)| i)
        .collect();

    // Pass 1: explicit link ids pair unconditionally (same asset only)
    for &out in &outgoing {
        let link = match events[out].link_id {
            Some(ref link) => link,
            None => continue,
        };
        for &inc in &incoming {
            if matched[inc]
                || events[inc].link_id.as_ref() != Some(link)
                || events[inc].asset != events[out].asset
            {
                continue;
            }
            debug!(
                "linked transfer {} -> {} via link id {}",
                events[out].id, events[inc].id, link,
            );
            matched[out] = true;
            matched[inc] = true;
            matches.push(pair(&events[out], &events[inc]));
            break;
        }
    }

    // Pass 2: greedy nearest-timestamp matching within tolerance.
    // Outgoing legs are visited earliest-first, which is the
    // documented resolution for ambiguous multi-candidate cases.
    for &out in &outgoing {
        if matched[out] {
            continue;
        }
        let out_ev = &events[out];
        let sent = out_ev.amount.abs();
        let max_diff =
            sent.as_decimal() * tolerance.amount_tolerance_pct / Decimal::ONE_HUNDRED;

        let mut best: Option<(Duration, UtcTime, &EventId, usize)> = None;
        for &inc in &incoming {
            if matched[inc] {
                continue;
            }
            let in_ev = &events[inc];
            if in_ev.asset != out_ev.asset {
                continue;
            }
            let lag = if in_ev.timestamp >= out_ev.timestamp {
                in_ev.timestamp - out_ev.timestamp
            } else {
                out_ev.timestamp - in_ev.timestamp
            };
            if lag > tolerance.window() {
                continue;
            }
            let received = in_ev.amount.abs();
            let diff = (sent - received).abs();
            if diff.as_decimal() > max_diff {
                continue;
            }
            let key = (lag, in_ev.timestamp, &in_ev.id, inc);
            match best {
                Some((l, t, id, _)) if (l, t, id) <= (key.0, key.1, key.2) => {}
                _ => best = Some(key),
            }
        }

        if let Some((lag, _, _, inc)) = best {
            debug!(
                "matched transfer {} -> {} ({}s apart)",
                out_ev.id,
                events[inc].id,
                lag.num_seconds(),
            );
            matched[out] = true;
            matched[inc] = true;
            matches.push(pair(&events[out], &events[inc]));
        }
    }

    let n_transfers = outgoing.len() + incoming.len();
    if n_transfers > 0 {
        info!(
            "reconciled {} of {} transfer legs into {} self-transfers",
            2 * matches.len(),
            n_transfers,
            matches.len(),
        );
    }

    let events = events
        .into_iter()
        .zip(matched)
        .filter(|(_, m)| !m)
        .map(|(e, _)| e)
        .collect();
    ReconciledStream { events, matches }
}

fn pair(out_ev: &LedgerEvent, in_ev: &LedgerEvent) -> TransferMatch {
    TransferMatch {
        asset: out_ev.asset.clone(),
        outgoing_id: out_ev.id.clone(),
        incoming_id: in_ev.id.clone(),
        outgoing_at: out_ev.timestamp,
        incoming_at: in_ev.timestamp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amt;
    use crate::ledger::event::EventId;
    use crate::units::Amount;

    fn tolerance() -> TransferTolerance {
        TransferTolerance {
            time_window_secs: 3600,
            amount_tolerance_pct: Decimal::ONE,
        }
    }

    fn transfer(seq: u64, time: &str, asset: &str, amount: Amount, source: &str) -> LedgerEvent {
        let timestamp: UtcTime = time.parse().unwrap();
        let asset = Asset::new(asset);
        LedgerEvent {
            id: EventId::derive(source, seq, timestamp, EventType::Transfer, &asset, amount),
            timestamp,
            event_type: EventType::Transfer,
            asset,
            amount,
            counter_asset: None,
            counter_amount: None,
            source_id: source.into(),
            source_seq: seq,
            link_id: None,
            fee_asset: None,
            fee_amount: None,
        }
    }

    #[test]
    fn out_and_in_within_tolerance_cancel() {
        let out = transfer(0, "2021-03-01T12:00:00Z", "ETH", amt!(-2.0), "exchange-a");
        let inc = transfer(0, "2021-03-01T12:05:00Z", "ETH", amt!(2.0), "wallet-b");
        let res = reconcile(vec![out.clone(), inc.clone()], tolerance());
        assert!(res.events.is_empty());
        assert_eq!(res.matches.len(), 1);
        assert_eq!(res.matches[0].outgoing_id, out.id);
        assert_eq!(res.matches[0].incoming_id, inc.id);
    }

    #[test]
    fn fee_adjusted_amounts_still_match() {
        // 0.5% lost to a network fee, within the 1% tolerance
        let out = transfer(0, "2021-03-01T12:00:00Z", "BTC", amt!(-1.000), "a");
        let inc = transfer(0, "2021-03-01T12:10:00Z", "BTC", amt!(0.995), "b");
        let res = reconcile(vec![out, inc], tolerance());
        assert!(res.events.is_empty());
        assert_eq!(res.matches.len(), 1);
    }

    #[test]
    fn outside_window_flows_through() {
        let out = transfer(0, "2021-03-01T12:00:00Z", "ETH", amt!(-2.0), "a");
        let inc = transfer(0, "2021-03-01T14:00:00Z", "ETH", amt!(2.0), "b");
        let res = reconcile(vec![out, inc], tolerance());
        assert_eq!(res.events.len(), 2);
        assert!(res.matches.is_empty());
    }

    #[test]
    fn amount_mismatch_flows_through() {
        let out = transfer(0, "2021-03-01T12:00:00Z", "ETH", amt!(-2.0), "a");
        let inc = transfer(0, "2021-03-01T12:05:00Z", "ETH", amt!(1.5), "b");
        let res = reconcile(vec![out, inc], tolerance());
        assert_eq!(res.events.len(), 2);
        assert!(res.matches.is_empty());
    }

    #[test]
    fn nearest_candidate_wins_deterministically() {
        let out = transfer(0, "2021-03-01T12:00:00Z", "ETH", amt!(-2.0), "a");
        let near = transfer(0, "2021-03-01T12:01:00Z", "ETH", amt!(2.0), "b");
        let far = transfer(1, "2021-03-01T12:30:00Z", "ETH", amt!(2.0), "c");
        let res = reconcile(vec![out.clone(), near.clone(), far.clone()], tolerance());
        assert_eq!(res.matches.len(), 1);
        assert_eq!(res.matches[0].incoming_id, near.id);
        // the far leg survives as an ordinary acquisition
        assert_eq!(res.events.len(), 1);
        assert_eq!(res.events[0].id, far.id);
    }

    #[test]
    fn link_id_pairs_before_heuristics() {
        let mut out = transfer(0, "2021-03-01T12:00:00Z", "ETH", amt!(-2.0), "a");
        let near = transfer(0, "2021-03-01T12:01:00Z", "ETH", amt!(2.0), "b");
        let mut linked = transfer(1, "2021-03-01T12:30:00Z", "ETH", amt!(2.0), "c");
        out.link_id = Some("mv-77".into());
        linked.link_id = Some("mv-77".into());
        let res = reconcile(vec![out.clone(), near.clone(), linked.clone()], tolerance());
        assert_eq!(res.matches.len(), 1);
        assert_eq!(res.matches[0].outgoing_id, out.id);
        assert_eq!(res.matches[0].incoming_id, linked.id);
        // the nearer-but-unlinked leg survives as an ordinary acquisition
        assert_eq!(res.events.len(), 1);
        assert_eq!(res.events[0].id, near.id);
    }
}
