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

//! Event Normalization
//!
//! Converts source-specific records into the canonical [LedgerEvent]
//! shape and assigns the total order. The core is polymorphic over a
//! single capability, [EventSource]; one implementation exists per
//! source format and the engine only ever sees the canonical type.
//!
//! Records that cannot be normalized are excluded from the stream and
//! collected as [MalformedEvent]s, to be reported next to the output.
//!

use crate::ledger::event::{EventId, EventType, LedgerEvent, MalformedEvent};
use crate::units::{Amount, Asset, UtcTime};
use anyhow::Context;
use log::{debug, info};
use serde::Deserialize;
use std::{fmt, io};

/// Raised if two distinct events tie on the full ordering key
///
/// Must never occur under correct normalization (ids are content
/// hashes and duplicates are removed first); it signals an upstream bug
/// rather than bad user data.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct NonDeterministicOrdering {
    pub id: EventId,
    pub timestamp: UtcTime,
}

impl fmt::Display for NonDeterministicOrdering {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "events tie on the full ordering key (id {} at {}); refusing to guess an order",
            self.id, self.timestamp,
        )
    }
}

impl std::error::Error for NonDeterministicOrdering {}

/// The result of normalizing one batch of source records
#[derive(Clone, Debug, Default)]
pub struct NormalizedBatch {
    /// Events in total order `(timestamp, source_seq, id)`
    pub events: Vec<LedgerEvent>,
    /// Records that were excluded, with reasons
    pub malformed: Vec<MalformedEvent>,
}

/// A supplier of source records that can be normalized into events
///
/// Normalization must be a pure function of the source's content: two
/// calls on identical input produce identical batches (ids included).
pub trait EventSource {
    /// A human-readable description for logs and error contexts
    fn describe(&self) -> String;

    /// Normalizes the source's records into an ordered batch
    fn normalize(&self) -> anyhow::Result<NormalizedBatch>;
}

/// One record of the JSON interchange format
///
/// Every field is optional at the serde level so that a missing field
/// becomes a reported [MalformedEvent] rather than a failed parse of
/// the whole batch. Amounts are decimal strings; JSON numbers would go
/// through floating point in other tooling.
#[derive(Clone, PartialEq, Eq, Deserialize, Debug)]
pub struct RawRecord {
    pub source: String,
    pub seq: u64,
    pub kind: String,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub asset: Option<String>,
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default)]
    pub counter_asset: Option<String>,
    #[serde(default)]
    pub counter_amount: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub fee_asset: Option<String>,
    #[serde(default)]
    pub fee_amount: Option<String>,
}

impl RawRecord {
    /// Attempts to turn the record into a canonical event
    fn to_event(&self) -> Result<LedgerEvent, String> {
        let event_type = match self.kind.as_str() {
            "trade" => EventType::Trade,
            "transfer" => EventType::Transfer,
            "fee" => EventType::Fee,
            "reward" => EventType::Reward,
            "airdrop" => EventType::Airdrop,
            "loss" => EventType::Loss,
            "spend_income" => EventType::SpendIncome,
            other => return Err(format!("unknown record kind \"{other}\"")),
        };

        let time = self.time.as_deref().ok_or("missing time")?;
        let timestamp: UtcTime = time
            .parse()
            .map_err(|e| format!("bad timestamp \"{time}\": {e}"))?;

        let asset = Asset::new(self.asset.as_deref().ok_or("missing asset")?);
        if asset.is_empty() {
            return Err("empty asset".into());
        }

        let amount_str = self.amount.as_deref().ok_or("missing amount")?;
        let amount: Amount = amount_str
            .parse()
            .map_err(|e| format!("bad amount \"{amount_str}\": {e}"))?;
        if amount.is_zero() {
            return Err("zero amount".into());
        }

        let (counter_asset, counter_amount) = match (&self.counter_asset, &self.counter_amount) {
            (Some(ca), Some(cam)) => {
                let ca = Asset::new(ca.as_str());
                if ca.is_empty() {
                    return Err("empty counter asset".into());
                }
                let cam: Amount = cam
                    .parse()
                    .map_err(|e| format!("bad counter amount \"{cam}\": {e}"))?;
                if cam.has_same_sign(amount) {
                    return Err(format!(
                        "counter amount {cam} must have the opposite sign of amount {amount}",
                    ));
                }
                (Some(ca), Some(cam))
            }
            (None, None) => (None, None),
            _ => return Err("counter asset and counter amount must come together".into()),
        };
        if event_type == EventType::Trade && counter_asset.is_none() {
            return Err("trade without a counter leg".into());
        }

        let (fee_asset, fee_amount) = match (&self.fee_asset, &self.fee_amount) {
            (Some(fa), Some(fam)) => {
                let fam: Amount = fam
                    .parse()
                    .map_err(|e| format!("bad fee amount \"{fam}\": {e}"))?;
                if fam.is_negative() {
                    return Err(format!("fee amount {fam} must be nonnegative"));
                }
                (Some(Asset::new(fa.as_str())), Some(fam))
            }
            (None, None) => (None, None),
            _ => return Err("fee asset and fee amount must come together".into()),
        };

        let id = EventId::derive(
            &self.source,
            self.seq,
            timestamp,
            event_type,
            &asset,
            amount,
        );
        Ok(LedgerEvent {
            id,
            timestamp,
            event_type,
            asset,
            amount,
            counter_asset,
            counter_amount,
            source_id: self.source.clone(),
            source_seq: self.seq,
            link_id: self.link.clone(),
            fee_asset,
            fee_amount,
        })
    }
}

/// An [EventSource] over a batch of JSON interchange records
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct JsonRecords {
    name: String,
    records: Vec<RawRecord>,
}

impl JsonRecords {
    /// Parses a JSON array of records from a reader
    pub fn from_reader<R: io::Read>(name: &str, reader: R) -> anyhow::Result<Self> {
        let records: Vec<RawRecord> = serde_json::from_reader(reader)
            .with_context(|| format!("decoding event records from {name}"))?;
        Ok(JsonRecords {
            name: name.to_owned(),
            records,
        })
    }

    /// Constructs a source directly from records (mainly for tests)
    pub fn from_records(name: &str, records: Vec<RawRecord>) -> Self {
        JsonRecords {
            name: name.to_owned(),
            records,
        }
    }
}

impl EventSource for JsonRecords {
    fn describe(&self) -> String {
        format!("{} ({} records)", self.name, self.records.len())
    }

    fn normalize(&self) -> anyhow::Result<NormalizedBatch> {
        let mut batch = NormalizedBatch::default();
        for record in &self.records {
            match record.to_event() {
                Ok(event) => {
                    debug!("normalized {}", event);
                    batch.events.push(event);
                }
                Err(reason) => {
                    let bad = MalformedEvent {
                        source_id: record.source.clone(),
                        source_seq: record.seq,
                        reason,
                    };
                    info!("excluding {}", bad);
                    batch.malformed.push(bad);
                }
            }
        }
        order_events(&mut batch.events)?;
        Ok(batch)
    }
}

/// Sorts events into total order, removing duplicate ids
///
/// The same record imported twice hashes to the same id; the first
/// copy wins and the duplicate is logged. After deduplication a
/// full-key tie is impossible, but the check stays as a guard against
/// upstream bugs.
pub fn order_events(events: &mut Vec<LedgerEvent>) -> Result<(), NonDeterministicOrdering> {
    events.sort_by(|a, b| a.ordering_key().cmp(&b.ordering_key()));
    let before = events.len();
    events.dedup_by(|a, b| {
        if a.id == b.id && a == b {
            info!("dropping duplicate import of event {}", a.id);
            true
        } else {
            false
        }
    });
    if events.len() != before {
        info!("removed {} duplicate events", before - events.len());
    }

    for pair in events.windows(2) {
        if pair[0].ordering_key() == pair[1].ordering_key() {
            return Err(NonDeterministicOrdering {
                id: pair[0].id.clone(),
                timestamp: pair[0].timestamp,
            });
        }
    }
    Ok(())
}
