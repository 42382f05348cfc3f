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

//! Ledger
//!
//! The canonical event model, normalization from source records, and
//! self-transfer reconciliation. Everything before the matching engine.
//!

pub mod event;
pub mod normalize;
pub mod transfer;

pub use self::event::{EventId, EventType, LedgerEvent, MalformedEvent};
pub use self::normalize::{EventSource, JsonRecords, NormalizedBatch};
pub use self::transfer::{ReconciledStream, TransferMatch, TransferTolerance};
