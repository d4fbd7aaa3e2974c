//! Mirrored vote records.

use serde::{Deserialize, Serialize};

use crate::{AccountAddress, PollId, Timestamp, TxRef};

/// Evidence of a confirmed ledger vote.
///
/// Exactly one per `(poll_id, voter)`; written once and never updated or
/// deleted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub poll_id: PollId,
    pub voter: AccountAddress,
    pub option_index: u32,
    pub tx_ref: TxRef,
    pub recorded_at: Timestamp,
}
