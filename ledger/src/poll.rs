//! Ledger-side views of polls and votes.

use ballot_types::{AccountAddress, LedgerPollId, Timestamp, TxRef};
use serde::{Deserialize, Serialize};

/// The poll struct as stored by the contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerPoll {
    pub id: LedgerPollId,
    pub question: String,
    pub options: Vec<String>,
    pub creator: AccountAddress,
    pub end_time: Timestamp,
    pub active: bool,
    pub total_votes: u64,
}

/// A `Voted` event emitted by an included vote transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteEvent {
    pub poll: LedgerPollId,
    pub voter: AccountAddress,
    pub option_index: u32,
    pub tx_ref: TxRef,
}
