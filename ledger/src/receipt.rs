//! Transaction receipts and contract outcomes.

use ballot_types::{AccountAddress, LedgerPollId, RelayNonce, Timestamp, TxRef, VoterNonce};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why the contract reverted an included transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RevertReason {
    /// The voter nonce in the intent is not the contract's current value.
    /// Under concurrent voting this is expected contention.
    InvalidNonce {
        expected: VoterNonce,
        provided: VoterNonce,
    },
    AlreadyVoted,
    PollEnded,
    PollNotFound,
    InvalidOption { index: u32, count: u32 },
    InvalidSignature,
    OutOfGas { limit: u64, required: u64 },
    /// Only the poll creator may end or extend it.
    NotCreator,
    Other(String),
}

impl RevertReason {
    /// A voter-nonce mismatch discovered at the ledger.
    pub fn is_replay(&self) -> bool {
        matches!(self, Self::InvalidNonce { .. })
    }
}

impl fmt::Display for RevertReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidNonce { expected, provided } => {
                write!(f, "nonce already used (expected {expected}, got {provided})")
            }
            Self::AlreadyVoted => write!(f, "voter already voted on this poll"),
            Self::PollEnded => write!(f, "poll has ended"),
            Self::PollNotFound => write!(f, "poll does not exist"),
            Self::InvalidOption { index, count } => {
                write!(f, "option {index} out of range ({count} options)")
            }
            Self::InvalidSignature => write!(f, "invalid voter signature"),
            Self::OutOfGas { limit, required } => {
                write!(f, "out of gas (limit {limit}, required {required})")
            }
            Self::NotCreator => write!(f, "caller is not the poll creator"),
            Self::Other(msg) => write!(f, "{msg}"),
        }
    }
}

/// Events emitted by successful contract calls.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractEvent {
    PollCreated {
        poll: LedgerPollId,
        creator: AccountAddress,
        end_time: Timestamp,
    },
    Voted {
        poll: LedgerPollId,
        voter: AccountAddress,
        option_index: u32,
    },
    PollEnded {
        poll: LedgerPollId,
    },
    PollExtended {
        poll: LedgerPollId,
        end_time: Timestamp,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiptStatus {
    Success { events: Vec<ContractEvent> },
    Reverted(RevertReason),
}

/// Proof of inclusion for a submitted transaction.
///
/// A reverted transaction is still included: it consumed its relay nonce.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_ref: TxRef,
    pub relay_nonce: RelayNonce,
    pub block_height: u64,
    pub gas_used: u64,
    pub status: ReceiptStatus,
}

impl Receipt {
    pub fn is_success(&self) -> bool {
        matches!(self.status, ReceiptStatus::Success { .. })
    }

    pub fn events(&self) -> &[ContractEvent] {
        match &self.status {
            ReceiptStatus::Success { events } => events,
            ReceiptStatus::Reverted(_) => &[],
        }
    }

    /// The ledger poll id assigned by a `CreatePoll` call, if any.
    pub fn created_poll(&self) -> Option<(LedgerPollId, Timestamp)> {
        self.events().iter().find_map(|e| match e {
            ContractEvent::PollCreated { poll, end_time, .. } => Some((*poll, *end_time)),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverted_receipt_has_no_events() {
        let r = Receipt {
            tx_ref: TxRef::new([1; 32]),
            relay_nonce: RelayNonce::new(0),
            block_height: 1,
            gas_used: 21_000,
            status: ReceiptStatus::Reverted(RevertReason::PollEnded),
        };
        assert!(!r.is_success());
        assert!(r.events().is_empty());
        assert!(r.created_poll().is_none());
    }

    #[test]
    fn only_nonce_mismatch_is_replay() {
        assert!(RevertReason::InvalidNonce {
            expected: VoterNonce::new(6),
            provided: VoterNonce::new(5)
        }
        .is_replay());
        assert!(!RevertReason::AlreadyVoted.is_replay());
    }
}
