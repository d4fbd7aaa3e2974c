//! Durable queue of ledger outcomes the mirror has not absorbed yet.

use crate::StoreError;
use ballot_types::{AccountAddress, PollId, Timestamp, TxRef};
use serde::{Deserialize, Serialize};

/// Why a ticket was queued.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepairCause {
    /// The ledger confirmed the vote but the mirror write failed.
    MirrorWriteFailed,
    /// Inclusion was not observed before the confirmation timeout.
    AwaitingInclusion,
    /// A `CreatePoll` call timed out; the mirror poll is still `Created`.
    AwaitingPollCreation,
    /// An `ExtendPoll` call timed out; the mirror keeps the old end time.
    AwaitingPollExtension,
}

impl RepairCause {
    /// Whether the ticket stands for a vote rather than a poll-management call.
    pub fn is_vote(self) -> bool {
        matches!(self, Self::MirrorWriteFailed | Self::AwaitingInclusion)
    }
}

/// A submission whose mirror effect is still outstanding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairTicket {
    pub tx_ref: TxRef,
    pub poll_id: PollId,
    /// The voter, or the poll creator for poll-management tickets.
    pub voter: AccountAddress,
    /// Zero for poll-management tickets.
    pub option_index: u32,
    pub cause: RepairCause,
    /// Reconciler passes that failed to resolve this ticket.
    pub attempts: u32,
    pub queued_at: Timestamp,
}

/// Trait for repair-ticket storage, keyed by transaction reference.
pub trait RepairStore {
    /// Insert or replace the ticket for `ticket.tx_ref`.
    fn put_repair(&self, ticket: &RepairTicket) -> Result<(), StoreError>;

    fn get_repair(&self, tx_ref: &TxRef) -> Result<Option<RepairTicket>, StoreError>;

    fn list_repairs(&self) -> Result<Vec<RepairTicket>, StoreError>;

    /// Remove a resolved ticket. Deleting a missing ticket is not an error.
    fn delete_repair(&self, tx_ref: &TxRef) -> Result<(), StoreError>;
}
