//! Vote storage trait.

use crate::StoreError;
use ballot_types::{AccountAddress, PollId, TxRef, Vote};

/// Result of recording a confirmed ledger vote.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Vote inserted and tallies incremented.
    Recorded,
    /// A vote for this `(poll, voter)` already exists; tallies untouched.
    AlreadyRecorded,
}

/// Trait for the uniqueness-constrained vote table.
pub trait VoteStore {
    fn get_vote(&self, poll: PollId, voter: &AccountAddress) -> Result<Option<Vote>, StoreError>;

    fn votes_for_poll(&self, poll: PollId) -> Result<Vec<Vote>, StoreError>;

    fn find_vote_by_tx(&self, tx_ref: &TxRef) -> Result<Option<Vote>, StoreError>;

    /// Insert `vote` keyed by `(poll_id, voter)` and increment the option
    /// tally and poll total, all in one durable unit.
    ///
    /// On a key collision nothing is written and
    /// [`RecordOutcome::AlreadyRecorded`] is returned. Fails with `NotFound`
    /// for an unknown poll and `Conflict` for an out-of-range option.
    fn record_confirmed_vote(&self, vote: &Vote) -> Result<RecordOutcome, StoreError>;

    fn vote_count(&self) -> Result<u64, StoreError>;
}
