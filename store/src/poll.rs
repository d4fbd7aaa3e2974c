//! Poll storage trait.

use crate::StoreError;
use ballot_types::{LedgerPollId, Poll, PollId, Timestamp};

/// Result of the `Active → Ended` transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EndOutcome {
    /// This call performed the transition.
    Transitioned(Poll),
    /// The poll was already ended; nothing was written.
    AlreadyEnded(Poll),
}

impl EndOutcome {
    pub fn poll(&self) -> &Poll {
        match self {
            Self::Transitioned(p) | Self::AlreadyEnded(p) => p,
        }
    }

    pub fn into_poll(self) -> Poll {
        match self {
            Self::Transitioned(p) | Self::AlreadyEnded(p) => p,
        }
    }

    pub fn transitioned(&self) -> bool {
        matches!(self, Self::Transitioned(_))
    }
}

/// Trait for poll storage operations.
///
/// Status changes are compare-and-set inside the backend so concurrent
/// callers observe a single transition.
pub trait PollStore {
    /// Allocate the next local poll id.
    fn next_poll_id(&self) -> Result<PollId, StoreError>;

    /// Insert a new poll. Fails with `Duplicate` if the id is taken.
    fn insert_poll(&self, poll: &Poll) -> Result<(), StoreError>;

    fn get_poll(&self, id: PollId) -> Result<Option<Poll>, StoreError>;

    /// All polls in id order.
    fn list_polls(&self) -> Result<Vec<Poll>, StoreError>;

    /// `Created → Active`, recording the ledger-assigned id.
    fn activate_poll(&self, id: PollId, ledger_poll_id: LedgerPollId)
        -> Result<Poll, StoreError>;

    /// `Created | Active → Ended`. Idempotent: a second call returns
    /// [`EndOutcome::AlreadyEnded`] without writing.
    fn end_poll(&self, id: PollId) -> Result<EndOutcome, StoreError>;

    /// Move the end time of an `Active` poll forward. Fails with `Conflict`
    /// if the poll is not active or `new_end` is not later than the current
    /// end time.
    fn extend_poll(&self, id: PollId, new_end: Timestamp) -> Result<Poll, StoreError>;
}
