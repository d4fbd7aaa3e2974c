//! Mirrored poll records.

use serde::{Deserialize, Serialize};

use crate::{AccountAddress, LedgerPollId, PollId, Timestamp};

/// Lifecycle of a poll: `Created → Active → Ended`.
///
/// `Ended` is terminal. Extending a poll only moves the end time of an
/// `Active` poll; nothing moves a poll out of `Ended`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PollStatus {
    /// Persisted locally, creation transaction not yet confirmed on the ledger.
    Created,
    /// Confirmed on the ledger and accepting votes until `end_time`.
    Active,
    /// Closed for voting.
    Ended,
}

impl PollStatus {
    pub fn can_transition_to(&self, next: PollStatus) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Active) | (Self::Created, Self::Ended) | (Self::Active, Self::Ended)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Active => "active",
            Self::Ended => "ended",
        }
    }
}

/// A poll option and its mirrored tally.
///
/// The tally only moves after ledger confirmation, never optimistically.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOption {
    pub text: String,
    pub votes: u64,
}

impl PollOption {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            votes: 0,
        }
    }
}

/// A poll as held in the local mirror.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Poll {
    pub id: PollId,
    pub question: String,
    pub options: Vec<PollOption>,
    pub creator: AccountAddress,
    pub created_at: Timestamp,
    pub end_time: Timestamp,
    pub status: PollStatus,
    /// Assigned once the creation transaction is included on the ledger.
    pub ledger_poll_id: Option<LedgerPollId>,
    /// Sum of all option tallies.
    pub total_votes: u64,
}

impl Poll {
    pub fn is_active(&self) -> bool {
        self.status == PollStatus::Active
    }

    /// Whether the end time has passed (`now > end_time`), regardless of the
    /// stored status.
    pub fn is_past_end(&self, now: Timestamp) -> bool {
        now.is_after(self.end_time)
    }

    /// Whether a vote could be accepted at `now`.
    pub fn accepts_votes(&self, now: Timestamp) -> bool {
        self.is_active() && !self.is_past_end(now)
    }

    pub fn option_count(&self) -> usize {
        self.options.len()
    }

    pub fn tallies(&self) -> Vec<u64> {
        self.options.iter().map(|o| o.votes).collect()
    }

    /// Per-option share of the total in whole percent (0 when no votes).
    pub fn percentages(&self) -> Vec<u8> {
        self.options
            .iter()
            .map(|o| {
                if self.total_votes == 0 {
                    0
                } else {
                    ((o.votes * 100) / self.total_votes) as u8
                }
            })
            .collect()
    }
}
