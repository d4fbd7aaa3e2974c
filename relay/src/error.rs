use ballot_ledger::{LedgerError, RevertReason};
use ballot_store::StoreError;
use ballot_types::{AccountAddress, PollId, RelayNonce, TxRef, VoterNonce};
use thiserror::Error;

/// Where a voter-nonce mismatch was detected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplayStage {
    /// Fresh ledger read before submission.
    PreCheck,
    /// Contract revert after inclusion.
    Ledger,
}

/// Reasons an intent is rejected before any ledger interaction.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} does not exist")]
    PollNotFound(PollId),

    #[error("{0} is not open for voting yet")]
    PollNotActive(PollId),

    #[error("{0} has ended")]
    PollEnded(PollId),

    #[error("{0} has no ledger counterpart")]
    PollNotOnLedger(PollId),

    #[error("option {index} out of range ({count} options)")]
    OptionOutOfRange { index: u32, count: u32 },

    #[error("{voter} already voted on {poll}")]
    AlreadyRecorded { poll: PollId, voter: AccountAddress },

    #[error("malformed signature: {0}")]
    MalformedSignature(String),

    #[error("intent targets {provided}, relay submits to {expected}")]
    WrongRelayTarget {
        expected: AccountAddress,
        provided: AccountAddress,
    },

    #[error("question must not be empty")]
    EmptyQuestion,

    #[error("a poll needs between {min} and {max} non-empty options, got {got}")]
    InvalidOptions { min: usize, max: usize, got: usize },

    #[error("duration must be between {min}s and {max}s, got {got}s")]
    InvalidDuration { min: u64, max: u64, got: u64 },
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("voter nonce mismatch at {stage:?}: expected {expected}, provided {provided}")]
    Replay {
        expected: VoterNonce,
        provided: VoterNonce,
        stage: ReplayStage,
    },

    #[error("ledger reverted {tx_ref}: {reason}")]
    Submission { reason: RevertReason, tx_ref: TxRef },

    #[error("{tx_ref} (relay nonce {relay_nonce}) not included yet; check back later")]
    Timeout {
        tx_ref: TxRef,
        relay_nonce: RelayNonce,
    },

    /// The ledger confirmed the vote but the mirror did not absorb it.
    #[error("mirror write failed for {voter} on {poll} ({tx_ref}): {cause}")]
    Consistency {
        poll: PollId,
        voter: AccountAddress,
        tx_ref: TxRef,
        cause: String,
        repair_queued: bool,
    },

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("submission lane unavailable: waited {waited_secs}s")]
    LaneUnavailable { waited_secs: u64 },

    #[error("{caller} is not allowed to modify {poll}")]
    Unauthorized { poll: PollId, caller: AccountAddress },

    #[error("config error: {0}")]
    Config(String),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl RelayError {
    pub fn is_replay(&self) -> bool {
        matches!(self, Self::Replay { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
