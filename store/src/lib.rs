//! Storage traits for the local mirror.
//!
//! Every backend (LMDB, in-memory for testing) implements these traits. The
//! relay depends only on [`MirrorStore`].
//!
//! The mirror is subordinate to the ledger: tallies only move through
//! [`VoteStore::record_confirmed_vote`], which performs the uniqueness check,
//! tally increments, and vote insert as one durable unit.

pub mod audit;
pub mod error;
pub mod poll;
pub mod repair;
pub mod vote;

pub use audit::{AuditMark, AuditStore};
pub use error::StoreError;
pub use poll::{EndOutcome, PollStore};
pub use repair::{RepairCause, RepairStore, RepairTicket};
pub use vote::{RecordOutcome, VoteStore};

/// Everything the relay needs from a mirror backend.
pub trait MirrorStore: PollStore + VoteStore + RepairStore + AuditStore + Send + Sync {}

impl<T> MirrorStore for T where T: PollStore + VoteStore + RepairStore + AuditStore + Send + Sync {}
