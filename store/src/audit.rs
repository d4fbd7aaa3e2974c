//! Reconciler bookkeeping.

use crate::StoreError;
use ballot_types::{PollId, Timestamp};
use serde::{Deserialize, Serialize};

/// The ledger total seen at the last clean audit of a poll.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditMark {
    pub ledger_total: u64,
    pub audited_at: Timestamp,
}

pub trait AuditStore {
    fn get_audit_mark(&self, poll: PollId) -> Result<Option<AuditMark>, StoreError>;

    fn put_audit_mark(&self, poll: PollId, mark: &AuditMark) -> Result<(), StoreError>;
}
