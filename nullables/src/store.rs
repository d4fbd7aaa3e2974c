//! Nullable mirror store: thread-safe in-memory storage for testing.
//!
//! All state sits behind one mutex so every trait method is a single atomic
//! unit, matching the transactional guarantees of the LMDB backend.

use ballot_store::{
    AuditMark, AuditStore, EndOutcome, PollStore, RecordOutcome, RepairStore, RepairTicket,
    StoreError, VoteStore,
};
use ballot_types::{
    AccountAddress, LedgerPollId, Poll, PollId, PollStatus, Timestamp, TxRef, Vote,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

#[derive(Default)]
struct MirrorState {
    next_poll_id: u64,
    polls: BTreeMap<PollId, Poll>,
    votes: BTreeMap<(PollId, AccountAddress), Vote>,
    tx_votes: HashMap<TxRef, (PollId, AccountAddress)>,
    repairs: BTreeMap<TxRef, RepairTicket>,
    audit: HashMap<PollId, AuditMark>,
    fail_vote_writes: u32,
    fail_repair_writes: u32,
    end_transitions: u64,
}

/// An in-memory [`ballot_store::MirrorStore`] with fault injection.
/// Thread-safe for use with tokio's multi-threaded runtime.
pub struct NullMirrorStore {
    state: Mutex<MirrorState>,
}

impl NullMirrorStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MirrorState {
                next_poll_id: 1,
                ..MirrorState::default()
            }),
        }
    }

    /// Make the next `n` calls to `record_confirmed_vote` fail with a
    /// backend error without writing anything.
    pub fn fail_next_vote_writes(&self, n: u32) {
        self.state.lock().unwrap().fail_vote_writes = n;
    }

    /// Make the next `n` calls to `put_repair` fail.
    pub fn fail_next_repair_writes(&self, n: u32) {
        self.state.lock().unwrap().fail_repair_writes = n;
    }

    /// Number of `→ Ended` transitions actually written.
    pub fn end_transitions(&self) -> u64 {
        self.state.lock().unwrap().end_transitions
    }

    /// Overwrite an option tally directly, bypassing the vote table.
    /// Simulates a mirror that drifted ahead of the ledger.
    pub fn force_tally(&self, poll: PollId, option_index: usize, votes: u64) {
        let mut state = self.state.lock().unwrap();
        if let Some(p) = state.polls.get_mut(&poll) {
            if let Some(opt) = p.options.get_mut(option_index) {
                let delta = votes as i64 - opt.votes as i64;
                opt.votes = votes;
                p.total_votes = (p.total_votes as i64 + delta).max(0) as u64;
            }
        }
    }

    /// Insert a poll with the next id and return it.
    pub fn seed_poll(&self, mut poll: Poll) -> Poll {
        let mut state = self.state.lock().unwrap();
        poll.id = PollId::new(state.next_poll_id);
        state.next_poll_id += 1;
        state.polls.insert(poll.id, poll.clone());
        poll
    }

    fn update_poll<F>(&self, id: PollId, f: F) -> Result<(Poll, bool), StoreError>
    where
        F: FnOnce(&mut Poll) -> Result<bool, StoreError>,
    {
        let mut state = self.state.lock().unwrap();
        let stored = state
            .polls
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let mut poll = stored.clone();
        let changed = f(&mut poll)?;
        if changed {
            *stored = poll.clone();
        }
        Ok((poll, changed))
    }
}

impl Default for NullMirrorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PollStore for NullMirrorStore {
    fn next_poll_id(&self) -> Result<PollId, StoreError> {
        let mut state = self.state.lock().unwrap();
        let id = PollId::new(state.next_poll_id);
        state.next_poll_id += 1;
        Ok(id)
    }

    fn insert_poll(&self, poll: &Poll) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.polls.contains_key(&poll.id) {
            return Err(StoreError::Duplicate(poll.id.to_string()));
        }
        state.polls.insert(poll.id, poll.clone());
        Ok(())
    }

    fn get_poll(&self, id: PollId) -> Result<Option<Poll>, StoreError> {
        Ok(self.state.lock().unwrap().polls.get(&id).cloned())
    }

    fn list_polls(&self) -> Result<Vec<Poll>, StoreError> {
        Ok(self.state.lock().unwrap().polls.values().cloned().collect())
    }

    fn activate_poll(
        &self,
        id: PollId,
        ledger_poll_id: LedgerPollId,
    ) -> Result<Poll, StoreError> {
        let (poll, _) = self.update_poll(id, |poll| {
            if poll.status != PollStatus::Created {
                return Err(StoreError::Conflict(format!(
                    "{id} is {}, cannot activate",
                    poll.status.as_str()
                )));
            }
            poll.status = PollStatus::Active;
            poll.ledger_poll_id = Some(ledger_poll_id);
            Ok(true)
        })?;
        Ok(poll)
    }

    fn end_poll(&self, id: PollId) -> Result<EndOutcome, StoreError> {
        let (poll, changed) = self.update_poll(id, |poll| {
            if poll.status == PollStatus::Ended {
                return Ok(false);
            }
            poll.status = PollStatus::Ended;
            Ok(true)
        })?;
        if changed {
            self.state.lock().unwrap().end_transitions += 1;
            Ok(EndOutcome::Transitioned(poll))
        } else {
            Ok(EndOutcome::AlreadyEnded(poll))
        }
    }

    fn extend_poll(&self, id: PollId, new_end: Timestamp) -> Result<Poll, StoreError> {
        let (poll, _) = self.update_poll(id, |poll| {
            if poll.status != PollStatus::Active {
                return Err(StoreError::Conflict(format!(
                    "{id} is {}, cannot extend",
                    poll.status.as_str()
                )));
            }
            if !new_end.is_after(poll.end_time) {
                return Err(StoreError::Conflict(format!(
                    "new end {new_end} is not after current end {}",
                    poll.end_time
                )));
            }
            poll.end_time = new_end;
            Ok(true)
        })?;
        Ok(poll)
    }
}

impl VoteStore for NullMirrorStore {
    fn get_vote(&self, poll: PollId, voter: &AccountAddress) -> Result<Option<Vote>, StoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .votes
            .get(&(poll, voter.clone()))
            .cloned())
    }

    fn votes_for_poll(&self, poll: PollId) -> Result<Vec<Vote>, StoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .votes
            .values()
            .filter(|v| v.poll_id == poll)
            .cloned()
            .collect())
    }

    fn find_vote_by_tx(&self, tx_ref: &TxRef) -> Result<Option<Vote>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .tx_votes
            .get(tx_ref)
            .and_then(|key| state.votes.get(key))
            .cloned())
    }

    fn record_confirmed_vote(&self, vote: &Vote) -> Result<RecordOutcome, StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_vote_writes > 0 {
            state.fail_vote_writes -= 1;
            return Err(StoreError::Backend("injected vote write failure".into()));
        }

        let key = (vote.poll_id, vote.voter.clone());
        if state.votes.contains_key(&key) {
            return Ok(RecordOutcome::AlreadyRecorded);
        }

        let poll = state
            .polls
            .get_mut(&vote.poll_id)
            .ok_or_else(|| StoreError::NotFound(vote.poll_id.to_string()))?;
        let option = poll
            .options
            .get_mut(vote.option_index as usize)
            .ok_or_else(|| {
                StoreError::Conflict(format!(
                    "option {} out of range for {}",
                    vote.option_index, vote.poll_id
                ))
            })?;
        option.votes += 1;
        poll.total_votes += 1;

        state.tx_votes.insert(vote.tx_ref, key.clone());
        state.votes.insert(key, vote.clone());
        Ok(RecordOutcome::Recorded)
    }

    fn vote_count(&self) -> Result<u64, StoreError> {
        Ok(self.state.lock().unwrap().votes.len() as u64)
    }
}

impl RepairStore for NullMirrorStore {
    fn put_repair(&self, ticket: &RepairTicket) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_repair_writes > 0 {
            state.fail_repair_writes -= 1;
            return Err(StoreError::Backend("injected repair write failure".into()));
        }
        state.repairs.insert(ticket.tx_ref, ticket.clone());
        Ok(())
    }

    fn get_repair(&self, tx_ref: &TxRef) -> Result<Option<RepairTicket>, StoreError> {
        Ok(self.state.lock().unwrap().repairs.get(tx_ref).cloned())
    }

    fn list_repairs(&self) -> Result<Vec<RepairTicket>, StoreError> {
        Ok(self.state.lock().unwrap().repairs.values().cloned().collect())
    }

    fn delete_repair(&self, tx_ref: &TxRef) -> Result<(), StoreError> {
        self.state.lock().unwrap().repairs.remove(tx_ref);
        Ok(())
    }
}

impl AuditStore for NullMirrorStore {
    fn get_audit_mark(&self, poll: PollId) -> Result<Option<AuditMark>, StoreError> {
        Ok(self.state.lock().unwrap().audit.get(&poll).copied())
    }

    fn put_audit_mark(&self, poll: PollId, mark: &AuditMark) -> Result<(), StoreError> {
        self.state.lock().unwrap().audit.insert(poll, *mark);
        Ok(())
    }
}
