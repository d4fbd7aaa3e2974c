//! Writes confirmed ledger outcomes into the mirror.
//!
//! The synchronous vote path and the reconciler both go through
//! [`MirrorWriter::apply`], i.e. the store's uniqueness-constrained insert,
//! so a ledger vote is counted at most once however many paths see it.

use std::sync::Arc;

use ballot_store::{MirrorStore, RecordOutcome, RepairCause, RepairTicket, StoreError};
use ballot_types::{AccountAddress, Clock, PollId, TxRef, Vote};

use crate::events::{EventBus, MirrorEvent};
use crate::{RelayError, RelayMetrics};

pub struct MirrorWriter<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    events: Arc<EventBus>,
    metrics: Arc<RelayMetrics>,
}

impl<S> Clone for MirrorWriter<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            events: Arc::clone(&self.events),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

impl<S: MirrorStore> MirrorWriter<S> {
    pub fn new(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        events: Arc<EventBus>,
        metrics: Arc<RelayMetrics>,
    ) -> Self {
        Self {
            store,
            clock,
            events,
            metrics,
        }
    }

    /// Record a vote the ledger has confirmed.
    ///
    /// Only call after the submitter reported `Confirmed`. If the write
    /// fails the outcome is queued for the reconciler and
    /// [`RelayError::Consistency`] is returned; the vote itself stands.
    pub fn record_confirmed_vote(
        &self,
        poll: PollId,
        voter: &AccountAddress,
        option_index: u32,
        tx_ref: TxRef,
    ) -> Result<RecordOutcome, RelayError> {
        let vote = Vote {
            poll_id: poll,
            voter: voter.clone(),
            option_index,
            tx_ref,
            recorded_at: self.clock.now(),
        };
        match self.apply(&vote) {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.metrics.consistency_alarms.inc();
                tracing::error!(
                    poll = %poll,
                    voter = %voter,
                    tx = %tx_ref,
                    error = %e,
                    "CONSISTENCY: ledger confirmed a vote the mirror could not record"
                );
                let repair_queued = self.queue_repair(RepairTicket {
                    tx_ref,
                    poll_id: poll,
                    voter: voter.clone(),
                    option_index,
                    cause: RepairCause::MirrorWriteFailed,
                    attempts: 0,
                    queued_at: self.clock.now(),
                });
                Err(RelayError::Consistency {
                    poll,
                    voter: voter.clone(),
                    tx_ref,
                    cause: e.to_string(),
                    repair_queued,
                })
            }
        }
    }

    /// The single insert path for ledger votes.
    pub(crate) fn apply(&self, vote: &Vote) -> Result<RecordOutcome, StoreError> {
        let outcome = self.store.record_confirmed_vote(vote)?;
        match outcome {
            RecordOutcome::Recorded => {
                tracing::debug!(poll = %vote.poll_id, voter = %vote.voter, tx = %vote.tx_ref, "vote mirrored");
                self.events.emit(&MirrorEvent::VoteRecorded {
                    poll: vote.poll_id,
                    voter: vote.voter.clone(),
                    option_index: vote.option_index,
                    tx_ref: vote.tx_ref,
                });
            }
            RecordOutcome::AlreadyRecorded => {
                tracing::debug!(poll = %vote.poll_id, voter = %vote.voter, "vote already mirrored");
            }
        }
        Ok(outcome)
    }

    /// Persist a repair ticket. Returns whether it was stored; a failure here
    /// leaves the tally audit as the only path to repair.
    pub fn queue_repair(&self, ticket: RepairTicket) -> bool {
        match self.store.put_repair(&ticket) {
            Ok(()) => {
                tracing::warn!(
                    poll = %ticket.poll_id,
                    tx = %ticket.tx_ref,
                    cause = ?ticket.cause,
                    "repair ticket queued"
                );
                self.events.emit(&MirrorEvent::RepairQueued {
                    poll: ticket.poll_id,
                    tx_ref: ticket.tx_ref,
                });
                true
            }
            Err(e) => {
                tracing::error!(
                    poll = %ticket.poll_id,
                    tx = %ticket.tx_ref,
                    error = %e,
                    "could not persist repair ticket; relying on tally audit"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ballot_nullables::{NullClock, NullMirrorStore};
    use ballot_store::{PollStore, RepairStore, VoteStore};
    use ballot_types::{LedgerPollId, Poll, PollOption, PollStatus, Timestamp};

    fn addr(c: char) -> AccountAddress {
        AccountAddress::new(format!("blt_{}", c.to_string().repeat(60)))
    }

    fn setup() -> (Arc<NullMirrorStore>, MirrorWriter<NullMirrorStore>, PollId) {
        let store = Arc::new(NullMirrorStore::new());
        let writer = MirrorWriter::new(
            Arc::clone(&store),
            Arc::new(NullClock::new(500)),
            Arc::new(EventBus::new()),
            Arc::new(RelayMetrics::new().unwrap()),
        );
        let poll = store.seed_poll(Poll {
            id: PollId::new(0),
            question: "q".into(),
            options: vec![PollOption::new("a"), PollOption::new("b")],
            creator: addr('c'),
            created_at: Timestamp::new(0),
            end_time: Timestamp::new(1_000),
            status: PollStatus::Active,
            ledger_poll_id: Some(LedgerPollId::new(0)),
            total_votes: 0,
        });
        (store, writer, poll.id)
    }

    #[test]
    fn confirmed_vote_increments_once() {
        let (store, writer, poll) = setup();
        let tx = TxRef::new([1; 32]);
        assert_eq!(
            writer.record_confirmed_vote(poll, &addr('v'), 1, tx).unwrap(),
            RecordOutcome::Recorded
        );
        assert_eq!(
            writer.record_confirmed_vote(poll, &addr('v'), 1, tx).unwrap(),
            RecordOutcome::AlreadyRecorded
        );
        let stored = store.get_poll(poll).unwrap().unwrap();
        assert_eq!(stored.tallies(), vec![0, 1]);
        assert_eq!(stored.total_votes, 1);
        assert_eq!(store.get_vote(poll, &addr('v')).unwrap().unwrap().recorded_at, Timestamp::new(500));
    }

    #[test]
    fn failed_write_queues_repair() {
        let (store, writer, poll) = setup();
        store.fail_next_vote_writes(1);
        let tx = TxRef::new([2; 32]);
        match writer.record_confirmed_vote(poll, &addr('v'), 0, tx) {
            Err(RelayError::Consistency { repair_queued, .. }) => assert!(repair_queued),
            other => panic!("expected consistency error, got {other:?}"),
        }
        let ticket = store.get_repair(&tx).unwrap().unwrap();
        assert_eq!(ticket.cause, RepairCause::MirrorWriteFailed);
        assert_eq!(ticket.option_index, 0);
        assert_eq!(store.vote_count().unwrap(), 0);
        assert_eq!(writer.metrics.consistency_alarms.get(), 1);
    }

    #[test]
    fn failed_repair_write_is_reported() {
        let (store, writer, poll) = setup();
        store.fail_next_vote_writes(1);
        store.fail_next_repair_writes(1);
        match writer.record_confirmed_vote(poll, &addr('v'), 0, TxRef::new([3; 32])) {
            Err(RelayError::Consistency { repair_queued, .. }) => assert!(!repair_queued),
            other => panic!("expected consistency error, got {other:?}"),
        }
        assert!(store.list_repairs().unwrap().is_empty());
    }
}
