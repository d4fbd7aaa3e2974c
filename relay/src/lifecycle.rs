//! Poll lifecycle: `Created → Active → Ended`.
//!
//! The read path may move a poll to `Ended` when it finds `now > end_time`.
//! Every transition goes through the store's compare-and-set, so running
//! [`PollLifecycle::observe`] zero, one or many times concurrently leaves the
//! same terminal state and emits exactly one [`MirrorEvent::PollEnded`].

use std::sync::Arc;

use ballot_store::{EndOutcome, MirrorStore};
use ballot_types::{Clock, LedgerPollId, Poll, PollId, PollStatus, Timestamp};

use crate::events::{EndCause, EventBus, MirrorEvent};
use crate::{RelayError, RelayMetrics, ValidationError};

pub struct PollLifecycle<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    events: Arc<EventBus>,
    metrics: Arc<RelayMetrics>,
}

impl<S> Clone for PollLifecycle<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            events: Arc::clone(&self.events),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

impl<S: MirrorStore> PollLifecycle<S> {
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

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Load a poll, applying lazy deactivation.
    pub fn load(&self, id: PollId) -> Result<Poll, RelayError> {
        let poll = self
            .store
            .get_poll(id)?
            .ok_or(ValidationError::PollNotFound(id))?;
        self.observe(poll)
    }

    /// Apply lazy deactivation to a poll that was just read.
    pub fn observe(&self, poll: Poll) -> Result<Poll, RelayError> {
        if poll.status == PollStatus::Active && poll.is_past_end(self.clock.now()) {
            return Ok(self.end(poll.id, EndCause::Expired)?.into_poll());
        }
        Ok(poll)
    }

    /// Move a poll to `Ended`. A poll that is already ended is returned
    /// unchanged and no event is emitted.
    pub fn end(&self, id: PollId, cause: EndCause) -> Result<EndOutcome, RelayError> {
        let outcome = self.store.end_poll(id)?;
        if outcome.transitioned() {
            self.metrics.polls_ended.inc();
            tracing::info!(poll = %id, ?cause, "poll ended");
            self.events.emit(&MirrorEvent::PollEnded { poll: id, cause });
        }
        Ok(outcome)
    }

    /// Push the end time of an active poll forward.
    pub fn extend(&self, id: PollId, new_end: Timestamp) -> Result<Poll, RelayError> {
        let poll = self.store.extend_poll(id, new_end)?;
        tracing::info!(poll = %id, end_time = %new_end, "poll extended");
        Ok(poll)
    }

    /// `Created → Active` once the creation transaction is included.
    pub fn activate(&self, id: PollId, ledger_poll_id: LedgerPollId) -> Result<Poll, RelayError> {
        let poll = self.store.activate_poll(id, ledger_poll_id)?;
        self.events.emit(&MirrorEvent::PollActivated { poll: id });
        Ok(poll)
    }
}
