//! Poll creation, explicit end, and extension.
//!
//! All three go through the same submission lane as votes. The mirror only
//! changes after the ledger has included the corresponding call. A creation
//! or extension that times out is queued as a repair ticket, and the
//! reconciler applies its receipt once one appears.

use std::sync::Arc;

use ballot_ledger::{ContractCall, ContractEvent, LedgerClient, RevertReason};
use ballot_store::{MirrorStore, RepairCause, RepairTicket};
use ballot_types::{AccountAddress, Poll, PollId, PollOption, PollStatus, TxRef};
use tracing::Instrument;

use crate::events::EndCause;
use crate::lifecycle::PollLifecycle;
use crate::mirror::MirrorWriter;
use crate::submitter::{RelaySubmitter, SubmitOutcome};
use crate::tracing_spans::poll_span;
use crate::{RelayError, ValidationError};

pub const MIN_OPTIONS: usize = 2;
pub const MAX_OPTIONS: usize = 10;
pub const MIN_DURATION_SECS: u64 = 60;
pub const MAX_DURATION_SECS: u64 = 30 * 24 * 3600;

pub struct PollRegistry<L, S> {
    store: Arc<S>,
    submitter: RelaySubmitter<L>,
    lifecycle: PollLifecycle<S>,
    mirror: MirrorWriter<S>,
}

fn check_duration(secs: u64) -> Result<(), ValidationError> {
    if !(MIN_DURATION_SECS..=MAX_DURATION_SECS).contains(&secs) {
        return Err(ValidationError::InvalidDuration {
            min: MIN_DURATION_SECS,
            max: MAX_DURATION_SECS,
            got: secs,
        });
    }
    Ok(())
}

impl<L: LedgerClient, S: MirrorStore> PollRegistry<L, S> {
    pub fn new(
        store: Arc<S>,
        submitter: RelaySubmitter<L>,
        lifecycle: PollLifecycle<S>,
        mirror: MirrorWriter<S>,
    ) -> Self {
        Self {
            store,
            submitter,
            lifecycle,
            mirror,
        }
    }

    /// Create a poll on the ledger and mirror it.
    ///
    /// The mirror row is written as `Created` first and activated with the
    /// ledger-assigned id once the creation is included. On
    /// [`RelayError::Timeout`] the row stays `Created` until the reconciler
    /// finds the receipt.
    pub async fn create_poll(
        &self,
        creator: &AccountAddress,
        question: &str,
        options: &[String],
        duration_secs: u64,
    ) -> Result<Poll, RelayError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ValidationError::EmptyQuestion.into());
        }
        let options: Vec<String> = options.iter().map(|o| o.trim().to_string()).collect();
        if !(MIN_OPTIONS..=MAX_OPTIONS).contains(&options.len())
            || options.iter().any(|o| o.is_empty())
        {
            return Err(ValidationError::InvalidOptions {
                min: MIN_OPTIONS,
                max: MAX_OPTIONS,
                got: options.iter().filter(|o| !o.is_empty()).count(),
            }
            .into());
        }
        check_duration(duration_secs)?;

        let now = self.lifecycle.now();
        let poll = Poll {
            id: self.store.next_poll_id()?,
            question: question.to_string(),
            options: options.iter().map(PollOption::new).collect(),
            creator: creator.clone(),
            created_at: now,
            end_time: now.plus_secs(duration_secs),
            status: PollStatus::Created,
            ledger_poll_id: None,
            total_votes: 0,
        };
        self.store.insert_poll(&poll)?;
        let id = poll.id;

        async move {
            let call = ContractCall::CreatePoll {
                question: poll.question.clone(),
                options,
                duration_secs,
            };
            match self.submitter.submit_call(call).await? {
                SubmitOutcome::Confirmed(receipt) => {
                    let Some((ledger_id, ledger_end)) = receipt.created_poll() else {
                        self.lifecycle.end(id, EndCause::CreationFailed)?;
                        return Err(RelayError::Submission {
                            reason: RevertReason::Other("no PollCreated event in receipt".into()),
                            tx_ref: receipt.tx_ref,
                        });
                    };
                    let mut active = self.lifecycle.activate(id, ledger_id)?;
                    if ledger_end.is_after(active.end_time) {
                        active = self.lifecycle.extend(id, ledger_end)?;
                    }
                    tracing::info!(ledger_poll = %ledger_id, creator = %active.creator, "poll created");
                    Ok(active)
                }
                SubmitOutcome::Rejected { tx_ref, reason, .. } => {
                    self.lifecycle.end(id, EndCause::CreationFailed)?;
                    Err(RelayError::Submission { reason, tx_ref })
                }
                SubmitOutcome::TimedOut {
                    tx_ref,
                    relay_nonce,
                } => {
                    self.track(tx_ref, id, creator, RepairCause::AwaitingPollCreation);
                    Err(RelayError::Timeout {
                        tx_ref,
                        relay_nonce,
                    })
                }
            }
        }
        .instrument(poll_span("create", id))
        .await
    }

    /// End a poll early. Only the creator may do this; ending an ended poll
    /// is a no-op.
    pub async fn end_poll(&self, id: PollId, caller: &AccountAddress) -> Result<Poll, RelayError> {
        async {
            let poll = self.authorized(id, caller)?;
            match poll.status {
                PollStatus::Ended => return Ok(poll),
                PollStatus::Created => {
                    return Ok(self.lifecycle.end(id, EndCause::Explicit)?.into_poll())
                }
                PollStatus::Active => {}
            }
            let ledger_id = poll
                .ledger_poll_id
                .ok_or(ValidationError::PollNotOnLedger(id))?;

            match self
                .submitter
                .submit_call(ContractCall::EndPoll { poll: ledger_id })
                .await?
            {
                SubmitOutcome::Confirmed(_)
                | SubmitOutcome::Rejected {
                    reason: RevertReason::PollEnded,
                    ..
                } => Ok(self.lifecycle.end(id, EndCause::Explicit)?.into_poll()),
                SubmitOutcome::Rejected { tx_ref, reason, .. } => {
                    Err(RelayError::Submission { reason, tx_ref })
                }
                SubmitOutcome::TimedOut {
                    tx_ref,
                    relay_nonce,
                } => Err(RelayError::Timeout {
                    tx_ref,
                    relay_nonce,
                }),
            }
        }
        .instrument(poll_span("end", id))
        .await
    }

    /// Push the end time of an active poll forward by `additional_secs`.
    pub async fn extend_poll(
        &self,
        id: PollId,
        caller: &AccountAddress,
        additional_secs: u64,
    ) -> Result<Poll, RelayError> {
        async {
            check_duration(additional_secs)?;
            let poll = self.authorized(id, caller)?;
            match poll.status {
                PollStatus::Active => {}
                PollStatus::Created => return Err(ValidationError::PollNotActive(id).into()),
                PollStatus::Ended => return Err(ValidationError::PollEnded(id).into()),
            }
            let ledger_id = poll
                .ledger_poll_id
                .ok_or(ValidationError::PollNotOnLedger(id))?;

            let call = ContractCall::ExtendPoll {
                poll: ledger_id,
                additional_secs,
            };
            match self.submitter.submit_call(call).await? {
                SubmitOutcome::Confirmed(receipt) => {
                    let ledger_end = receipt.events().iter().find_map(|e| match e {
                        ContractEvent::PollExtended { end_time, .. } => Some(*end_time),
                        _ => None,
                    });
                    let new_end = match ledger_end {
                        Some(end) if end.is_after(poll.end_time) => end,
                        _ => poll.end_time.plus_secs(additional_secs),
                    };
                    self.lifecycle.extend(id, new_end)
                }
                SubmitOutcome::Rejected {
                    tx_ref,
                    reason: RevertReason::PollEnded,
                    ..
                } => {
                    self.lifecycle.end(id, EndCause::LedgerReported)?;
                    Err(RelayError::Submission {
                        reason: RevertReason::PollEnded,
                        tx_ref,
                    })
                }
                SubmitOutcome::Rejected { tx_ref, reason, .. } => {
                    Err(RelayError::Submission { reason, tx_ref })
                }
                SubmitOutcome::TimedOut {
                    tx_ref,
                    relay_nonce,
                } => {
                    self.track(tx_ref, id, caller, RepairCause::AwaitingPollExtension);
                    Err(RelayError::Timeout {
                        tx_ref,
                        relay_nonce,
                    })
                }
            }
        }
        .instrument(poll_span("extend", id))
        .await
    }

    fn authorized(&self, id: PollId, caller: &AccountAddress) -> Result<Poll, RelayError> {
        let poll = self.lifecycle.load(id)?;
        if &poll.creator != caller {
            return Err(RelayError::Unauthorized {
                poll: id,
                caller: caller.clone(),
            });
        }
        Ok(poll)
    }

    fn track(&self, tx_ref: TxRef, id: PollId, creator: &AccountAddress, cause: RepairCause) {
        self.mirror.queue_repair(RepairTicket {
            tx_ref,
            poll_id: id,
            voter: creator.clone(),
            option_index: 0,
            cause,
            attempts: 0,
            queued_at: self.lifecycle.now(),
        });
    }
}
