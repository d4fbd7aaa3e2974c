//! The relay façade handed to the HTTP collaborator.
//!
//! `VoteRelay` owns every component and wires them in the order a vote
//! travels: verifier, voter nonce check, submission lane, mirror writer.
//! Reads go through the same lifecycle so lazy deactivation applies
//! everywhere.

use std::sync::Arc;

use ballot_ledger::{LedgerClient, RevertReason};
use ballot_store::{MirrorStore, RecordOutcome, RepairCause, RepairTicket};
use ballot_types::{
    AccountAddress, Clock, Poll, PollId, PollStatus, RelayNonce, TxRef, Vote, VoteIntent,
    VoterNonce,
};
use serde::Serialize;
use tracing::Instrument;

use crate::config::RelaySettings;
use crate::events::{EndCause, EventBus};
use crate::lifecycle::PollLifecycle;
use crate::mirror::MirrorWriter;
use crate::nonce::NonceGuard;
use crate::reconciler::Reconciler;
use crate::registry::PollRegistry;
use crate::submitter::{RelayAccount, RelaySubmitter, SubmitOutcome};
use crate::tracing_spans::vote_span;
use crate::verifier::{IntentVerifier, VerifiedIntent};
use crate::{RelayError, RelayMetrics, ReplayStage};

pub const MAX_PAGE_SIZE: usize = 100;

/// How the mirror absorbed a confirmed vote.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MirrorOutcome {
    Recorded,
    /// Another path (usually the reconciler) got there first.
    AlreadyRecorded,
    /// The write failed; the vote stands on the ledger and the mirror
    /// catches up on a later reconciler pass.
    Deferred { repair_queued: bool },
}

/// Result of a confirmed vote.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VoteReceipt {
    pub tx_ref: TxRef,
    pub relay_nonce: RelayNonce,
    pub block_height: u64,
    pub mirror: MirrorOutcome,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PollView {
    pub poll: Poll,
    pub percentages: Vec<u8>,
    /// Option the viewer voted for, if any.
    pub user_vote: Option<u32>,
    /// `None` when not requested. `Some(false)` also covers an unreachable
    /// ledger.
    pub ledger_verified: Option<bool>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PollFilter {
    Active,
    Ended,
    #[default]
    All,
}

impl PollFilter {
    fn admits(&self, poll: &Poll) -> bool {
        match self {
            Self::Active => poll.status == PollStatus::Active,
            Self::Ended => poll.status == PollStatus::Ended,
            Self::All => true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PollPage {
    pub polls: Vec<Poll>,
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub total_pages: usize,
}

impl PollPage {
    /// Newest first. `page` is 1-based; `limit` is clamped to
    /// `1..=MAX_PAGE_SIZE`.
    fn paginate(mut polls: Vec<Poll>, page: usize, limit: usize) -> Self {
        polls.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let page = page.max(1);
        let total = polls.len();
        let total_pages = total.div_ceil(limit);
        let polls = polls
            .into_iter()
            .skip((page - 1).saturating_mul(limit))
            .take(limit)
            .collect();
        Self {
            polls,
            page,
            limit,
            total,
            total_pages,
        }
    }
}

/// The "check back" answer for a transaction reference.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum VoteStatus {
    Recorded { vote: Vote },
    Pending { ticket: RepairTicket },
    Unknown,
}

pub struct VoteRelay<L, S> {
    contract: AccountAddress,
    ledger: Arc<L>,
    store: Arc<S>,
    lifecycle: PollLifecycle<S>,
    verifier: IntentVerifier<S>,
    nonces: Arc<NonceGuard<L>>,
    submitter: RelaySubmitter<L>,
    mirror: MirrorWriter<S>,
    registry: PollRegistry<L, S>,
    reconciler: Reconciler<L, S>,
    clock: Arc<dyn Clock>,
    metrics: Arc<RelayMetrics>,
}

impl<L: LedgerClient, S: MirrorStore> VoteRelay<L, S> {
    /// Build the relay. The event bus is frozen here; subscribe before
    /// passing it in.
    pub fn new(
        ledger: Arc<L>,
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        account: RelayAccount,
        settings: RelaySettings,
        events: EventBus,
        metrics: Arc<RelayMetrics>,
    ) -> Self {
        let events = Arc::new(events);
        let account = Arc::new(account);
        let lifecycle = PollLifecycle::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            Arc::clone(&events),
            Arc::clone(&metrics),
        );
        let verifier = IntentVerifier::new(
            Arc::clone(&store),
            lifecycle.clone(),
            settings.contract.clone(),
        );
        let nonces = Arc::new(NonceGuard::new(
            Arc::clone(&ledger),
            account.address().clone(),
        ));
        let submitter = RelaySubmitter::new(
            Arc::clone(&ledger),
            Arc::clone(&nonces),
            account,
            settings.clone(),
            Arc::clone(&metrics),
        );
        let mirror = MirrorWriter::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            Arc::clone(&events),
            Arc::clone(&metrics),
        );
        let registry = PollRegistry::new(
            Arc::clone(&store),
            submitter.clone(),
            lifecycle.clone(),
            mirror.clone(),
        );
        let reconciler = Reconciler::new(
            Arc::clone(&ledger),
            Arc::clone(&store),
            mirror.clone(),
            lifecycle.clone(),
            Arc::clone(&clock),
            events,
            Arc::clone(&metrics),
            settings.repair_max_attempts,
        );
        tracing::info!(relay = %submitter.relay_address(), contract = %settings.contract, "vote relay ready");
        Self {
            contract: settings.contract,
            ledger,
            store,
            lifecycle,
            verifier,
            nonces,
            submitter,
            mirror,
            registry,
            reconciler,
            clock,
            metrics,
        }
    }

    pub fn registry(&self) -> &PollRegistry<L, S> {
        &self.registry
    }

    pub fn reconciler(&self) -> &Reconciler<L, S> {
        &self.reconciler
    }

    pub fn metrics(&self) -> &RelayMetrics {
        &self.metrics
    }

    pub fn relay_address(&self) -> &AccountAddress {
        self.submitter.relay_address()
    }

    /// Contract every intent must target.
    pub fn contract(&self) -> &AccountAddress {
        &self.contract
    }

    /// Relay a signed vote intent to the ledger and mirror the outcome.
    ///
    /// Returns only after the ledger has included the transaction. A
    /// [`RelayError::Timeout`] means the transaction may still land; its
    /// reference is tracked and [`VoteRelay::vote_status`] reports it.
    pub async fn cast_vote(&self, intent: VoteIntent) -> Result<VoteReceipt, RelayError> {
        let span = vote_span(intent.poll_id, &intent.voter);
        self.relay_vote(intent).instrument(span).await
    }

    async fn relay_vote(&self, intent: VoteIntent) -> Result<VoteReceipt, RelayError> {
        let verified = match self.verifier.verify(&intent) {
            Ok(v) => v,
            Err(e) => {
                if e.is_validation() {
                    self.metrics.validation_rejections.inc();
                }
                tracing::debug!(error = %e, "intent rejected");
                return Err(e);
            }
        };

        if let Err(e) = self
            .nonces
            .check_voter_nonce(&verified.voter, verified.voter_nonce)
            .await
        {
            if e.is_replay() {
                self.metrics.replay_rejections.inc();
            }
            return Err(e);
        }

        match self.submitter.submit(&verified).await? {
            SubmitOutcome::Confirmed(receipt) => {
                let mirror = match self.mirror.record_confirmed_vote(
                    verified.poll.id,
                    &verified.voter,
                    verified.option_index,
                    receipt.tx_ref,
                ) {
                    Ok(RecordOutcome::Recorded) => MirrorOutcome::Recorded,
                    Ok(RecordOutcome::AlreadyRecorded) => MirrorOutcome::AlreadyRecorded,
                    Err(RelayError::Consistency { repair_queued, .. }) => {
                        MirrorOutcome::Deferred { repair_queued }
                    }
                    Err(e) => return Err(e),
                };
                tracing::info!(tx = %receipt.tx_ref, relay_nonce = %receipt.relay_nonce, ?mirror, "vote relayed");
                Ok(VoteReceipt {
                    tx_ref: receipt.tx_ref,
                    relay_nonce: receipt.relay_nonce,
                    block_height: receipt.block_height,
                    mirror,
                })
            }
            SubmitOutcome::Rejected { tx_ref, reason, .. } => {
                Err(self.classify_rejection(&verified, tx_ref, reason))
            }
            SubmitOutcome::TimedOut {
                tx_ref,
                relay_nonce,
            } => {
                self.mirror.queue_repair(RepairTicket {
                    tx_ref,
                    poll_id: verified.poll.id,
                    voter: verified.voter.clone(),
                    option_index: verified.option_index,
                    cause: RepairCause::AwaitingInclusion,
                    attempts: 0,
                    queued_at: self.clock.now(),
                });
                Err(RelayError::Timeout {
                    tx_ref,
                    relay_nonce,
                })
            }
        }
    }

    fn classify_rejection(
        &self,
        intent: &VerifiedIntent,
        tx_ref: TxRef,
        reason: RevertReason,
    ) -> RelayError {
        match reason {
            RevertReason::InvalidNonce { expected, provided } => {
                self.metrics.replay_rejections.inc();
                tracing::info!(%expected, %provided, tx = %tx_ref, "voter nonce consumed before inclusion");
                RelayError::Replay {
                    expected,
                    provided,
                    stage: ReplayStage::Ledger,
                }
            }
            RevertReason::PollEnded => {
                if let Err(e) = self.lifecycle.end(intent.poll.id, EndCause::LedgerReported) {
                    tracing::warn!(poll = %intent.poll.id, error = %e, "could not end poll locally");
                }
                RelayError::Submission { reason, tx_ref }
            }
            reason => RelayError::Submission { reason, tx_ref },
        }
    }

    /// A poll as the mirror has it, optionally cross-checked against the
    /// ledger's tallies.
    pub async fn poll_view(
        &self,
        id: PollId,
        viewer: Option<&AccountAddress>,
        verify_on_ledger: bool,
    ) -> Result<PollView, RelayError> {
        let poll = self.lifecycle.load(id)?;
        let user_vote = match viewer {
            Some(voter) => self.store.get_vote(id, voter)?.map(|v| v.option_index),
            None => None,
        };
        let ledger_verified = if verify_on_ledger {
            Some(self.matches_ledger(&poll).await)
        } else {
            None
        };
        Ok(PollView {
            percentages: poll.percentages(),
            poll,
            user_vote,
            ledger_verified,
        })
    }

    async fn matches_ledger(&self, poll: &Poll) -> bool {
        let Some(ledger_id) = poll.ledger_poll_id else {
            return false;
        };
        match self.ledger.read_tallies(ledger_id).await {
            Ok(tallies) => tallies == poll.tallies(),
            Err(e) => {
                tracing::warn!(poll = %poll.id, error = %e, "ledger verification unavailable");
                false
            }
        }
    }

    pub fn list_polls(
        &self,
        filter: PollFilter,
        page: usize,
        limit: usize,
    ) -> Result<PollPage, RelayError> {
        let polls = self.observed_polls()?;
        let polls = polls.into_iter().filter(|p| filter.admits(p)).collect();
        Ok(PollPage::paginate(polls, page, limit))
    }

    pub fn polls_by_creator(
        &self,
        creator: &AccountAddress,
        page: usize,
        limit: usize,
    ) -> Result<PollPage, RelayError> {
        let polls = self.observed_polls()?;
        let polls = polls.into_iter().filter(|p| &p.creator == creator).collect();
        Ok(PollPage::paginate(polls, page, limit))
    }

    fn observed_polls(&self) -> Result<Vec<Poll>, RelayError> {
        self.store
            .list_polls()?
            .into_iter()
            .map(|p| self.lifecycle.observe(p))
            .collect()
    }

    /// The voter's next nonce, read fresh from the ledger.
    pub async fn voter_nonce(&self, voter: &AccountAddress) -> Result<VoterNonce, RelayError> {
        self.nonces.current_voter_nonce(voter).await
    }

    pub fn vote_status(&self, tx_ref: &TxRef) -> Result<VoteStatus, RelayError> {
        if let Some(vote) = self.store.find_vote_by_tx(tx_ref)? {
            return Ok(VoteStatus::Recorded { vote });
        }
        Ok(match self.store.get_repair(tx_ref)? {
            Some(ticket) if ticket.cause.is_vote() => VoteStatus::Pending { ticket },
            _ => VoteStatus::Unknown,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{contract, fast_settings, linked_poll, relay_account, voter, world, World};
    use crate::ValidationError;
    use ballot_crypto::{sign_intent, IntentPayload};
    use ballot_ledger::LedgerClient;
    use ballot_nullables::{NullLedger, NullMirrorStore};
    use ballot_store::VoteStore;
    use ballot_types::{PollOption, Timestamp};
    use proptest::prelude::*;

    fn relay(w: &World) -> VoteRelay<NullLedger, NullMirrorStore> {
        VoteRelay::new(
            Arc::clone(&w.ledger),
            Arc::clone(&w.store),
            w.clock.clone(),
            relay_account(),
            fast_settings(),
            EventBus::new(),
            Arc::new(RelayMetrics::new().unwrap()),
        )
    }

    fn intent(seed: u8, poll: &Poll, option_index: u32, nonce: u64) -> VoteIntent {
        let (voter, key) = voter(seed);
        let ledger_poll_id = poll.ledger_poll_id.unwrap();
        let payload = IntentPayload {
            ledger_poll_id,
            option_index,
            voter: voter.clone(),
            voter_nonce: VoterNonce::new(nonce),
            relay_target: contract(),
        };
        VoteIntent {
            poll_id: poll.id,
            option_index,
            voter,
            voter_nonce: VoterNonce::new(nonce),
            relay_target: contract(),
            signature: sign_intent(&payload, &key).to_hex(),
        }
    }

    #[tokio::test]
    async fn confirmed_vote_is_mirrored() {
        let w = world();
        let relay = relay(&w);
        let poll = linked_poll(&w, &["a", "b"], 10_000);
        let receipt = relay.cast_vote(intent(1, &poll, 1, 0)).await.unwrap();
        assert_eq!(receipt.mirror, MirrorOutcome::Recorded);
        let view = relay.poll_view(poll.id, Some(&voter(1).0), true).await.unwrap();
        assert_eq!(view.poll.tallies(), vec![0, 1]);
        assert_eq!(view.percentages, vec![0, 100]);
        assert_eq!(view.user_vote, Some(1));
        assert_eq!(view.ledger_verified, Some(true));
        assert!(matches!(
            relay.vote_status(&receipt.tx_ref).unwrap(),
            VoteStatus::Recorded { .. }
        ));
        assert_eq!(relay.voter_nonce(&voter(1).0).await.unwrap(), VoterNonce::new(1));
    }

    #[tokio::test]
    async fn stale_nonce_rejected_before_submission() {
        let w = world();
        let relay = relay(&w);
        let poll = linked_poll(&w, &["a", "b"], 10_000);
        let err = relay.cast_vote(intent(1, &poll, 0, 3)).await.unwrap_err();
        assert!(matches!(
            err,
            RelayError::Replay {
                stage: ReplayStage::PreCheck,
                ..
            }
        ));
        assert_eq!(w.ledger.receipt_count(), 0);
        assert_eq!(relay.metrics().replay_rejections.get(), 1);
    }

    #[tokio::test]
    async fn mirror_failure_does_not_fail_the_vote() {
        let w = world();
        let relay = relay(&w);
        let poll = linked_poll(&w, &["a", "b"], 10_000);
        w.store.fail_next_vote_writes(1);
        let receipt = relay.cast_vote(intent(1, &poll, 0, 0)).await.unwrap();
        assert_eq!(
            receipt.mirror,
            MirrorOutcome::Deferred {
                repair_queued: true
            }
        );
        assert!(matches!(
            relay.vote_status(&receipt.tx_ref).unwrap(),
            VoteStatus::Pending { .. }
        ));
        relay.reconciler().run_once().await.unwrap();
        assert!(matches!(
            relay.vote_status(&receipt.tx_ref).unwrap(),
            VoteStatus::Recorded { .. }
        ));
    }

    #[tokio::test]
    async fn timed_out_vote_reports_pending() {
        let w = world();
        let relay = relay(&w);
        let poll = linked_poll(&w, &["a", "b"], 10_000);
        w.ledger.pause_inclusion();
        let err = relay.cast_vote(intent(1, &poll, 0, 0)).await.unwrap_err();
        let RelayError::Timeout { tx_ref, .. } = err else {
            panic!("expected timeout, got {err:?}");
        };
        assert!(matches!(
            relay.vote_status(&tx_ref).unwrap(),
            VoteStatus::Pending { .. }
        ));
        assert_eq!(
            relay.vote_status(&TxRef::new([9; 32])).unwrap(),
            VoteStatus::Unknown
        );
    }

    #[tokio::test]
    async fn validation_failures_are_counted() {
        let w = world();
        let relay = relay(&w);
        let poll = linked_poll(&w, &["a", "b"], 10_000);
        let err = relay.cast_vote(intent(1, &poll, 7, 0)).await.unwrap_err();
        assert!(matches!(
            err,
            RelayError::Validation(ValidationError::OptionOutOfRange { .. })
        ));
        assert_eq!(relay.metrics().validation_rejections.get(), 1);
        assert_eq!(w.ledger.receipt_count(), 0);
    }

    #[tokio::test]
    async fn unverified_when_ledger_disagrees() {
        let w = world();
        let relay = relay(&w);
        let poll = linked_poll(&w, &["a", "b"], 10_000);
        w.ledger
            .inject_vote(poll.ledger_poll_id.unwrap(), &voter(5).0, 0);
        let view = relay.poll_view(poll.id, None, true).await.unwrap();
        assert_eq!(view.ledger_verified, Some(false));
        assert_eq!(view.user_vote, None);
        let plain = relay.poll_view(poll.id, None, false).await.unwrap();
        assert_eq!(plain.ledger_verified, None);
    }

    #[tokio::test]
    async fn listing_filters_and_paginates() {
        let w = world();
        let relay = relay(&w);
        for i in 0..5u64 {
            linked_poll(&w, &["a", "b"], 2_000 + i * 1_000);
        }
        w.clock.set(3_500);
        let active = relay.list_polls(PollFilter::Active, 1, 2).unwrap();
        assert_eq!(active.total, 3);
        assert_eq!(active.total_pages, 2);
        assert_eq!(active.polls.len(), 2);
        let ended = relay.list_polls(PollFilter::Ended, 1, 10).unwrap();
        assert_eq!(ended.total, 2);
        let last = relay.list_polls(PollFilter::All, 3, 2).unwrap();
        assert_eq!(last.polls.len(), 1);
        let creator = relay_account().address().clone();
        assert_eq!(relay.polls_by_creator(&creator, 1, 0).unwrap().limit, 1);
        assert_eq!(relay.polls_by_creator(&voter(9).0, 1, 10).unwrap().total, 0);
    }

    #[tokio::test]
    async fn ledger_end_revert_ends_local_poll() {
        let w = world();
        let relay = relay(&w);
        let poll = linked_poll(&w, &["a", "b"], 10_000);
        w.ledger.deactivate_poll(poll.ledger_poll_id.unwrap());
        let err = relay.cast_vote(intent(1, &poll, 0, 0)).await.unwrap_err();
        assert!(matches!(
            err,
            RelayError::Submission {
                reason: RevertReason::PollEnded,
                ..
            }
        ));
        let view = relay.poll_view(poll.id, None, false).await.unwrap();
        assert_eq!(view.poll.status, PollStatus::Ended);
        assert_eq!(w.store.votes_for_poll(poll.id).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn created_poll_accepts_votes() {
        let w = world();
        let relay = relay(&w);
        let creator = voter(3).0;
        let poll = relay
            .registry()
            .create_poll(&creator, "q", &["x".to_string(), "y".to_string()], 600)
            .await
            .unwrap();
        relay.cast_vote(intent(1, &poll, 0, 0)).await.unwrap();
        let tallies = w
            .ledger
            .read_tallies(poll.ledger_poll_id.unwrap())
            .await
            .unwrap();
        assert_eq!(tallies, vec![1, 0]);
    }

    fn listed(i: usize) -> Poll {
        Poll {
            id: PollId::new(i as u64),
            question: format!("q{i}"),
            options: vec![PollOption::new("a"), PollOption::new("b")],
            creator: relay_account().address().clone(),
            created_at: Timestamp::new((i % 4) as u64),
            end_time: Timestamp::new(10_000),
            status: PollStatus::Active,
            ledger_poll_id: None,
            total_votes: 0,
        }
    }

    proptest! {
        /// Walking every page yields each poll exactly once.
        #[test]
        fn pages_partition_the_listing(count in 0usize..40, limit in 1usize..12) {
            let polls: Vec<Poll> = (0..count).map(listed).collect();
            let first = PollPage::paginate(polls.clone(), 1, limit);
            prop_assert_eq!(first.total, count);
            prop_assert_eq!(first.total_pages, count.div_ceil(limit));

            let mut seen = Vec::new();
            for page in 1..=first.total_pages {
                let p = PollPage::paginate(polls.clone(), page, limit);
                prop_assert!(p.polls.len() <= limit);
                seen.extend(p.polls.into_iter().map(|p| p.id));
            }
            prop_assert_eq!(seen.len(), count);
            seen.sort();
            seen.dedup();
            prop_assert_eq!(seen.len(), count);
        }
    }
}
