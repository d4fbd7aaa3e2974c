//! Background repair of the mirror against ledger truth.
//!
//! Each pass:
//! 1. resolves repair tickets: failed mirror writes, and timed-out votes,
//!    poll creations and poll extensions whose receipts have since appeared
//! 2. copies a later ledger end time onto active mirror polls, before lazy
//!    deactivation can end them on the old one
//! 3. audits every poll whose ledger total moved since its last clean audit,
//!    replaying missing votes from the ledger's vote events
//! 4. applies ledger-reported deactivation
//!
//! A mirror tally above the ledger's is never corrected here: it means some
//! other path counted a vote the ledger does not have.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ballot_ledger::{ContractEvent, LedgerClient, Receipt, ReceiptStatus};
use ballot_store::{AuditMark, MirrorStore, RecordOutcome, RepairCause, RepairTicket};
use ballot_types::{Clock, LedgerPollId, Poll, PollId, PollStatus, Vote};
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::Instrument;

use crate::events::{EndCause, EventBus, MirrorEvent};
use crate::lifecycle::PollLifecycle;
use crate::mirror::MirrorWriter;
use crate::tracing_spans::reconcile_span;
use crate::{RelayError, RelayMetrics};

/// Summary of one reconciler pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub tickets_resolved: usize,
    /// Tickets whose transaction reverted; nothing to mirror.
    pub tickets_discarded: usize,
    pub tickets_pending: usize,
    /// Pending tickets at or past the attempt limit.
    pub tickets_stale: usize,
    pub votes_replayed: usize,
    /// `Created` polls activated from a late creation receipt.
    pub polls_activated: usize,
    pub polls_extended: usize,
    pub polls_audited: usize,
    pub polls_unchanged: usize,
    pub polls_ended: usize,
    pub mirror_ahead: Vec<PollId>,
    pub audit_failures: usize,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.mirror_ahead.is_empty()
            && self.audit_failures == 0
            && self.tickets_pending == 0
    }
}

pub struct Reconciler<L, S> {
    ledger: Arc<L>,
    store: Arc<S>,
    mirror: MirrorWriter<S>,
    lifecycle: PollLifecycle<S>,
    clock: Arc<dyn Clock>,
    events: Arc<EventBus>,
    metrics: Arc<RelayMetrics>,
    max_attempts: u32,
    passes: AtomicU64,
}

impl<L: LedgerClient, S: MirrorStore> Reconciler<L, S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ledger: Arc<L>,
        store: Arc<S>,
        mirror: MirrorWriter<S>,
        lifecycle: PollLifecycle<S>,
        clock: Arc<dyn Clock>,
        events: Arc<EventBus>,
        metrics: Arc<RelayMetrics>,
        max_attempts: u32,
    ) -> Self {
        Self {
            ledger,
            store,
            mirror,
            lifecycle,
            clock,
            events,
            metrics,
            max_attempts,
            passes: AtomicU64::new(0),
        }
    }

    /// Run passes every `interval` until shutdown is signalled.
    pub async fn run(&self, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("reconciler stopping");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        tracing::warn!(error = %e, "reconciler pass failed");
                    }
                }
            }
        }
    }

    /// One full pass.
    pub async fn run_once(&self) -> Result<ReconcileReport, RelayError> {
        let pass = self.passes.fetch_add(1, Ordering::Relaxed) + 1;
        async {
            let mut report = ReconcileReport::default();
            self.resolve_tickets(&mut report).await?;
            for poll in self.store.list_polls()? {
                let id = poll.id;
                if let Err(e) = self.audit_poll(poll, &mut report).await {
                    tracing::warn!(poll = %id, error = %e, "poll audit failed");
                    report.audit_failures += 1;
                }
            }
            tracing::info!(
                resolved = report.tickets_resolved,
                pending = report.tickets_pending,
                replayed = report.votes_replayed,
                audited = report.polls_audited,
                ended = report.polls_ended,
                mirror_ahead = report.mirror_ahead.len(),
                "reconciler pass complete"
            );
            Ok(report)
        }
        .instrument(reconcile_span(pass))
        .await
    }

    // ── Repair tickets ──────────────────────────────────────────────────

    async fn resolve_tickets(&self, report: &mut ReconcileReport) -> Result<(), RelayError> {
        for ticket in self.store.list_repairs()? {
            let cause = ticket.cause;
            if cause.is_vote()
                && self
                    .store
                    .get_vote(ticket.poll_id, &ticket.voter)?
                    .is_some()
            {
                // Absorbed through another path already.
                self.store.delete_repair(&ticket.tx_ref)?;
                report.tickets_resolved += 1;
                continue;
            }

            if cause == RepairCause::MirrorWriteFailed {
                self.apply_ticket(ticket, report)?;
                continue;
            }
            match self.ledger.fetch_receipt(&ticket.tx_ref).await {
                Ok(Some(receipt)) => self.settle_ticket(ticket, &receipt, report)?,
                Ok(None) if cause == RepairCause::AwaitingInclusion => {
                    self.check_counted_elsewhere(ticket, report).await?
                }
                Ok(None) => self.defer_ticket(ticket, report)?,
                Err(e) => {
                    tracing::debug!(tx = %ticket.tx_ref, error = %e, "receipt lookup failed");
                    self.defer_ticket(ticket, report)?;
                }
            }
        }
        Ok(())
    }

    /// Apply the receipt of a timed-out submission.
    fn settle_ticket(
        &self,
        ticket: RepairTicket,
        receipt: &Receipt,
        report: &mut ReconcileReport,
    ) -> Result<(), RelayError> {
        if let ReceiptStatus::Reverted(reason) = &receipt.status {
            tracing::info!(tx = %ticket.tx_ref, cause = ?ticket.cause, %reason, "timed-out submission reverted");
            if ticket.cause == RepairCause::AwaitingPollCreation {
                self.lifecycle.end(ticket.poll_id, EndCause::CreationFailed)?;
            }
            self.store.delete_repair(&ticket.tx_ref)?;
            report.tickets_discarded += 1;
            return Ok(());
        }

        let cause = ticket.cause;
        match cause {
            RepairCause::MirrorWriteFailed | RepairCause::AwaitingInclusion => {
                return self.apply_ticket(ticket, report)
            }
            RepairCause::AwaitingPollCreation => self.finish_creation(&ticket, receipt, report)?,
            RepairCause::AwaitingPollExtension => self.finish_extension(&ticket, receipt, report)?,
        }
        self.store.delete_repair(&ticket.tx_ref)?;
        report.tickets_resolved += 1;
        Ok(())
    }

    fn finish_creation(
        &self,
        ticket: &RepairTicket,
        receipt: &Receipt,
        report: &mut ReconcileReport,
    ) -> Result<(), RelayError> {
        let Some(poll) = self.store.get_poll(ticket.poll_id)? else {
            return Ok(());
        };
        if poll.status != PollStatus::Created {
            tracing::warn!(poll = %poll.id, status = ?poll.status, tx = %ticket.tx_ref, "creation landed after the mirror poll left Created");
            return Ok(());
        }
        match receipt.created_poll() {
            Some((ledger_id, ledger_end)) => {
                let active = self.lifecycle.activate(poll.id, ledger_id)?;
                if ledger_end.is_after(active.end_time) {
                    self.lifecycle.extend(poll.id, ledger_end)?;
                }
                report.polls_activated += 1;
                tracing::info!(poll = %poll.id, ledger_poll = %ledger_id, tx = %ticket.tx_ref, "timed-out creation confirmed");
            }
            None => {
                self.alarm(
                    poll.id,
                    format!("creation {} succeeded without a PollCreated event", ticket.tx_ref),
                );
                self.lifecycle.end(poll.id, EndCause::CreationFailed)?;
            }
        }
        Ok(())
    }

    fn finish_extension(
        &self,
        ticket: &RepairTicket,
        receipt: &Receipt,
        report: &mut ReconcileReport,
    ) -> Result<(), RelayError> {
        let ledger_end = receipt.events().iter().find_map(|e| match e {
            ContractEvent::PollExtended { end_time, .. } => Some(*end_time),
            _ => None,
        });
        let (Some(ledger_end), Some(poll)) = (ledger_end, self.store.get_poll(ticket.poll_id)?) else {
            return Ok(());
        };
        if poll.status == PollStatus::Active && ledger_end.is_after(poll.end_time) {
            self.lifecycle.extend(poll.id, ledger_end)?;
            report.polls_extended += 1;
        } else if poll.status == PollStatus::Ended {
            self.alarm(
                poll.id,
                format!("extension {} to {ledger_end} landed after the mirror poll ended", ticket.tx_ref),
            );
        }
        Ok(())
    }

    /// No receipt under the ticket's reference. If the ledger counts the
    /// voter anyway, the vote-event replay in the audit records it.
    async fn check_counted_elsewhere(
        &self,
        ticket: RepairTicket,
        report: &mut ReconcileReport,
    ) -> Result<(), RelayError> {
        let ledger_id = self
            .store
            .get_poll(ticket.poll_id)?
            .and_then(|p| p.ledger_poll_id);
        if let Some(ledger_id) = ledger_id {
            match self.ledger.has_voted(ledger_id, &ticket.voter).await {
                Ok(true) => {
                    tracing::info!(poll = %ticket.poll_id, voter = %ticket.voter, tx = %ticket.tx_ref, "voter already counted on ledger; leaving the vote to the audit");
                    self.store.delete_repair(&ticket.tx_ref)?;
                    report.tickets_resolved += 1;
                    return Ok(());
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::debug!(tx = %ticket.tx_ref, error = %e, "has_voted lookup failed");
                }
            }
        }
        self.defer_ticket(ticket, report)
    }

    fn apply_ticket(
        &self,
        ticket: RepairTicket,
        report: &mut ReconcileReport,
    ) -> Result<(), RelayError> {
        let vote = Vote {
            poll_id: ticket.poll_id,
            voter: ticket.voter.clone(),
            option_index: ticket.option_index,
            tx_ref: ticket.tx_ref,
            recorded_at: self.clock.now(),
        };
        match self.mirror.apply(&vote) {
            Ok(outcome) => {
                if outcome == RecordOutcome::Recorded {
                    self.metrics.repairs_applied.inc();
                    report.votes_replayed += 1;
                }
                self.store.delete_repair(&ticket.tx_ref)?;
                report.tickets_resolved += 1;
                tracing::info!(poll = %ticket.poll_id, tx = %ticket.tx_ref, ?outcome, "repair ticket resolved");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(tx = %ticket.tx_ref, error = %e, "repair write failed");
                self.defer_ticket(ticket, report)
            }
        }
    }

    fn defer_ticket(
        &self,
        mut ticket: RepairTicket,
        report: &mut ReconcileReport,
    ) -> Result<(), RelayError> {
        ticket.attempts = ticket.attempts.saturating_add(1);
        self.store.put_repair(&ticket)?;
        report.tickets_pending += 1;
        if ticket.attempts >= self.max_attempts {
            report.tickets_stale += 1;
            tracing::error!(
                poll = %ticket.poll_id,
                tx = %ticket.tx_ref,
                attempts = ticket.attempts,
                cause = ?ticket.cause,
                "CONSISTENCY: repair ticket unresolved past attempt limit"
            );
            self.events.emit(&MirrorEvent::ConsistencyAlarm {
                poll: ticket.poll_id,
                detail: format!("ticket {} unresolved after {} passes", ticket.tx_ref, ticket.attempts),
            });
        }
        Ok(())
    }

    // ── Tally audit ─────────────────────────────────────────────────────

    async fn audit_poll(&self, poll: Poll, report: &mut ReconcileReport) -> Result<(), RelayError> {
        let Some(ledger_id) = poll.ledger_poll_id else {
            return Ok(());
        };
        let on_ledger = if poll.status == PollStatus::Active {
            Some(self.ledger.read_poll(ledger_id).await?)
        } else {
            None
        };
        let mut poll = poll;
        if let Some(on_ledger) = &on_ledger {
            // Must run before observe, which would end the poll on the old end time.
            if on_ledger.end_time.is_after(poll.end_time) {
                poll = self.lifecycle.extend(poll.id, on_ledger.end_time)?;
                report.polls_extended += 1;
            }
        }
        let poll = self.lifecycle.observe(poll)?;

        let tallies = self.ledger.read_tallies(ledger_id).await?;
        let ledger_total: u64 = tallies.iter().sum();
        let mark = self.store.get_audit_mark(poll.id)?;
        let unchanged = mark.map_or(false, |m| m.ledger_total == ledger_total)
            && poll.total_votes == ledger_total;

        if unchanged {
            report.polls_unchanged += 1;
        } else {
            report.polls_audited += 1;
            self.compare_and_repair(&poll, ledger_id, &tallies, report)
                .await?;
        }

        let ledger_inactive = on_ledger.is_some_and(|p| !p.active);
        if poll.status == PollStatus::Active
            && ledger_inactive
            && self
                .lifecycle
                .end(poll.id, EndCause::LedgerReported)?
                .transitioned()
        {
            report.polls_ended += 1;
        }
        Ok(())
    }

    async fn compare_and_repair(
        &self,
        poll: &Poll,
        ledger_id: LedgerPollId,
        ledger_tallies: &[u64],
        report: &mut ReconcileReport,
    ) -> Result<(), RelayError> {
        let mirror_tallies = poll.tallies();
        if mirror_tallies.len() != ledger_tallies.len() {
            self.alarm(
                poll.id,
                format!(
                    "option count differs: mirror {} ledger {}",
                    mirror_tallies.len(),
                    ledger_tallies.len()
                ),
            );
            return Ok(());
        }

        let ahead: Vec<usize> = mirror_tallies
            .iter()
            .zip(ledger_tallies)
            .enumerate()
            .filter(|(_, (m, l))| m > l)
            .map(|(i, _)| i)
            .collect();
        if !ahead.is_empty() {
            self.metrics.mirror_ahead_alarms.inc();
            report.mirror_ahead.push(poll.id);
            self.alarm(
                poll.id,
                format!(
                    "mirror ahead of ledger on options {ahead:?}: mirror {mirror_tallies:?} ledger {ledger_tallies:?}"
                ),
            );
            return Ok(());
        }

        if mirror_tallies.as_slice() != ledger_tallies {
            for event in self.ledger.read_vote_events(ledger_id).await? {
                if self.store.get_vote(poll.id, &event.voter)?.is_some() {
                    continue;
                }
                let vote = Vote {
                    poll_id: poll.id,
                    voter: event.voter.clone(),
                    option_index: event.option_index,
                    tx_ref: event.tx_ref,
                    recorded_at: self.clock.now(),
                };
                if self.mirror.apply(&vote)? == RecordOutcome::Recorded {
                    self.metrics.repairs_applied.inc();
                    report.votes_replayed += 1;
                    self.store.delete_repair(&event.tx_ref)?;
                    tracing::info!(poll = %poll.id, voter = %event.voter, tx = %event.tx_ref, "replayed ledger vote");
                }
            }

            let after = self
                .store
                .get_poll(poll.id)?
                .map(|p| p.tallies())
                .unwrap_or_default();
            if after.as_slice() != ledger_tallies {
                self.alarm(
                    poll.id,
                    format!("still diverged after replay: mirror {after:?} ledger {ledger_tallies:?}"),
                );
                return Ok(());
            }
        }

        self.store.put_audit_mark(
            poll.id,
            &AuditMark {
                ledger_total: ledger_tallies.iter().sum(),
                audited_at: self.clock.now(),
            },
        )?;
        Ok(())
    }

    fn alarm(&self, poll: PollId, detail: String) {
        tracing::error!(poll = %poll, %detail, "CONSISTENCY: mirror and ledger disagree");
        self.events
            .emit(&MirrorEvent::ConsistencyAlarm { poll, detail });
    }
}
