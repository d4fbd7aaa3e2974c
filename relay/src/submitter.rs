//! Single-lane submission of sponsored transactions.
//!
//! Each submission holds the relay nonce lease from signing until the
//! ledger reports inclusion or the confirmation timeout elapses. Nothing in
//! here writes to the mirror.

use std::sync::Arc;

use ballot_crypto::{derive_address, public_from_private};
use ballot_ledger::{
    ContractCall, LedgerClient, LedgerError, Receipt, ReceiptStatus, RevertReason,
    SponsoredTransaction,
};
use ballot_types::{AccountAddress, PrivateKey, RelayNonce, TxRef};
use tokio::time::Instant;
use tracing::{field, Instrument, Span};

use crate::config::RelaySettings;
use crate::nonce::NonceGuard;
use crate::tracing_spans::submit_span;
use crate::verifier::VerifiedIntent;
use crate::{RelayError, RelayMetrics};

/// The relay's signing account. Constructed once and held by the submitter.
pub struct RelayAccount {
    address: AccountAddress,
    key: PrivateKey,
}

impl RelayAccount {
    pub fn from_key(key: PrivateKey) -> Self {
        let address = derive_address(&public_from_private(&key));
        Self { address, key }
    }

    pub fn address(&self) -> &AccountAddress {
        &self.address
    }
}

/// What happened to a submitted transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Included and executed successfully.
    Confirmed(Receipt),
    /// Included but reverted by the contract.
    Rejected {
        tx_ref: TxRef,
        relay_nonce: RelayNonce,
        reason: RevertReason,
    },
    /// Accepted but not included within the confirmation timeout. It may
    /// still land; it must not be resubmitted.
    TimedOut {
        tx_ref: TxRef,
        relay_nonce: RelayNonce,
    },
}

pub struct RelaySubmitter<L> {
    ledger: Arc<L>,
    nonces: Arc<NonceGuard<L>>,
    account: Arc<RelayAccount>,
    settings: RelaySettings,
    metrics: Arc<RelayMetrics>,
}

impl<L> Clone for RelaySubmitter<L> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
            nonces: Arc::clone(&self.nonces),
            account: Arc::clone(&self.account),
            settings: self.settings.clone(),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

impl<L: LedgerClient> RelaySubmitter<L> {
    pub fn new(
        ledger: Arc<L>,
        nonces: Arc<NonceGuard<L>>,
        account: Arc<RelayAccount>,
        settings: RelaySettings,
        metrics: Arc<RelayMetrics>,
    ) -> Self {
        Self {
            ledger,
            nonces,
            account,
            settings,
            metrics,
        }
    }

    pub fn relay_address(&self) -> &AccountAddress {
        self.account.address()
    }

    /// Submit a verified vote intent as a `voteWithSig` call.
    pub async fn submit(&self, intent: &VerifiedIntent) -> Result<SubmitOutcome, RelayError> {
        self.submit_call(ContractCall::VoteWithSig {
            poll: intent.ledger_poll_id,
            option_index: intent.option_index,
            voter: intent.voter.clone(),
            voter_nonce: intent.voter_nonce,
            signature: intent.signature.clone(),
        })
        .await
    }

    /// Submit any contract call through the lane.
    pub async fn submit_call(&self, call: ContractCall) -> Result<SubmitOutcome, RelayError> {
        let span = submit_span(call.name());
        self.submit_in_lane(call).instrument(span).await
    }

    async fn submit_in_lane(&self, call: ContractCall) -> Result<SubmitOutcome, RelayError> {
        self.metrics.lane_waiters.inc();
        let waited =
            tokio::time::timeout(self.settings.lane_timeout, self.nonces.next_relay_nonce()).await;
        self.metrics.lane_waiters.dec();
        let lease = match waited {
            Ok(lease) => lease?,
            Err(_) => {
                return Err(RelayError::LaneUnavailable {
                    waited_secs: self.settings.lane_timeout.as_secs(),
                })
            }
        };

        let relay_nonce = lease.nonce();
        let tx = SponsoredTransaction {
            from: self.account.address.clone(),
            contract: self.settings.contract.clone(),
            nonce: relay_nonce,
            gas_limit: self.settings.gas_ceiling,
            call,
        };
        let signed = match tx.sign(&self.account.key) {
            Ok(signed) => signed,
            Err(e) => {
                lease.unused();
                return Err(e.into());
            }
        };
        let tx_ref = signed.tx_ref;
        Span::current()
            .record("relay_nonce", relay_nonce.get())
            .record("tx", field::display(tx_ref));

        self.metrics.submissions.inc();
        let started = Instant::now();
        match self.ledger.submit_transaction(&signed).await {
            Ok(_) => {}
            Err(LedgerError::RelayNonceTooLow { expected, provided }) => {
                tracing::warn!(%expected, %provided, "relay nonce already taken at the ledger");
                lease.taken(expected);
                return Err(LedgerError::RelayNonceTooLow { expected, provided }.into());
            }
            Err(e) if e.is_ambiguous() => {
                match self.ledger.pending_relay_nonce(&self.account.address).await {
                    Ok(pending) if pending > relay_nonce => {
                        tracing::warn!(error = %e, "submission reported an error but the ledger holds it");
                    }
                    Ok(_) => {
                        tracing::warn!(error = %e, "submission did not reach the ledger");
                        lease.unused();
                        return Err(e.into());
                    }
                    Err(lookup) => {
                        tracing::error!(error = %e, lookup = %lookup, "cannot tell whether the ledger took the submission");
                        lease.in_doubt();
                        return Err(e.into());
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "ledger refused the submission");
                lease.unused();
                return Err(e.into());
            }
        }

        let receipt = self.await_receipt(&tx_ref).await;
        // Included or sitting in the ledger's queue: either way the slot is gone.
        lease.consumed();

        let Some(receipt) = receipt else {
            self.metrics.timed_out.inc();
            tracing::warn!(
                timeout_secs = self.settings.confirmation_timeout.as_secs(),
                "inclusion not observed before timeout"
            );
            return Ok(SubmitOutcome::TimedOut {
                tx_ref,
                relay_nonce,
            });
        };

        self.metrics
            .inclusion_latency_ms
            .observe(started.elapsed().as_secs_f64() * 1000.0);
        match receipt.status.clone() {
            ReceiptStatus::Success { .. } => {
                self.metrics.confirmed.inc();
                tracing::info!(block = receipt.block_height, "transaction confirmed");
                Ok(SubmitOutcome::Confirmed(receipt))
            }
            ReceiptStatus::Reverted(reason) => {
                self.metrics.rejected.inc();
                tracing::info!(%reason, "transaction reverted");
                Ok(SubmitOutcome::Rejected {
                    tx_ref,
                    relay_nonce,
                    reason,
                })
            }
        }
    }

    /// Poll for the receipt until the confirmation timeout.
    async fn await_receipt(&self, tx_ref: &TxRef) -> Option<Receipt> {
        let interval = self.settings.receipt_poll_interval;
        let poll = async {
            loop {
                match self.ledger.fetch_receipt(tx_ref).await {
                    Ok(Some(receipt)) => return receipt,
                    Ok(None) => {}
                    Err(e) => tracing::debug!(error = %e, "receipt lookup failed, retrying"),
                }
                tokio::time::sleep(interval).await;
            }
        };
        tokio::time::timeout(self.settings.confirmation_timeout, poll)
            .await
            .ok()
    }
}
