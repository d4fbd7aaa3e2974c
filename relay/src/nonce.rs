//! The two nonce spaces.
//!
//! Voter nonces belong to the contract and are read fresh from the ledger on
//! every check. Relay nonces belong to the relay signing account and are
//! handed out by [`RelayNonceAllocator`], one lease at a time.

use std::sync::Arc;

use ballot_ledger::LedgerClient;
use ballot_types::{AccountAddress, RelayNonce, VoterNonce};
use tokio::sync::{Mutex, MutexGuard};

use crate::{RelayError, ReplayStage};

#[derive(Debug, Default)]
struct LaneState {
    /// Nonce the next lease will carry; `None` until first synced.
    next: Option<RelayNonce>,
    /// Highest nonce known to be taken at the ledger.
    consumed: Option<RelayNonce>,
    /// The last lease ended without a definite outcome.
    in_doubt: bool,
}

impl LaneState {
    fn floor(&self) -> RelayNonce {
        self.consumed.map(|n| n.next()).unwrap_or(RelayNonce::ZERO)
    }

    fn mark_consumed(&mut self, nonce: RelayNonce) {
        if self.consumed.map_or(true, |c| nonce > c) {
            self.consumed = Some(nonce);
        }
    }
}

/// Serialized allocator for the relay account's transaction nonce.
///
/// Holding a [`RelayNonceLease`] holds the lane: other callers queue in
/// arrival order until the lease is settled. No pipelining, so there is at
/// most one allocated-but-unsettled nonce at any time.
pub struct RelayNonceAllocator {
    account: AccountAddress,
    lane: Mutex<LaneState>,
}

impl RelayNonceAllocator {
    pub fn new(account: AccountAddress) -> Self {
        Self {
            account,
            lane: Mutex::new(LaneState::default()),
        }
    }

    pub fn account(&self) -> &AccountAddress {
        &self.account
    }

    /// Wait for the lane and lease the next nonce.
    ///
    /// Resynchronises from the ledger's pending nonce on first use and after
    /// an in-doubt lease, never going below the consumed high-water mark.
    pub async fn acquire<L: LedgerClient>(
        &self,
        ledger: &L,
    ) -> Result<RelayNonceLease<'_>, RelayError> {
        let mut state = self.lane.lock().await;
        let nonce = match state.next {
            Some(n) if !state.in_doubt => n,
            _ => {
                let pending = ledger.pending_relay_nonce(&self.account).await?;
                let next = pending.max(state.floor());
                tracing::info!(
                    account = %self.account,
                    pending = %pending,
                    next = %next,
                    was_in_doubt = state.in_doubt,
                    "relay nonce resynchronised"
                );
                state.next = Some(next);
                state.in_doubt = false;
                next
            }
        };
        Ok(RelayNonceLease {
            state,
            nonce,
            settled: false,
        })
    }
}

/// Exclusive use of the submission lane with one allocated nonce.
///
/// Must be settled with exactly one of the consuming methods. Dropping an
/// unsettled lease (e.g. a cancelled task) marks the lane in doubt.
pub struct RelayNonceLease<'a> {
    state: MutexGuard<'a, LaneState>,
    nonce: RelayNonce,
    settled: bool,
}

impl RelayNonceLease<'_> {
    pub fn nonce(&self) -> RelayNonce {
        self.nonce
    }

    /// The ledger holds a transaction at this nonce: included (success or
    /// revert) or accepted and still pending.
    pub fn consumed(mut self) {
        let nonce = self.nonce;
        self.state.mark_consumed(nonce);
        self.state.next = Some(nonce.next());
        self.settled = true;
    }

    /// The ledger definitely did not accept the transaction; the slot is
    /// still free and the next lease reuses it.
    pub fn unused(mut self) {
        self.state.next = Some(self.nonce);
        self.settled = true;
    }

    /// The ledger refused the slot as already taken and reports the nonce it
    /// expects next.
    pub fn taken(mut self, ledger_expected: RelayNonce) {
        let nonce = self.nonce;
        self.state.mark_consumed(nonce);
        let floor = self.state.floor();
        self.state.next = Some(ledger_expected.max(floor));
        self.settled = true;
    }

    /// Whether the ledger accepted the transaction is unknown. The next
    /// lease resynchronises first.
    pub fn in_doubt(mut self) {
        self.state.in_doubt = true;
        self.settled = true;
    }
}

impl Drop for RelayNonceLease<'_> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::warn!(relay_nonce = %self.nonce, "relay nonce lease dropped unsettled");
            self.state.in_doubt = true;
        }
    }
}

/// Owner of both nonce checks.
pub struct NonceGuard<L> {
    ledger: Arc<L>,
    allocator: RelayNonceAllocator,
}

impl<L: LedgerClient> NonceGuard<L> {
    pub fn new(ledger: Arc<L>, relay_account: AccountAddress) -> Self {
        Self {
            ledger,
            allocator: RelayNonceAllocator::new(relay_account),
        }
    }

    pub fn relay_account(&self) -> &AccountAddress {
        self.allocator.account()
    }

    /// Fresh read from the ledger; voter nonces are never cached.
    pub async fn current_voter_nonce(
        &self,
        voter: &AccountAddress,
    ) -> Result<VoterNonce, RelayError> {
        Ok(self.ledger.read_voter_nonce(voter).await?)
    }

    /// Compare a declared nonce against the ledger's current value.
    pub async fn check_voter_nonce(
        &self,
        voter: &AccountAddress,
        declared: VoterNonce,
    ) -> Result<(), RelayError> {
        let expected = self.current_voter_nonce(voter).await?;
        if expected != declared {
            tracing::debug!(%voter, %expected, provided = %declared, "voter nonce mismatch");
            return Err(RelayError::Replay {
                expected,
                provided: declared,
                stage: ReplayStage::PreCheck,
            });
        }
        Ok(())
    }

    /// Lease the relay account's next nonce (and with it the lane).
    pub async fn next_relay_nonce(&self) -> Result<RelayNonceLease<'_>, RelayError> {
        self.allocator.acquire(&*self.ledger).await
    }
}
