//! The capability the relay needs from the ledger.

use std::future::Future;

use ballot_types::{AccountAddress, LedgerPollId, RelayNonce, TxRef, VoterNonce};

use crate::{LedgerError, LedgerPoll, Receipt, SignedTransaction, VoteEvent};

/// Reads, submission, and receipt lookup against the poll contract.
///
/// Implementations must be cheap to share behind an `Arc`. Every read
/// reflects the latest included state; there is no caching at this layer.
pub trait LedgerClient: Send + Sync + 'static {
    fn read_poll(
        &self,
        poll: LedgerPollId,
    ) -> impl Future<Output = Result<LedgerPoll, LedgerError>> + Send;

    /// Per-option vote counts.
    fn read_tallies(
        &self,
        poll: LedgerPollId,
    ) -> impl Future<Output = Result<Vec<u64>, LedgerError>> + Send;

    /// The voter's current contract-wide nonce.
    fn read_voter_nonce(
        &self,
        voter: &AccountAddress,
    ) -> impl Future<Output = Result<VoterNonce, LedgerError>> + Send;

    fn has_voted(
        &self,
        poll: LedgerPollId,
        voter: &AccountAddress,
    ) -> impl Future<Output = Result<bool, LedgerError>> + Send;

    /// Every `Voted` event for `poll`, in inclusion order.
    fn read_vote_events(
        &self,
        poll: LedgerPollId,
    ) -> impl Future<Output = Result<Vec<VoteEvent>, LedgerError>> + Send;

    /// Next relay nonce the ledger will accept for `account`, counting
    /// transactions it has seen but not yet included.
    fn pending_relay_nonce(
        &self,
        account: &AccountAddress,
    ) -> impl Future<Output = Result<RelayNonce, LedgerError>> + Send;

    /// Hand a signed transaction to the ledger. `Ok` means accepted for
    /// inclusion, not included.
    fn submit_transaction(
        &self,
        tx: &SignedTransaction,
    ) -> impl Future<Output = Result<TxRef, LedgerError>> + Send;

    /// `None` until the transaction is included.
    fn fetch_receipt(
        &self,
        tx_ref: &TxRef,
    ) -> impl Future<Output = Result<Option<Receipt>, LedgerError>> + Send;
}

impl<L: LedgerClient> LedgerClient for std::sync::Arc<L> {
    fn read_poll(
        &self,
        poll: LedgerPollId,
    ) -> impl Future<Output = Result<LedgerPoll, LedgerError>> + Send {
        (**self).read_poll(poll)
    }

    fn read_tallies(
        &self,
        poll: LedgerPollId,
    ) -> impl Future<Output = Result<Vec<u64>, LedgerError>> + Send {
        (**self).read_tallies(poll)
    }

    fn read_voter_nonce(
        &self,
        voter: &AccountAddress,
    ) -> impl Future<Output = Result<VoterNonce, LedgerError>> + Send {
        (**self).read_voter_nonce(voter)
    }

    fn has_voted(
        &self,
        poll: LedgerPollId,
        voter: &AccountAddress,
    ) -> impl Future<Output = Result<bool, LedgerError>> + Send {
        (**self).has_voted(poll, voter)
    }

    fn read_vote_events(
        &self,
        poll: LedgerPollId,
    ) -> impl Future<Output = Result<Vec<VoteEvent>, LedgerError>> + Send {
        (**self).read_vote_events(poll)
    }

    fn pending_relay_nonce(
        &self,
        account: &AccountAddress,
    ) -> impl Future<Output = Result<RelayNonce, LedgerError>> + Send {
        (**self).pending_relay_nonce(account)
    }

    fn submit_transaction(
        &self,
        tx: &SignedTransaction,
    ) -> impl Future<Output = Result<TxRef, LedgerError>> + Send {
        (**self).submit_transaction(tx)
    }

    fn fetch_receipt(
        &self,
        tx_ref: &TxRef,
    ) -> impl Future<Output = Result<Option<Receipt>, LedgerError>> + Send {
        (**self).fetch_receipt(tx_ref)
    }
}
