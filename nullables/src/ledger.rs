//! Nullable ledger: an in-memory poll contract with controllable inclusion.
//!
//! Behaves like the deployed contract as far as the relay can observe:
//! - relay-account nonces are strictly sequential; a used slot is refused
//! - reverted transactions are still included and consume their nonce
//! - `voteWithSig` checks poll state, option range, the voter's
//!   contract-wide nonce, the intent signature, and double voting
//!
//! Inclusion can be paused to simulate confirmation timeouts, and
//! submissions can be made to fail before or after acceptance.

use ballot_crypto::{verify_intent, IntentPayload};
use ballot_ledger::{
    ContractCall, ContractEvent, LedgerClient, LedgerError, LedgerPoll, Receipt, ReceiptStatus,
    RevertReason, SignedTransaction, VoteEvent,
};
use ballot_types::{
    AccountAddress, Clock, LedgerPollId, RelayNonce, Timestamp, TxRef, VoterNonce,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

pub const VOTE_GAS: u64 = 95_000;
pub const CREATE_POLL_GAS: u64 = 150_000;
const PER_OPTION_GAS: u64 = 20_000;
const END_POLL_GAS: u64 = 40_000;
const EXTEND_POLL_GAS: u64 = 35_000;

const MIN_OPTIONS: usize = 2;
const MAX_OPTIONS: usize = 10;
const MIN_DURATION_SECS: u64 = 60;
const MAX_DURATION_SECS: u64 = 30 * 24 * 3600;

struct ContractPoll {
    poll: LedgerPoll,
    tallies: Vec<u64>,
}

#[derive(Default)]
struct LedgerState {
    polls: Vec<ContractPoll>,
    voter_nonces: HashMap<AccountAddress, u64>,
    voted: HashSet<(LedgerPollId, AccountAddress)>,
    vote_events: HashMap<LedgerPollId, Vec<VoteEvent>>,
    /// Next nonce each sending account will have included.
    account_nonces: HashMap<AccountAddress, u64>,
    /// Accepted but not yet included, keyed by sender and nonce.
    mempool: BTreeMap<(AccountAddress, u64), SignedTransaction>,
    known: HashSet<TxRef>,
    receipts: HashMap<TxRef, Receipt>,
    block_height: u64,
    paused: bool,
    fail_submissions: u32,
    drop_acks: u32,
    vote_state_changes: u64,
    synthetic_tx: u64,
}

impl LedgerState {
    fn included_nonce(&self, account: &AccountAddress) -> u64 {
        self.account_nonces.get(account).copied().unwrap_or(0)
    }

    fn pending_nonce(&self, account: &AccountAddress) -> u64 {
        let mut next = self.included_nonce(account);
        while self.mempool.contains_key(&(account.clone(), next)) {
            next += 1;
        }
        next
    }

    /// Include every mempool transaction whose nonce is next in line.
    fn mine(&mut self, now: Timestamp, contract: &AccountAddress) {
        loop {
            let ready = self
                .mempool
                .keys()
                .find(|(acct, n)| *n == self.included_nonce(acct))
                .cloned();
            let Some(key) = ready else { break };
            if let Some(tx) = self.mempool.remove(&key) {
                self.include(&tx, now, contract);
            }
        }
    }

    fn include(&mut self, signed: &SignedTransaction, now: Timestamp, contract: &AccountAddress) {
        let tx = &signed.tx;
        self.block_height += 1;
        let required = required_gas(&tx.call);
        let (status, gas_used) = if tx.gas_limit < required {
            (
                ReceiptStatus::Reverted(RevertReason::OutOfGas {
                    limit: tx.gas_limit,
                    required,
                }),
                tx.gas_limit,
            )
        } else {
            let status = match self.execute(signed, now, contract) {
                Ok(events) => ReceiptStatus::Success { events },
                Err(reason) => ReceiptStatus::Reverted(reason),
            };
            (status, required)
        };
        *self.account_nonces.entry(tx.from.clone()).or_insert(0) += 1;
        self.receipts.insert(
            signed.tx_ref,
            Receipt {
                tx_ref: signed.tx_ref,
                relay_nonce: tx.nonce,
                block_height: self.block_height,
                gas_used,
                status,
            },
        );
    }

    fn execute(
        &mut self,
        signed: &SignedTransaction,
        now: Timestamp,
        contract: &AccountAddress,
    ) -> Result<Vec<ContractEvent>, RevertReason> {
        let from = &signed.tx.from;
        match &signed.tx.call {
            ContractCall::CreatePoll {
                question,
                options,
                duration_secs,
            } => {
                if question.trim().is_empty() {
                    return Err(RevertReason::Other("empty question".into()));
                }
                if !(MIN_OPTIONS..=MAX_OPTIONS).contains(&options.len()) {
                    return Err(RevertReason::Other("invalid number of options".into()));
                }
                if !(MIN_DURATION_SECS..=MAX_DURATION_SECS).contains(duration_secs) {
                    return Err(RevertReason::Other("invalid duration".into()));
                }
                let id = LedgerPollId::new(self.polls.len() as u64);
                let end_time = now.plus_secs(*duration_secs);
                self.polls.push(ContractPoll {
                    poll: LedgerPoll {
                        id,
                        question: question.clone(),
                        options: options.clone(),
                        creator: from.clone(),
                        end_time,
                        active: true,
                        total_votes: 0,
                    },
                    tallies: vec![0; options.len()],
                });
                Ok(vec![ContractEvent::PollCreated {
                    poll: id,
                    creator: from.clone(),
                    end_time,
                }])
            }
            ContractCall::VoteWithSig {
                poll,
                option_index,
                voter,
                voter_nonce,
                signature,
            } => {
                let cp = self
                    .polls
                    .get_mut(poll.get() as usize)
                    .ok_or(RevertReason::PollNotFound)?;
                if !cp.poll.active || now.is_after(cp.poll.end_time) {
                    return Err(RevertReason::PollEnded);
                }
                let count = cp.tallies.len() as u32;
                if *option_index >= count {
                    return Err(RevertReason::InvalidOption {
                        index: *option_index,
                        count,
                    });
                }
                let expected = self.voter_nonces.get(voter).copied().unwrap_or(0);
                if voter_nonce.get() != expected {
                    return Err(RevertReason::InvalidNonce {
                        expected: VoterNonce::new(expected),
                        provided: *voter_nonce,
                    });
                }
                let payload = IntentPayload {
                    ledger_poll_id: *poll,
                    option_index: *option_index,
                    voter: voter.clone(),
                    voter_nonce: *voter_nonce,
                    relay_target: contract.clone(),
                };
                if !verify_intent(&payload, signature) {
                    return Err(RevertReason::InvalidSignature);
                }
                if self.voted.contains(&(*poll, voter.clone())) {
                    return Err(RevertReason::AlreadyVoted);
                }

                cp.tallies[*option_index as usize] += 1;
                cp.poll.total_votes += 1;
                self.voter_nonces.insert(voter.clone(), expected + 1);
                self.voted.insert((*poll, voter.clone()));
                self.vote_events.entry(*poll).or_default().push(VoteEvent {
                    poll: *poll,
                    voter: voter.clone(),
                    option_index: *option_index,
                    tx_ref: signed.tx_ref,
                });
                self.vote_state_changes += 1;
                Ok(vec![ContractEvent::Voted {
                    poll: *poll,
                    voter: voter.clone(),
                    option_index: *option_index,
                }])
            }
            ContractCall::EndPoll { poll } => {
                let cp = self
                    .polls
                    .get_mut(poll.get() as usize)
                    .ok_or(RevertReason::PollNotFound)?;
                if &cp.poll.creator != from {
                    return Err(RevertReason::NotCreator);
                }
                if !cp.poll.active {
                    return Err(RevertReason::PollEnded);
                }
                cp.poll.active = false;
                Ok(vec![ContractEvent::PollEnded { poll: *poll }])
            }
            ContractCall::ExtendPoll {
                poll,
                additional_secs,
            } => {
                let cp = self
                    .polls
                    .get_mut(poll.get() as usize)
                    .ok_or(RevertReason::PollNotFound)?;
                if &cp.poll.creator != from {
                    return Err(RevertReason::NotCreator);
                }
                if !cp.poll.active || now.is_after(cp.poll.end_time) {
                    return Err(RevertReason::PollEnded);
                }
                cp.poll.end_time = cp.poll.end_time.plus_secs(*additional_secs);
                Ok(vec![ContractEvent::PollExtended {
                    poll: *poll,
                    end_time: cp.poll.end_time,
                }])
            }
        }
    }
}

fn required_gas(call: &ContractCall) -> u64 {
    match call {
        ContractCall::CreatePoll { options, .. } => {
            CREATE_POLL_GAS + PER_OPTION_GAS * options.len() as u64
        }
        ContractCall::VoteWithSig { .. } => VOTE_GAS,
        ContractCall::EndPoll { .. } => END_POLL_GAS,
        ContractCall::ExtendPoll { .. } => EXTEND_POLL_GAS,
    }
}

/// In-memory poll contract. Thread-safe; share behind an `Arc`.
pub struct NullLedger {
    contract: AccountAddress,
    clock: Arc<dyn Clock>,
    state: Mutex<LedgerState>,
}

impl NullLedger {
    pub fn new(contract: AccountAddress, clock: Arc<dyn Clock>) -> Self {
        Self {
            contract,
            clock,
            state: Mutex::new(LedgerState::default()),
        }
    }

    pub fn contract(&self) -> &AccountAddress {
        &self.contract
    }

    // ── Controls ────────────────────────────────────────────────────────

    /// Stop including transactions. Submissions are still accepted.
    pub fn pause_inclusion(&self) {
        self.state.lock().unwrap().paused = true;
    }

    /// Resume and include everything that is in line.
    pub fn resume_inclusion(&self) {
        let mut state = self.state.lock().unwrap();
        state.paused = false;
        state.mine(self.clock.now(), &self.contract);
    }

    /// The next `n` submissions fail with a transport error and are never
    /// seen by the ledger.
    pub fn fail_next_submissions(&self, n: u32) {
        self.state.lock().unwrap().fail_submissions = n;
    }

    /// The next `n` submissions are accepted but the acknowledgement is
    /// lost: the caller sees a transport error.
    pub fn drop_next_acks(&self, n: u32) {
        self.state.lock().unwrap().drop_acks = n;
    }

    /// Create a poll directly in contract state.
    pub fn seed_poll(
        &self,
        creator: &AccountAddress,
        options: &[&str],
        end_time: Timestamp,
    ) -> LedgerPollId {
        let mut state = self.state.lock().unwrap();
        let id = LedgerPollId::new(state.polls.len() as u64);
        state.polls.push(ContractPoll {
            poll: LedgerPoll {
                id,
                question: "seeded".into(),
                options: options.iter().map(|o| o.to_string()).collect(),
                creator: creator.clone(),
                end_time,
                active: true,
                total_votes: 0,
            },
            tallies: vec![0; options.len()],
        });
        id
    }

    /// Record a vote that reached the ledger through some other relay.
    /// Returns the synthetic transaction reference.
    pub fn inject_vote(
        &self,
        poll: LedgerPollId,
        voter: &AccountAddress,
        option_index: u32,
    ) -> TxRef {
        let mut state = self.state.lock().unwrap();
        state.synthetic_tx += 1;
        let mut bytes = [0xEE; 32];
        bytes[..8].copy_from_slice(&state.synthetic_tx.to_be_bytes());
        let tx_ref = TxRef::new(bytes);
        if let Some(cp) = state.polls.get_mut(poll.get() as usize) {
            cp.tallies[option_index as usize] += 1;
            cp.poll.total_votes += 1;
        }
        let nonce = state.voter_nonces.entry(voter.clone()).or_insert(0);
        *nonce += 1;
        state.voted.insert((poll, voter.clone()));
        state.vote_events.entry(poll).or_default().push(VoteEvent {
            poll,
            voter: voter.clone(),
            option_index,
            tx_ref,
        });
        state.vote_state_changes += 1;
        tx_ref
    }

    /// Deactivate a poll without a transaction (e.g. an admin action).
    pub fn deactivate_poll(&self, poll: LedgerPollId) {
        if let Some(cp) = self.state.lock().unwrap().polls.get_mut(poll.get() as usize) {
            cp.poll.active = false;
        }
    }

    // ── Inspection ──────────────────────────────────────────────────────

    /// Number of successful vote executions.
    pub fn vote_state_changes(&self) -> u64 {
        self.state.lock().unwrap().vote_state_changes
    }

    pub fn tallies_of(&self, poll: LedgerPollId) -> Vec<u64> {
        self.state
            .lock()
            .unwrap()
            .polls
            .get(poll.get() as usize)
            .map(|cp| cp.tallies.clone())
            .unwrap_or_default()
    }

    pub fn voter_nonce_of(&self, voter: &AccountAddress) -> VoterNonce {
        VoterNonce::new(
            self.state
                .lock()
                .unwrap()
                .voter_nonces
                .get(voter)
                .copied()
                .unwrap_or(0),
        )
    }

    /// Next nonce to be included for `account` (ignores the mempool).
    pub fn included_nonce_of(&self, account: &AccountAddress) -> RelayNonce {
        RelayNonce::new(self.state.lock().unwrap().included_nonce(account))
    }

    pub fn mempool_len(&self) -> usize {
        self.state.lock().unwrap().mempool.len()
    }

    pub fn receipt_count(&self) -> usize {
        self.state.lock().unwrap().receipts.len()
    }
}

impl LedgerClient for NullLedger {
    async fn read_poll(&self, poll: LedgerPollId) -> Result<LedgerPoll, LedgerError> {
        let now = self.clock.now();
        let state = self.state.lock().unwrap();
        let cp = state
            .polls
            .get(poll.get() as usize)
            .ok_or(LedgerError::PollNotFound(poll))?;
        let mut view = cp.poll.clone();
        view.active = view.active && !now.is_after(view.end_time);
        Ok(view)
    }

    async fn read_tallies(&self, poll: LedgerPollId) -> Result<Vec<u64>, LedgerError> {
        let state = self.state.lock().unwrap();
        state
            .polls
            .get(poll.get() as usize)
            .map(|cp| cp.tallies.clone())
            .ok_or(LedgerError::PollNotFound(poll))
    }

    async fn read_voter_nonce(&self, voter: &AccountAddress) -> Result<VoterNonce, LedgerError> {
        Ok(self.voter_nonce_of(voter))
    }

    async fn has_voted(
        &self,
        poll: LedgerPollId,
        voter: &AccountAddress,
    ) -> Result<bool, LedgerError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .voted
            .contains(&(poll, voter.clone())))
    }

    async fn read_vote_events(&self, poll: LedgerPollId) -> Result<Vec<VoteEvent>, LedgerError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .vote_events
            .get(&poll)
            .cloned()
            .unwrap_or_default())
    }

    async fn pending_relay_nonce(
        &self,
        account: &AccountAddress,
    ) -> Result<RelayNonce, LedgerError> {
        Ok(RelayNonce::new(
            self.state.lock().unwrap().pending_nonce(account),
        ))
    }

    async fn submit_transaction(&self, tx: &SignedTransaction) -> Result<TxRef, LedgerError> {
        // Give concurrent callers a chance to interleave, as a network hop would.
        tokio::task::yield_now().await;

        let now = self.clock.now();
        let mut state = self.state.lock().unwrap();
        if state.fail_submissions > 0 {
            state.fail_submissions -= 1;
            return Err(LedgerError::Transport("injected submission failure".into()));
        }
        if !tx.verify() {
            return Err(LedgerError::Rpc {
                code: -32602,
                message: "invalid transaction signature".into(),
            });
        }
        if tx.tx.contract != self.contract {
            return Err(LedgerError::Rpc {
                code: -32602,
                message: format!("unknown contract {}", tx.tx.contract),
            });
        }
        if state.known.contains(&tx.tx_ref) {
            return Ok(tx.tx_ref);
        }
        let pending = state.pending_nonce(&tx.tx.from);
        if tx.tx.nonce.get() < pending {
            return Err(LedgerError::RelayNonceTooLow {
                expected: RelayNonce::new(pending),
                provided: tx.tx.nonce,
            });
        }

        state.known.insert(tx.tx_ref);
        state
            .mempool
            .insert((tx.tx.from.clone(), tx.tx.nonce.get()), tx.clone());
        if !state.paused {
            state.mine(now, &self.contract);
        }

        if state.drop_acks > 0 {
            state.drop_acks -= 1;
            return Err(LedgerError::Transport("connection reset after send".into()));
        }
        Ok(tx.tx_ref)
    }

    async fn fetch_receipt(&self, tx_ref: &TxRef) -> Result<Option<Receipt>, LedgerError> {
        Ok(self.state.lock().unwrap().receipts.get(tx_ref).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NullClock;
    use ballot_crypto::{derive_address, keypair_from_seed, sign_intent};
    use ballot_ledger::SponsoredTransaction;
    use ballot_types::{KeyPair, Signature};

    struct Fixture {
        ledger: NullLedger,
        relay: KeyPair,
        relay_addr: AccountAddress,
        clock: Arc<NullClock>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(NullClock::new(1_000));
        let contract = derive_address(&keypair_from_seed(&[50; 32]).public);
        let relay = keypair_from_seed(&[51; 32]);
        let relay_addr = derive_address(&relay.public);
        Fixture {
            ledger: NullLedger::new(contract, clock.clone()),
            relay,
            relay_addr,
            clock,
        }
    }

    impl Fixture {
        fn signed(&self, nonce: u64, gas: u64, call: ContractCall) -> SignedTransaction {
            SponsoredTransaction {
                from: self.relay_addr.clone(),
                contract: self.ledger.contract().clone(),
                nonce: RelayNonce::new(nonce),
                gas_limit: gas,
                call,
            }
            .sign(&self.relay.private)
            .unwrap()
        }

        fn vote_call(&self, voter_seed: u8, poll: LedgerPollId, option: u32, nonce: u64) -> ContractCall {
            let voter = keypair_from_seed(&[voter_seed; 32]);
            let voter_addr = derive_address(&voter.public);
            let payload = IntentPayload {
                ledger_poll_id: poll,
                option_index: option,
                voter: voter_addr.clone(),
                voter_nonce: VoterNonce::new(nonce),
                relay_target: self.ledger.contract().clone(),
            };
            ContractCall::VoteWithSig {
                poll,
                option_index: option,
                voter: voter_addr,
                voter_nonce: VoterNonce::new(nonce),
                signature: sign_intent(&payload, &voter.private),
            }
        }
    }

    #[tokio::test]
    async fn vote_is_included_and_counted() {
        let f = fixture();
        let poll = f.ledger.seed_poll(&f.relay_addr, &["a", "b"], Timestamp::new(2_000));
        let tx = f.signed(0, 500_000, f.vote_call(1, poll, 1, 0));
        f.ledger.submit_transaction(&tx).await.unwrap();
        let receipt = f.ledger.fetch_receipt(&tx.tx_ref).await.unwrap().unwrap();
        assert!(receipt.is_success());
        assert_eq!(f.ledger.tallies_of(poll), vec![0, 1]);
        let voter = derive_address(&keypair_from_seed(&[1; 32]).public);
        assert_eq!(f.ledger.voter_nonce_of(&voter), VoterNonce::new(1));
    }

    #[tokio::test]
    async fn reused_relay_nonce_is_refused() {
        let f = fixture();
        let poll = f.ledger.seed_poll(&f.relay_addr, &["a", "b"], Timestamp::new(2_000));
        f.ledger
            .submit_transaction(&f.signed(0, 500_000, f.vote_call(1, poll, 0, 0)))
            .await
            .unwrap();
        let err = f
            .ledger
            .submit_transaction(&f.signed(0, 500_000, f.vote_call(2, poll, 0, 0)))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::RelayNonceTooLow { .. }));
    }

    #[tokio::test]
    async fn revert_still_consumes_relay_nonce() {
        let f = fixture();
        let poll = f.ledger.seed_poll(&f.relay_addr, &["a", "b"], Timestamp::new(2_000));
        let tx = f.signed(0, 500_000, f.vote_call(1, poll, 0, 3));
        f.ledger.submit_transaction(&tx).await.unwrap();
        let receipt = f.ledger.fetch_receipt(&tx.tx_ref).await.unwrap().unwrap();
        assert!(matches!(
            receipt.status,
            ReceiptStatus::Reverted(RevertReason::InvalidNonce { .. })
        ));
        assert_eq!(f.ledger.included_nonce_of(&f.relay_addr), RelayNonce::new(1));
        assert_eq!(f.ledger.vote_state_changes(), 0);
    }

    #[tokio::test]
    async fn low_gas_limit_reverts_out_of_gas() {
        let f = fixture();
        let poll = f.ledger.seed_poll(&f.relay_addr, &["a", "b"], Timestamp::new(2_000));
        let tx = f.signed(0, VOTE_GAS - 1, f.vote_call(1, poll, 0, 0));
        f.ledger.submit_transaction(&tx).await.unwrap();
        let receipt = f.ledger.fetch_receipt(&tx.tx_ref).await.unwrap().unwrap();
        assert!(matches!(
            receipt.status,
            ReceiptStatus::Reverted(RevertReason::OutOfGas { .. })
        ));
    }

    #[tokio::test]
    async fn paused_inclusion_withholds_receipts() {
        let f = fixture();
        let poll = f.ledger.seed_poll(&f.relay_addr, &["a", "b"], Timestamp::new(2_000));
        f.ledger.pause_inclusion();
        let tx = f.signed(0, 500_000, f.vote_call(1, poll, 0, 0));
        f.ledger.submit_transaction(&tx).await.unwrap();
        assert!(f.ledger.fetch_receipt(&tx.tx_ref).await.unwrap().is_none());
        assert_eq!(
            f.ledger.pending_relay_nonce(&f.relay_addr).await.unwrap(),
            RelayNonce::new(1)
        );
        f.ledger.resume_inclusion();
        assert!(f.ledger.fetch_receipt(&tx.tx_ref).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn voting_after_end_time_reverts() {
        let f = fixture();
        let poll = f.ledger.seed_poll(&f.relay_addr, &["a", "b"], Timestamp::new(1_100));
        f.clock.advance(200);
        let tx = f.signed(0, 500_000, f.vote_call(1, poll, 0, 0));
        f.ledger.submit_transaction(&tx).await.unwrap();
        let receipt = f.ledger.fetch_receipt(&tx.tx_ref).await.unwrap().unwrap();
        assert_eq!(receipt.status, ReceiptStatus::Reverted(RevertReason::PollEnded));
        assert!(!f.ledger.read_poll(poll).await.unwrap().active);
    }

    #[tokio::test]
    async fn forged_intent_signature_reverts() {
        let f = fixture();
        let poll = f.ledger.seed_poll(&f.relay_addr, &["a", "b"], Timestamp::new(2_000));
        let mut call = f.vote_call(1, poll, 0, 0);
        if let ContractCall::VoteWithSig { signature, .. } = &mut call {
            *signature = Signature([0; 64]);
        }
        let tx = f.signed(0, 500_000, call);
        f.ledger.submit_transaction(&tx).await.unwrap();
        let receipt = f.ledger.fetch_receipt(&tx.tx_ref).await.unwrap().unwrap();
        assert_eq!(
            receipt.status,
            ReceiptStatus::Reverted(RevertReason::InvalidSignature)
        );
    }

    #[tokio::test]
    async fn create_poll_emits_ledger_id() {
        let f = fixture();
        let tx = f.signed(
            0,
            500_000,
            ContractCall::CreatePoll {
                question: "Q".into(),
                options: vec!["x".into(), "y".into()],
                duration_secs: 3_600,
            },
        );
        f.ledger.submit_transaction(&tx).await.unwrap();
        let receipt = f.ledger.fetch_receipt(&tx.tx_ref).await.unwrap().unwrap();
        let (id, end) = receipt.created_poll().unwrap();
        assert_eq!(id, LedgerPollId::new(0));
        assert_eq!(end, Timestamp::new(4_600));
    }

    #[tokio::test]
    async fn dropped_ack_still_lands() {
        let f = fixture();
        let poll = f.ledger.seed_poll(&f.relay_addr, &["a", "b"], Timestamp::new(2_000));
        f.ledger.drop_next_acks(1);
        let tx = f.signed(0, 500_000, f.vote_call(1, poll, 0, 0));
        assert!(f.ledger.submit_transaction(&tx).await.is_err());
        assert!(f.ledger.fetch_receipt(&tx.tx_ref).await.unwrap().is_some());
    }
}
