//! Fixtures shared by the unit tests in this crate.

use std::sync::Arc;
use std::time::Duration;

use ballot_crypto::{derive_address, keypair_from_seed, sign_intent, IntentPayload};
use ballot_ledger::ContractCall;
use ballot_nullables::{NullClock, NullLedger, NullMirrorStore};
use ballot_types::{
    AccountAddress, LedgerPollId, Poll, PollId, PollOption, PollStatus, PrivateKey, Timestamp,
    VoterNonce,
};

use crate::config::RelaySettings;
use crate::submitter::RelayAccount;

pub(crate) const CONTRACT_SEED: u8 = 200;
pub(crate) const RELAY_SEED: u8 = 201;

pub(crate) fn contract() -> AccountAddress {
    derive_address(&keypair_from_seed(&[CONTRACT_SEED; 32]).public)
}

pub(crate) fn relay_account() -> RelayAccount {
    RelayAccount::from_key(keypair_from_seed(&[RELAY_SEED; 32]).private)
}

pub(crate) fn voter(seed: u8) -> (AccountAddress, PrivateKey) {
    let kp = keypair_from_seed(&[seed; 32]);
    (derive_address(&kp.public), kp.private)
}

pub(crate) fn fast_settings() -> RelaySettings {
    RelaySettings {
        confirmation_timeout: Duration::from_millis(200),
        receipt_poll_interval: Duration::from_millis(5),
        lane_timeout: Duration::from_secs(5),
        repair_max_attempts: 3,
        ..RelaySettings::for_contract(contract())
    }
}

pub(crate) struct World {
    pub clock: Arc<NullClock>,
    pub ledger: Arc<NullLedger>,
    pub store: Arc<NullMirrorStore>,
}

pub(crate) fn world() -> World {
    let clock = Arc::new(NullClock::new(1_000));
    World {
        ledger: Arc::new(NullLedger::new(contract(), clock.clone())),
        store: Arc::new(NullMirrorStore::new()),
        clock,
    }
}

/// A correctly signed `voteWithSig` call.
pub(crate) fn vote_call(
    voter_seed: u8,
    poll: LedgerPollId,
    option_index: u32,
    nonce: u64,
) -> ContractCall {
    let (voter, key) = voter(voter_seed);
    let payload = IntentPayload {
        ledger_poll_id: poll,
        option_index,
        voter: voter.clone(),
        voter_nonce: VoterNonce::new(nonce),
        relay_target: contract(),
    };
    ContractCall::VoteWithSig {
        poll,
        option_index,
        voter,
        voter_nonce: VoterNonce::new(nonce),
        signature: sign_intent(&payload, &key),
    }
}

/// An active poll present on both the ledger and the mirror.
pub(crate) fn linked_poll(w: &World, options: &[&str], end_time: u64) -> Poll {
    let creator = relay_account().address().clone();
    let ledger_id = w
        .ledger
        .seed_poll(&creator, options, Timestamp::new(end_time));
    w.store.seed_poll(Poll {
        id: PollId::new(0),
        question: "seeded".into(),
        options: options.iter().map(|o| PollOption::new(*o)).collect(),
        creator,
        created_at: Timestamp::new(0),
        end_time: Timestamp::new(end_time),
        status: PollStatus::Active,
        ledger_poll_id: Some(ledger_id),
        total_votes: 0,
    })
}
