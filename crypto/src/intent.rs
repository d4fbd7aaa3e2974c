//! Canonical vote-intent encoding.
//!
//! The voter signs Blake2b-256 over:
//!
//! ```text
//! "ballot-intent-v1" || ledger_poll_id (u64 BE) || option_index (u32 BE)
//!   || voter address bytes || voter_nonce (u64 BE) || relay_target address bytes
//! ```
//!
//! Addresses have a fixed length, so the packed form is unambiguous. The
//! ledger recomputes the same digest and checks it against the key embedded
//! in the voter address.

use ballot_types::{AccountAddress, LedgerPollId, PrivateKey, Signature, VoterNonce};

use crate::{blake2b_256_multi, public_key_of, sign_message, verify_signature};

const DOMAIN_TAG: &[u8] = b"ballot-intent-v1";

/// The fields a voter signs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntentPayload {
    pub ledger_poll_id: LedgerPollId,
    pub option_index: u32,
    pub voter: AccountAddress,
    pub voter_nonce: VoterNonce,
    pub relay_target: AccountAddress,
}

/// Digest of the canonical encoding.
pub fn intent_digest(payload: &IntentPayload) -> [u8; 32] {
    blake2b_256_multi(&[
        DOMAIN_TAG,
        &payload.ledger_poll_id.get().to_be_bytes(),
        &payload.option_index.to_be_bytes(),
        payload.voter.as_str().as_bytes(),
        &payload.voter_nonce.get().to_be_bytes(),
        payload.relay_target.as_str().as_bytes(),
    ])
}

/// Sign an intent with the voter's key (client side, and tests).
pub fn sign_intent(payload: &IntentPayload, voter_key: &PrivateKey) -> Signature {
    sign_message(&intent_digest(payload), voter_key)
}

/// Check a signature against the key embedded in `payload.voter`.
pub fn verify_intent(payload: &IntentPayload, signature: &Signature) -> bool {
    match public_key_of(&payload.voter) {
        Some(public) => verify_signature(&intent_digest(payload), signature, &public),
        None => false,
    }
}
