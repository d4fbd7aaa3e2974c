//! Vote intents as they arrive from the submission endpoint.

use serde::{Deserialize, Serialize};

use crate::{AccountAddress, PollId, VoterNonce};

/// A voter's signed request for the relay to cast a vote on their behalf.
///
/// Ephemeral: never persisted. The signature is kept in its wire form until
/// the verifier has checked its structure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteIntent {
    pub poll_id: PollId,
    pub option_index: u32,
    pub voter: AccountAddress,
    pub voter_nonce: VoterNonce,
    /// Contract the voter authorised the relay to call.
    pub relay_target: AccountAddress,
    /// Hex-encoded Ed25519 signature over the canonical intent digest.
    pub signature: String,
}
