//! Sponsored transactions submitted by the relay account.
//!
//! The relay pays the fee and signs the envelope with its own key. The
//! voter's signature travels inside [`ContractCall::VoteWithSig`] and is
//! checked by the contract, so the relay can never forge a vote.

use ballot_crypto::{hash_transaction, public_key_of, sign_message, verify_signature};
use ballot_types::{
    AccountAddress, LedgerPollId, PrivateKey, RelayNonce, Signature, TxRef, VoterNonce,
};
use serde::{Deserialize, Serialize};

use crate::LedgerError;

/// A call into the poll contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractCall {
    CreatePoll {
        question: String,
        options: Vec<String>,
        duration_secs: u64,
    },
    VoteWithSig {
        poll: LedgerPollId,
        option_index: u32,
        voter: AccountAddress,
        voter_nonce: VoterNonce,
        signature: Signature,
    },
    EndPoll {
        poll: LedgerPollId,
    },
    ExtendPoll {
        poll: LedgerPollId,
        additional_secs: u64,
    },
}

impl ContractCall {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreatePoll { .. } => "createPoll",
            Self::VoteWithSig { .. } => "voteWithSig",
            Self::EndPoll { .. } => "endPoll",
            Self::ExtendPoll { .. } => "extendPoll",
        }
    }
}

/// Unsigned transaction envelope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SponsoredTransaction {
    /// The relay signing account (fee payer).
    pub from: AccountAddress,
    /// The poll contract address.
    pub contract: AccountAddress,
    pub nonce: RelayNonce,
    /// Upper bound on execution cost.
    pub gas_limit: u64,
    pub call: ContractCall,
}

impl SponsoredTransaction {
    /// Blake2b-256 of the canonical bincode encoding.
    pub fn tx_ref(&self) -> Result<TxRef, LedgerError> {
        let bytes = bincode::serialize(self).map_err(|e| LedgerError::Encode(e.to_string()))?;
        Ok(hash_transaction(&bytes))
    }

    /// Sign with the relay account key.
    pub fn sign(self, relay_key: &PrivateKey) -> Result<SignedTransaction, LedgerError> {
        let tx_ref = self.tx_ref()?;
        let signature = sign_message(tx_ref.as_bytes(), relay_key);
        Ok(SignedTransaction {
            tx: self,
            tx_ref,
            signature,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub tx: SponsoredTransaction,
    pub tx_ref: TxRef,
    pub signature: Signature,
}

impl SignedTransaction {
    /// Check the reference matches the body and the signature matches `from`.
    pub fn verify(&self) -> bool {
        let Ok(expected) = self.tx.tx_ref() else {
            return false;
        };
        if expected != self.tx_ref {
            return false;
        }
        match public_key_of(&self.tx.from) {
            Some(pk) => verify_signature(self.tx_ref.as_bytes(), &self.signature, &pk),
            None => false,
        }
    }

    /// Hex wire form for `ballot_sendRawTransaction`.
    pub fn encode_hex(&self) -> Result<String, LedgerError> {
        let bytes = bincode::serialize(self).map_err(|e| LedgerError::Encode(e.to_string()))?;
        Ok(hex::encode(bytes))
    }

    pub fn decode_hex(s: &str) -> Result<Self, LedgerError> {
        let bytes = hex::decode(s.trim()).map_err(|e| LedgerError::Decode(e.to_string()))?;
        bincode::deserialize(&bytes).map_err(|e| LedgerError::Decode(e.to_string()))
    }
}
