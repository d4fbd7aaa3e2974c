//! Ledger transaction reference.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::BallotError;

/// A 32-byte reference to a transaction submitted to the ledger.
///
/// Produced once per submission and stored on the mirrored `Vote` as the
/// evidence linking the local record to the ledger event.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxRef([u8; 32]);

impl TxRef {
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Parse the 64-character hex form produced by `Display`.
    pub fn from_hex(s: &str) -> Result<Self, BallotError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| BallotError::InvalidTxRef(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| BallotError::InvalidTxRef("expected 32 bytes".into()))?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for TxRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxRef({})", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for TxRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}
