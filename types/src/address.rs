//! Account address type with `blt_` prefix.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::BallotError;

/// An account address on the ledger, always prefixed with `blt_`.
///
/// Voters, the relay signing account, and the deployed poll contract all use
/// this form. The encoded part carries the account's public key, so the
/// ledger can check a signature against the address alone.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountAddress(String);

impl AccountAddress {
    /// The standard prefix for all addresses.
    pub const PREFIX: &'static str = "blt_";

    /// Total length of a well-formed address (prefix + 52 key chars + 8 checksum chars).
    pub const ENCODED_LEN: usize = 64;

    /// Wrap a string already known to be well-formed.
    ///
    /// # Panics
    /// Panics if the string does not start with `blt_`.
    pub fn new(raw: impl Into<String>) -> Self {
        let s = raw.into();
        assert!(s.starts_with(Self::PREFIX), "address must start with blt_");
        Self(s)
    }

    /// Parse untrusted input. Only the prefix and length are checked here;
    /// checksum validation lives in `ballot-crypto`.
    pub fn parse(raw: &str) -> Result<Self, BallotError> {
        let trimmed = raw.trim();
        if !trimmed.starts_with(Self::PREFIX) || trimmed.len() != Self::ENCODED_LEN {
            return Err(BallotError::InvalidAddress(raw.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rejects_wrong_prefix() {
        let raw = format!("nano{}", "1".repeat(60));
        assert!(AccountAddress::parse(&raw).is_err());
    }

    #[test]
    fn parse_rejects_wrong_length() {
        assert!(AccountAddress::parse("blt_short").is_err());
    }

    #[test]
    fn parse_trims_whitespace() {
        let raw = format!("  blt_{}  ", "1".repeat(60));
        let addr = AccountAddress::parse(&raw).unwrap();
        assert_eq!(addr.as_str().len(), AccountAddress::ENCODED_LEN);
    }
}
