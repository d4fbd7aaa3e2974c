//! Top-level error type shared across crates.

use thiserror::Error;

/// Common error type for malformed domain values.
#[derive(Debug, Error)]
pub enum BallotError {
    #[error("invalid account address: {0}")]
    InvalidAddress(String),

    #[error("invalid signature encoding: {0}")]
    InvalidSignatureEncoding(String),

    #[error("invalid transaction reference: {0}")]
    InvalidTxRef(String),

    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}
