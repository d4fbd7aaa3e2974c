use ballot_types::{LedgerPollId, RelayNonce};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// The request may or may not have reached the ledger.
    #[error("ledger transport error: {0}")]
    Transport(String),

    #[error("ledger RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The relay account's sequence slot is already taken; the transaction
    /// was refused before execution.
    #[error("relay nonce {provided} already used (ledger expects {expected})")]
    RelayNonceTooLow {
        expected: RelayNonce,
        provided: RelayNonce,
    },

    #[error("{0} does not exist on the ledger")]
    PollNotFound(LedgerPollId),

    #[error("failed to encode request: {0}")]
    Encode(String),

    #[error("failed to decode ledger response: {0}")]
    Decode(String),
}

impl LedgerError {
    /// Whether a submission that failed with this error could still have
    /// been accepted by the ledger.
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Decode(_))
    }
}
