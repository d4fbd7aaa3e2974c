//! Request and response shapes for the HTTP collaborator.
//!
//! Routing and authentication live outside this crate. The caller's
//! identity arrives already authenticated; everything here is plain
//! data plus the mapping from [`RelayError`] to a structured rejection.

use ballot_ledger::LedgerClient;
use ballot_store::MirrorStore;
use ballot_types::{AccountAddress, PollId, TxRef, VoteIntent, VoterNonce};
use serde::{Deserialize, Serialize};

use crate::service::{MirrorOutcome, PollView, VoteReceipt, VoteRelay, VoteStatus};
use crate::{RelayError, ValidationError};

// ── Vote submission ──────────────────────────────────────────────────────

#[derive(Clone, Debug, Deserialize)]
pub struct VoteRequest {
    pub option_index: u32,
    /// Hex-encoded intent signature.
    pub signature: String,
    pub voter_nonce: u64,
}

impl VoteRequest {
    /// Bind the request to a poll, the authenticated caller, and the
    /// contract the relay submits to.
    pub fn into_intent(
        self,
        poll: PollId,
        caller: AccountAddress,
        relay_target: AccountAddress,
    ) -> VoteIntent {
        VoteIntent {
            poll_id: poll,
            option_index: self.option_index,
            voter: caller,
            voter_nonce: VoterNonce::new(self.voter_nonce),
            relay_target,
            signature: self.signature,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VoteResponse {
    pub tx_ref: String,
    pub relay_nonce: u64,
    pub block_height: u64,
    pub mirror: MirrorOutcome,
}

impl From<VoteReceipt> for VoteResponse {
    fn from(r: VoteReceipt) -> Self {
        Self {
            tx_ref: r.tx_ref.to_string(),
            relay_nonce: r.relay_nonce.get(),
            block_height: r.block_height,
            mirror: r.mirror,
        }
    }
}

// ── Rejections ───────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    NotFound,
    Validation,
    Replay,
    Submission,
    /// Submitted but not yet included; poll the status endpoint.
    Pending,
    Unauthorized,
    Unavailable,
}

impl RejectionKind {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::NotFound => 404,
            Self::Validation => 400,
            Self::Replay => 409,
            Self::Submission => 422,
            Self::Pending => 202,
            Self::Unauthorized => 403,
            Self::Unavailable => 503,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub kind: RejectionKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_nonce: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provided_nonce: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_ref: Option<String>,
}

impl Rejection {
    fn new(kind: RejectionKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            expected_nonce: None,
            provided_nonce: None,
            tx_ref: None,
        }
    }
}

impl From<&RelayError> for Rejection {
    fn from(e: &RelayError) -> Self {
        match e {
            RelayError::Validation(ValidationError::PollNotFound(_)) => {
                Self::new(RejectionKind::NotFound, e.to_string())
            }
            RelayError::Validation(v) => Self::new(RejectionKind::Validation, v.to_string()),
            RelayError::Replay {
                expected, provided, ..
            } => Self {
                expected_nonce: Some(expected.get()),
                provided_nonce: Some(provided.get()),
                ..Self::new(
                    RejectionKind::Replay,
                    format!("voter nonce is {expected}; sign again with that value"),
                )
            },
            RelayError::Submission { reason, tx_ref } => Self {
                tx_ref: Some(tx_ref.to_string()),
                ..Self::new(RejectionKind::Submission, reason.to_string())
            },
            RelayError::Timeout { tx_ref, .. } => Self {
                tx_ref: Some(tx_ref.to_string()),
                ..Self::new(
                    RejectionKind::Pending,
                    "transaction submitted; check its status later",
                )
            },
            RelayError::Unauthorized { .. } => {
                Self::new(RejectionKind::Unauthorized, e.to_string())
            }
            // The vote stood on the ledger; never report it as failed.
            RelayError::Consistency { tx_ref, .. } => Self {
                tx_ref: Some(tx_ref.to_string()),
                ..Self::new(RejectionKind::Pending, "vote recorded on the ledger; mirror catching up")
            },
            RelayError::Ledger(_)
            | RelayError::Store(_)
            | RelayError::LaneUnavailable { .. }
            | RelayError::Config(_)
            | RelayError::Metrics(_) => {
                tracing::warn!(error = %e, "request failed on infrastructure");
                Self::new(RejectionKind::Unavailable, "relay temporarily unavailable")
            }
        }
    }
}

// ── Handlers ─────────────────────────────────────────────────────────────

pub async fn handle_vote<L: LedgerClient, S: MirrorStore>(
    relay: &VoteRelay<L, S>,
    poll: PollId,
    caller: AccountAddress,
    req: VoteRequest,
) -> Result<VoteResponse, Rejection> {
    let intent = req.into_intent(poll, caller, relay.contract().clone());
    relay
        .cast_vote(intent)
        .await
        .map(VoteResponse::from)
        .map_err(|e| Rejection::from(&e))
}

pub async fn handle_poll<L: LedgerClient, S: MirrorStore>(
    relay: &VoteRelay<L, S>,
    poll: PollId,
    caller: Option<&AccountAddress>,
    verify: bool,
) -> Result<PollView, Rejection> {
    relay
        .poll_view(poll, caller, verify)
        .await
        .map_err(|e| Rejection::from(&e))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NonceResponse {
    pub voter: String,
    pub nonce: u64,
}

pub async fn handle_nonce<L: LedgerClient, S: MirrorStore>(
    relay: &VoteRelay<L, S>,
    voter: &str,
) -> Result<NonceResponse, Rejection> {
    let voter = AccountAddress::parse(voter)
        .map_err(|e| Rejection::new(RejectionKind::Validation, e.to_string()))?;
    let nonce = relay
        .voter_nonce(&voter)
        .await
        .map_err(|e| Rejection::from(&e))?;
    Ok(NonceResponse {
        voter: voter.to_string(),
        nonce: nonce.get(),
    })
}

pub fn handle_vote_status<L: LedgerClient, S: MirrorStore>(
    relay: &VoteRelay<L, S>,
    tx_ref: &str,
) -> Result<VoteStatus, Rejection> {
    let tx_ref = TxRef::from_hex(tx_ref)
        .map_err(|e| Rejection::new(RejectionKind::Validation, e.to_string()))?;
    relay.vote_status(&tx_ref).map_err(|e| Rejection::from(&e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ReplayStage;
    use ballot_ledger::RevertReason;
    use ballot_types::RelayNonce;

    #[test]
    fn replay_carries_both_nonces() {
        let err = RelayError::Replay {
            expected: VoterNonce::new(6),
            provided: VoterNonce::new(5),
            stage: ReplayStage::Ledger,
        };
        let r = Rejection::from(&err);
        assert_eq!(r.kind, RejectionKind::Replay);
        assert_eq!(r.expected_nonce, Some(6));
        assert_eq!(r.provided_nonce, Some(5));
        assert_eq!(r.kind.http_status(), 409);
    }

    #[test]
    fn timeout_is_pending_not_failure() {
        let err = RelayError::Timeout {
            tx_ref: TxRef::new([3; 32]),
            relay_nonce: RelayNonce::new(4),
        };
        let r = Rejection::from(&err);
        assert_eq!(r.kind, RejectionKind::Pending);
        assert_eq!(r.tx_ref, Some(TxRef::new([3; 32]).to_string()));
    }

    #[test]
    fn missing_poll_maps_to_not_found() {
        let err = RelayError::from(ValidationError::PollNotFound(PollId::new(9)));
        assert_eq!(Rejection::from(&err).kind, RejectionKind::NotFound);
        let err = RelayError::from(ValidationError::PollEnded(PollId::new(9)));
        assert_eq!(Rejection::from(&err).kind, RejectionKind::Validation);
    }

    #[test]
    fn submission_keeps_ledger_reason() {
        let err = RelayError::Submission {
            reason: RevertReason::AlreadyVoted,
            tx_ref: TxRef::new([1; 32]),
        };
        let r = Rejection::from(&err);
        assert_eq!(r.kind, RejectionKind::Submission);
        assert_eq!(r.message, RevertReason::AlreadyVoted.to_string());
    }

    #[test]
    fn json_omits_absent_fields() {
        let err = RelayError::LaneUnavailable { waited_secs: 5 };
        let json = serde_json::to_value(Rejection::from(&err)).unwrap();
        assert_eq!(json["kind"], "unavailable");
        assert!(json.get("expected_nonce").is_none());
        assert!(json.get("tx_ref").is_none());
    }

    #[test]
    fn request_binds_caller_and_target() {
        let caller = AccountAddress::new(format!("blt_{}", "a".repeat(60)));
        let target = AccountAddress::new(format!("blt_{}", "b".repeat(60)));
        let req: VoteRequest = serde_json::from_str(
            r#"{"option_index": 2, "signature": "00ff", "voter_nonce": 7}"#,
        )
        .unwrap();
        let intent = req.into_intent(PollId::new(3), caller.clone(), target.clone());
        assert_eq!(intent.voter, caller);
        assert_eq!(intent.relay_target, target);
        assert_eq!(intent.voter_nonce, VoterNonce::new(7));
        assert_eq!(intent.option_index, 2);
    }
}
