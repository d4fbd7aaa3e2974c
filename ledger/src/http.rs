//! JSON-RPC ledger client over HTTP.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use ballot_types::{AccountAddress, LedgerPollId, RelayNonce, TxRef, VoterNonce};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use crate::{LedgerClient, LedgerError, LedgerPoll, Receipt, SignedTransaction, VoteEvent};

/// RPC error code a ledger node returns when the relay nonce slot is taken.
pub const NONCE_TOO_LOW_CODE: i64 = -32010;
/// RPC error code for an unknown poll id.
pub const POLL_NOT_FOUND_CODE: i64 = -32011;

/// Talks to a ledger node's JSON-RPC endpoint.
///
/// Methods are namespaced `ballot_*` and scoped to one contract address.
pub struct HttpLedgerClient {
    http: reqwest::Client,
    url: String,
    contract: AccountAddress,
    next_id: AtomicU64,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct NonceTooLowData {
    expected: u64,
    provided: u64,
}

impl HttpLedgerClient {
    pub fn new(
        url: impl Into<String>,
        contract: AccountAddress,
        request_timeout: Duration,
    ) -> Result<Self, LedgerError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| LedgerError::Transport(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            http,
            url: url.into(),
            contract,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn contract(&self) -> &AccountAddress {
        &self.contract
    }

    /// Send a JSON-RPC request and decode the `result` field.
    async fn rpc_call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, LedgerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params.clone(),
        });

        let response = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LedgerError::Transport(format!("{method}: request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(LedgerError::Transport(format!(
                "{method}: ledger returned HTTP {}",
                response.status()
            )));
        }

        let mut envelope: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LedgerError::Decode(format!("{method}: invalid JSON response: {e}")))?;

        if let Some(err) = envelope.get_mut("error").map(serde_json::Value::take) {
            if !err.is_null() {
                let err: RpcErrorBody = serde_json::from_value(err)
                    .map_err(|e| LedgerError::Decode(format!("{method}: bad error body: {e}")))?;
                return Err(classify_rpc_error(err, &params));
            }
        }

        let result = envelope
            .get_mut("result")
            .map(serde_json::Value::take)
            .unwrap_or(serde_json::Value::Null);
        serde_json::from_value(result)
            .map_err(|e| LedgerError::Decode(format!("{method}: invalid result: {e}")))
    }
}

fn classify_rpc_error(err: RpcErrorBody, params: &serde_json::Value) -> LedgerError {
    match err.code {
        NONCE_TOO_LOW_CODE => {
            if let Some(data) = err
                .data
                .and_then(|d| serde_json::from_value::<NonceTooLowData>(d).ok())
            {
                return LedgerError::RelayNonceTooLow {
                    expected: RelayNonce::new(data.expected),
                    provided: RelayNonce::new(data.provided),
                };
            }
            LedgerError::Rpc {
                code: err.code,
                message: err.message,
            }
        }
        POLL_NOT_FOUND_CODE => match params.get("poll").and_then(|p| p.as_u64()) {
            Some(poll) => LedgerError::PollNotFound(LedgerPollId::new(poll)),
            None => LedgerError::Rpc {
                code: err.code,
                message: err.message,
            },
        },
        code => LedgerError::Rpc {
            code,
            message: err.message,
        },
    }
}

impl LedgerClient for HttpLedgerClient {
    async fn read_poll(&self, poll: LedgerPollId) -> Result<LedgerPoll, LedgerError> {
        self.rpc_call(
            "ballot_getPoll",
            json!({ "contract": self.contract, "poll": poll.get() }),
        )
        .await
    }

    async fn read_tallies(&self, poll: LedgerPollId) -> Result<Vec<u64>, LedgerError> {
        self.rpc_call(
            "ballot_getVotes",
            json!({ "contract": self.contract, "poll": poll.get() }),
        )
        .await
    }

    async fn read_voter_nonce(&self, voter: &AccountAddress) -> Result<VoterNonce, LedgerError> {
        let n: u64 = self
            .rpc_call(
                "ballot_nonces",
                json!({ "contract": self.contract, "voter": voter }),
            )
            .await?;
        Ok(VoterNonce::new(n))
    }

    async fn has_voted(
        &self,
        poll: LedgerPollId,
        voter: &AccountAddress,
    ) -> Result<bool, LedgerError> {
        self.rpc_call(
            "ballot_hasVoted",
            json!({ "contract": self.contract, "poll": poll.get(), "voter": voter }),
        )
        .await
    }

    async fn read_vote_events(&self, poll: LedgerPollId) -> Result<Vec<VoteEvent>, LedgerError> {
        self.rpc_call(
            "ballot_getVoteEvents",
            json!({ "contract": self.contract, "poll": poll.get() }),
        )
        .await
    }

    async fn pending_relay_nonce(
        &self,
        account: &AccountAddress,
    ) -> Result<RelayNonce, LedgerError> {
        let n: u64 = self
            .rpc_call(
                "ballot_getTransactionCount",
                json!({ "account": account, "tag": "pending" }),
            )
            .await?;
        Ok(RelayNonce::new(n))
    }

    async fn submit_transaction(&self, tx: &SignedTransaction) -> Result<TxRef, LedgerError> {
        let raw = tx.encode_hex()?;
        let accepted: String = self
            .rpc_call("ballot_sendRawTransaction", json!({ "raw": raw }))
            .await?;
        let tx_ref = TxRef::from_hex(&accepted).map_err(|e| LedgerError::Decode(e.to_string()))?;
        if tx_ref != tx.tx_ref {
            tracing::warn!(
                expected = %tx.tx_ref,
                returned = %tx_ref,
                "ledger acknowledged a different transaction reference"
            );
        }
        Ok(tx.tx_ref)
    }

    async fn fetch_receipt(&self, tx_ref: &TxRef) -> Result<Option<Receipt>, LedgerError> {
        self.rpc_call(
            "ballot_getTransactionReceipt",
            json!({ "tx": tx_ref.to_string() }),
        )
        .await
    }
}
