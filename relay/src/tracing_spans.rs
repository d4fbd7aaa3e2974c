//! Pre-built [`tracing::Span`] constructors for relay operations.
//!
//! Consistent span names and fields make it easy to follow a single vote
//! from intent to mirror write across log lines.

use ballot_types::{AccountAddress, PollId};
use tracing::{info_span, Span};

/// Span covering one vote intent, from verification to mirror write.
pub fn vote_span(poll: PollId, voter: &AccountAddress) -> Span {
    info_span!("vote", poll = %poll, voter = %voter)
}

/// Span covering one sponsored transaction on the submission lane.
pub fn submit_span(call: &str) -> Span {
    info_span!("submit", call = %call, relay_nonce = tracing::field::Empty, tx = tracing::field::Empty)
}

/// Span covering a reconciler pass.
pub fn reconcile_span(pass: u64) -> Span {
    info_span!("reconcile", pass = pass)
}

/// Span covering a poll lifecycle or registry operation.
pub fn poll_span(op: &str, poll: PollId) -> Span {
    info_span!("poll", op = %op, poll = %poll)
}
