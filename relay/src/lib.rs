//! Gasless vote relay.
//!
//! A voter signs a vote intent; the relay account submits it to the ledger
//! and pays for it. The relay:
//! - pre-filters intents against the local mirror
//! - checks the voter's contract-wide nonce against the ledger
//! - serializes every submission through one lane per relay account
//! - mirrors confirmed outcomes, and only confirmed outcomes
//! - reconciles the mirror against ledger truth in the background

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod logging;
pub mod metrics;
pub mod mirror;
pub mod nonce;
pub mod reconciler;
pub mod registry;
pub mod service;
pub mod shutdown;
pub mod submitter;
pub mod tracing_spans;
pub mod verifier;

#[cfg(test)]
mod test_support;

pub use api::{Rejection, RejectionKind, VoteRequest, VoteResponse};
pub use config::{RelayConfig, RelaySettings};
pub use error::{RelayError, ReplayStage, ValidationError};
pub use events::{EndCause, EventBus, MirrorEvent};
pub use lifecycle::PollLifecycle;
pub use logging::{init_logging, LogFormat};
pub use metrics::RelayMetrics;
pub use mirror::MirrorWriter;
pub use nonce::{NonceGuard, RelayNonceAllocator, RelayNonceLease};
pub use reconciler::{ReconcileReport, Reconciler};
pub use registry::PollRegistry;
pub use service::{
    MirrorOutcome, PollFilter, PollPage, PollView, VoteReceipt, VoteRelay, VoteStatus,
};
pub use shutdown::ShutdownController;
pub use submitter::{RelayAccount, RelaySubmitter, SubmitOutcome};
pub use verifier::{IntentVerifier, VerifiedIntent};
