//! Ledger capability for the ballot relay.
//!
//! The ledger is the canonical, irreversible record of polls and votes (a
//! deployed poll contract). This crate defines:
//! - [`LedgerClient`]: the read/submit/receipt capability the relay depends on
//! - the sponsored-transaction model signed by the relay account
//! - receipts, contract events, and the closed set of revert reasons
//! - [`HttpLedgerClient`]: a JSON-RPC implementation over `reqwest`

pub mod client;
pub mod error;
pub mod http;
pub mod poll;
pub mod receipt;
pub mod transaction;

pub use client::LedgerClient;
pub use error::LedgerError;
pub use http::HttpLedgerClient;
pub use poll::{LedgerPoll, VoteEvent};
pub use receipt::{ContractEvent, Receipt, ReceiptStatus, RevertReason};
pub use transaction::{ContractCall, SignedTransaction, SponsoredTransaction};
