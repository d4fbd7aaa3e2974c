//! Nullable infrastructure for deterministic testing.
//!
//! Every external dependency of the relay (clock, mirror storage, ledger) is
//! abstracted behind a trait. This crate provides test-friendly
//! implementations that:
//! - Return deterministic values
//! - Can be controlled programmatically (time, inclusion, injected faults)
//! - Never touch the filesystem or network
//!
//! Usage: swap real implementations for nullables in tests.

pub mod clock;
pub mod ledger;
pub mod store;

pub use clock::NullClock;
pub use ledger::{NullLedger, CREATE_POLL_GAS, VOTE_GAS};
pub use store::NullMirrorStore;
