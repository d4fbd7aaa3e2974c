//! Fundamental types for the gasless ballot relay.
//!
//! This crate defines the vocabulary shared by every other crate in the
//! workspace: account addresses, poll identifiers, the two independent nonce
//! spaces, transaction references, keys, timestamps, and the mirrored
//! poll/vote records.

pub mod address;
pub mod error;
pub mod hash;
pub mod ids;
pub mod intent;
pub mod keys;
pub mod nonce;
pub mod poll;
pub mod time;
pub mod vote;

pub use address::AccountAddress;
pub use error::BallotError;
pub use hash::TxRef;
pub use ids::{LedgerPollId, PollId};
pub use intent::VoteIntent;
pub use keys::{KeyPair, PrivateKey, PublicKey, Signature};
pub use nonce::{RelayNonce, VoterNonce};
pub use poll::{Poll, PollOption, PollStatus};
pub use time::{Clock, SystemClock, Timestamp};
pub use vote::Vote;
