//! Cryptographic primitives for the ballot relay.
//!
//! - **Ed25519** for voter intent signatures and relay transaction signatures
//! - **Blake2b-256** for intent digests and transaction references
//! - Address derivation with `blt_` prefix and base32 encoding

pub mod address;
pub mod hash;
pub mod intent;
pub mod keys;
pub mod sign;

pub use address::{decode_address, derive_address, public_key_of, validate_address};
pub use hash::{blake2b_256, blake2b_256_multi, hash_transaction};
pub use intent::{intent_digest, sign_intent, verify_intent, IntentPayload};
pub use keys::{generate_keypair, keypair_from_private, keypair_from_seed, public_from_private};
pub use sign::{sign_message, verify_signature};
