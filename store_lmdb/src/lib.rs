//! LMDB storage backend for the ballot relay mirror.
//!
//! Implements every trait from `ballot-store` on [`LmdbEnvironment`] using
//! the `heed` bindings. LMDB allows a single writer at a time, so each
//! read-modify-write below runs inside one write transaction and is atomic
//! with respect to every other writer, in-process or not.

pub mod audit;
pub mod environment;
pub mod error;
pub mod integrity;
pub mod meta;
pub mod poll;
pub mod repair;
pub mod vote;

pub use environment::LmdbEnvironment;
pub use error::LmdbError;
pub use integrity::{check_data_dir, check_integrity, IntegrityReport};
