//! Schema version and counters kept in the `meta` database.

use heed::types::Bytes;
use heed::{Database, RoTxn, RwTxn};

use crate::{LmdbEnvironment, LmdbError};

/// The schema version that the current code expects.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

const SCHEMA_VERSION_KEY: &[u8] = b"schema_version";
const NEXT_POLL_ID_KEY: &[u8] = b"next_poll_id";

/// Stamp a fresh database, refuse one written by newer code.
pub(crate) fn ensure_schema_version(
    meta_db: &Database<Bytes, Bytes>,
    wtxn: &mut RwTxn,
) -> Result<(), LmdbError> {
    let stored = read_u64(meta_db, wtxn, SCHEMA_VERSION_KEY)?;
    match stored {
        None => {
            meta_db.put(
                wtxn,
                SCHEMA_VERSION_KEY,
                &(CURRENT_SCHEMA_VERSION as u64).to_be_bytes(),
            )?;
            Ok(())
        }
        Some(v) if v > CURRENT_SCHEMA_VERSION as u64 => Err(LmdbError::Heed(format!(
            "database schema version {v} is newer than supported version {CURRENT_SCHEMA_VERSION}"
        ))),
        Some(_) => Ok(()),
    }
}

pub(crate) fn read_u64(
    db: &Database<Bytes, Bytes>,
    txn: &RoTxn,
    key: &[u8],
) -> Result<Option<u64>, LmdbError> {
    match db.get(txn, key)? {
        Some(bytes) => {
            let arr: [u8; 8] = bytes.try_into().map_err(|_| {
                LmdbError::Serialization(format!(
                    "meta key '{}' has unexpected length",
                    String::from_utf8_lossy(key)
                ))
            })?;
            Ok(Some(u64::from_be_bytes(arr)))
        }
        None => Ok(None),
    }
}

impl LmdbEnvironment {
    /// Allocate the next poll id (starting at 1) inside a write transaction.
    pub(crate) fn allocate_poll_id(&self) -> Result<u64, LmdbError> {
        let mut wtxn = self.env.write_txn()?;
        let next = read_u64(&self.meta_db, &wtxn, NEXT_POLL_ID_KEY)?.unwrap_or(1);
        self.meta_db
            .put(&mut wtxn, NEXT_POLL_ID_KEY, &(next + 1).to_be_bytes())?;
        wtxn.commit()?;
        Ok(next)
    }

    pub fn schema_version(&self) -> Result<u32, LmdbError> {
        let rtxn = self.env.read_txn()?;
        Ok(read_u64(&self.meta_db, &rtxn, SCHEMA_VERSION_KEY)?.unwrap_or(0) as u32)
    }
}
