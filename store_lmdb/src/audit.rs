//! LMDB implementation of AuditStore.

use ballot_store::audit::{AuditMark, AuditStore};
use ballot_store::StoreError;
use ballot_types::PollId;

use crate::{LmdbEnvironment, LmdbError};

impl AuditStore for LmdbEnvironment {
    fn get_audit_mark(&self, poll: PollId) -> Result<Option<AuditMark>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        match self
            .audit_db
            .get(&rtxn, &poll.to_key())
            .map_err(LmdbError::from)?
        {
            Some(bytes) => Ok(Some(bincode::deserialize(bytes).map_err(LmdbError::from)?)),
            None => Ok(None),
        }
    }

    fn put_audit_mark(&self, poll: PollId, mark: &AuditMark) -> Result<(), StoreError> {
        let bytes = bincode::serialize(mark).map_err(LmdbError::from)?;
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        self.audit_db
            .put(&mut wtxn, &poll.to_key(), &bytes)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }
}
