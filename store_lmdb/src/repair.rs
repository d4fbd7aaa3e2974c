//! LMDB implementation of RepairStore, keyed by the 32-byte `TxRef`.

use ballot_store::repair::{RepairStore, RepairTicket};
use ballot_store::StoreError;
use ballot_types::TxRef;

use crate::{LmdbEnvironment, LmdbError};

impl RepairStore for LmdbEnvironment {
    fn put_repair(&self, ticket: &RepairTicket) -> Result<(), StoreError> {
        let bytes = bincode::serialize(ticket).map_err(LmdbError::from)?;
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        self.repairs_db
            .put(&mut wtxn, ticket.tx_ref.as_bytes(), &bytes)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn get_repair(&self, tx_ref: &TxRef) -> Result<Option<RepairTicket>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        match self
            .repairs_db
            .get(&rtxn, tx_ref.as_bytes())
            .map_err(LmdbError::from)?
        {
            Some(bytes) => Ok(Some(bincode::deserialize(bytes).map_err(LmdbError::from)?)),
            None => Ok(None),
        }
    }

    fn list_repairs(&self) -> Result<Vec<RepairTicket>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let mut tickets = Vec::new();
        for entry in self.repairs_db.iter(&rtxn).map_err(LmdbError::from)? {
            let (_key, val) = entry.map_err(LmdbError::from)?;
            tickets.push(bincode::deserialize(val).map_err(LmdbError::from)?);
        }
        Ok(tickets)
    }

    fn delete_repair(&self, tx_ref: &TxRef) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        self.repairs_db
            .delete(&mut wtxn, tx_ref.as_bytes())
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }
}
