//! LMDB environment setup.

use std::path::Path;
use std::sync::Arc;

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};

use crate::meta::{self, CURRENT_SCHEMA_VERSION};
use crate::LmdbError;

/// Names of every database the mirror uses.
pub(crate) const DATABASES: &[&str] = &["polls", "votes", "tx_votes", "repairs", "audit", "meta"];

/// Wraps the LMDB environment and all database handles.
pub struct LmdbEnvironment {
    pub(crate) env: Arc<Env>,
    /// `PollId` (u64 BE) → bincode `Poll`.
    pub(crate) polls_db: Database<Bytes, Bytes>,
    /// `PollId` (u64 BE) ++ voter address → bincode `Vote`. The key is the
    /// uniqueness constraint.
    pub(crate) votes_db: Database<Bytes, Bytes>,
    /// `TxRef` → vote key.
    pub(crate) tx_votes_db: Database<Bytes, Bytes>,
    /// `TxRef` → bincode `RepairTicket`.
    pub(crate) repairs_db: Database<Bytes, Bytes>,
    /// `PollId` (u64 BE) → bincode `AuditMark`.
    pub(crate) audit_db: Database<Bytes, Bytes>,
    pub(crate) meta_db: Database<Bytes, Bytes>,
}

impl LmdbEnvironment {
    /// Open or create an LMDB environment at the given path.
    pub fn open(path: &Path, map_size: usize) -> Result<Self, LmdbError> {
        std::fs::create_dir_all(path)?;

        // SAFETY: the environment is opened once per directory by this
        // process and never concurrently re-opened with different flags.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(DATABASES.len() as u32)
                .open(path)?
        };

        let mut wtxn = env.write_txn()?;
        let polls_db = env.create_database(&mut wtxn, Some("polls"))?;
        let votes_db = env.create_database(&mut wtxn, Some("votes"))?;
        let tx_votes_db = env.create_database(&mut wtxn, Some("tx_votes"))?;
        let repairs_db = env.create_database(&mut wtxn, Some("repairs"))?;
        let audit_db = env.create_database(&mut wtxn, Some("audit"))?;
        let meta_db: Database<Bytes, Bytes> = env.create_database(&mut wtxn, Some("meta"))?;
        meta::ensure_schema_version(&meta_db, &mut wtxn)?;
        wtxn.commit()?;

        tracing::info!(
            path = %path.display(),
            map_size,
            schema = CURRENT_SCHEMA_VERSION,
            "opened mirror environment"
        );

        Ok(Self {
            env: Arc::new(env),
            polls_db,
            votes_db,
            tx_votes_db,
            repairs_db,
            audit_db,
            meta_db,
        })
    }

    /// The underlying heed environment.
    pub fn env(&self) -> &Arc<Env> {
        &self.env
    }
}
