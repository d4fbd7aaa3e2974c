//! LMDB implementation of PollStore.

use heed::RoTxn;

use ballot_store::poll::{EndOutcome, PollStore};
use ballot_store::StoreError;
use ballot_types::{LedgerPollId, Poll, PollId, PollStatus, Timestamp};

use crate::{LmdbEnvironment, LmdbError};

impl LmdbEnvironment {
    pub(crate) fn read_poll(&self, txn: &RoTxn, id: PollId) -> Result<Option<Poll>, LmdbError> {
        match self.polls_db.get(txn, &id.to_key())? {
            Some(bytes) => Ok(Some(bincode::deserialize(bytes)?)),
            None => Ok(None),
        }
    }

    /// Read-modify-write a poll inside a single write transaction.
    ///
    /// `f` returns `Ok(true)` to persist the modified poll, `Ok(false)` to
    /// leave the stored record untouched.
    fn update_poll<F>(&self, id: PollId, f: F) -> Result<(Poll, bool), StoreError>
    where
        F: FnOnce(&mut Poll) -> Result<bool, StoreError>,
    {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let mut poll = self
            .read_poll(&wtxn, id)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let changed = f(&mut poll)?;
        if changed {
            let bytes = bincode::serialize(&poll).map_err(LmdbError::from)?;
            self.polls_db
                .put(&mut wtxn, &id.to_key(), &bytes)
                .map_err(LmdbError::from)?;
            wtxn.commit().map_err(LmdbError::from)?;
        }
        Ok((poll, changed))
    }
}

impl PollStore for LmdbEnvironment {
    fn next_poll_id(&self) -> Result<PollId, StoreError> {
        Ok(PollId::new(self.allocate_poll_id()?))
    }

    fn insert_poll(&self, poll: &Poll) -> Result<(), StoreError> {
        let key = poll.id.to_key();
        let bytes = bincode::serialize(poll).map_err(LmdbError::from)?;
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        if self
            .polls_db
            .get(&wtxn, &key)
            .map_err(LmdbError::from)?
            .is_some()
        {
            return Err(StoreError::Duplicate(poll.id.to_string()));
        }
        self.polls_db
            .put(&mut wtxn, &key, &bytes)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn get_poll(&self, id: PollId) -> Result<Option<Poll>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        Ok(self.read_poll(&rtxn, id)?)
    }

    fn list_polls(&self) -> Result<Vec<Poll>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let mut polls = Vec::new();
        for entry in self.polls_db.iter(&rtxn).map_err(LmdbError::from)? {
            let (_key, val) = entry.map_err(LmdbError::from)?;
            polls.push(bincode::deserialize(val).map_err(LmdbError::from)?);
        }
        Ok(polls)
    }

    fn activate_poll(
        &self,
        id: PollId,
        ledger_poll_id: LedgerPollId,
    ) -> Result<Poll, StoreError> {
        let (poll, _) = self.update_poll(id, |poll| {
            if poll.status != PollStatus::Created {
                return Err(StoreError::Conflict(format!(
                    "{id} is {}, cannot activate",
                    poll.status.as_str()
                )));
            }
            poll.status = PollStatus::Active;
            poll.ledger_poll_id = Some(ledger_poll_id);
            Ok(true)
        })?;
        Ok(poll)
    }

    fn end_poll(&self, id: PollId) -> Result<EndOutcome, StoreError> {
        let (poll, changed) = self.update_poll(id, |poll| {
            if poll.status == PollStatus::Ended {
                return Ok(false);
            }
            poll.status = PollStatus::Ended;
            Ok(true)
        })?;
        Ok(if changed {
            EndOutcome::Transitioned(poll)
        } else {
            EndOutcome::AlreadyEnded(poll)
        })
    }

    fn extend_poll(&self, id: PollId, new_end: Timestamp) -> Result<Poll, StoreError> {
        let (poll, _) = self.update_poll(id, |poll| {
            if poll.status != PollStatus::Active {
                return Err(StoreError::Conflict(format!(
                    "{id} is {}, cannot extend",
                    poll.status.as_str()
                )));
            }
            if !new_end.is_after(poll.end_time) {
                return Err(StoreError::Conflict(format!(
                    "new end {new_end} is not after current end {}",
                    poll.end_time
                )));
            }
            poll.end_time = new_end;
            Ok(true)
        })?;
        Ok(poll)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ballot_types::{AccountAddress, PollOption};

    pub(crate) fn temp_env() -> (tempfile::TempDir, LmdbEnvironment) {
        let dir = tempfile::tempdir().expect("temp dir");
        let env = LmdbEnvironment::open(dir.path(), 16 * 1024 * 1024).expect("open env");
        (dir, env)
    }

    pub(crate) fn sample_poll(env: &LmdbEnvironment, status: PollStatus) -> Poll {
        let poll = Poll {
            id: env.next_poll_id().unwrap(),
            question: "Lunch?".into(),
            options: vec![PollOption::new("pizza"), PollOption::new("salad")],
            creator: AccountAddress::new(format!("blt_{}", "3".repeat(60))),
            created_at: Timestamp::new(10),
            end_time: Timestamp::new(1_000),
            status,
            ledger_poll_id: (status != PollStatus::Created).then(|| LedgerPollId::new(0)),
            total_votes: 0,
        };
        env.insert_poll(&poll).unwrap();
        poll
    }

    #[test]
    fn poll_ids_are_sequential() {
        let (_dir, env) = temp_env();
        assert_eq!(env.next_poll_id().unwrap(), PollId::new(1));
        assert_eq!(env.next_poll_id().unwrap(), PollId::new(2));
    }

    #[test]
    fn insert_and_read_back() {
        let (_dir, env) = temp_env();
        let poll = sample_poll(&env, PollStatus::Active);
        assert_eq!(env.get_poll(poll.id).unwrap(), Some(poll.clone()));
        assert_eq!(env.list_polls().unwrap().len(), 1);
    }

    #[test]
    fn duplicate_insert_rejected() {
        let (_dir, env) = temp_env();
        let poll = sample_poll(&env, PollStatus::Active);
        assert!(matches!(
            env.insert_poll(&poll),
            Err(StoreError::Duplicate(_))
        ));
    }

    #[test]
    fn end_poll_is_idempotent() {
        let (_dir, env) = temp_env();
        let poll = sample_poll(&env, PollStatus::Active);
        assert!(env.end_poll(poll.id).unwrap().transitioned());
        let second = env.end_poll(poll.id).unwrap();
        assert!(!second.transitioned());
        assert_eq!(second.poll().status, PollStatus::Ended);
    }

    #[test]
    fn activate_only_from_created() {
        let (_dir, env) = temp_env();
        let poll = sample_poll(&env, PollStatus::Created);
        let active = env.activate_poll(poll.id, LedgerPollId::new(9)).unwrap();
        assert_eq!(active.ledger_poll_id, Some(LedgerPollId::new(9)));
        assert!(matches!(
            env.activate_poll(poll.id, LedgerPollId::new(10)),
            Err(StoreError::Conflict(_))
        ));
    }

    #[test]
    fn extend_requires_active_and_later_end() {
        let (_dir, env) = temp_env();
        let poll = sample_poll(&env, PollStatus::Active);
        assert!(env.extend_poll(poll.id, Timestamp::new(500)).is_err());
        let extended = env.extend_poll(poll.id, Timestamp::new(2_000)).unwrap();
        assert_eq!(extended.end_time, Timestamp::new(2_000));

        env.end_poll(poll.id).unwrap();
        assert!(matches!(
            env.extend_poll(poll.id, Timestamp::new(3_000)),
            Err(StoreError::Conflict(_))
        ));
    }

    #[test]
    fn missing_poll_is_not_found() {
        let (_dir, env) = temp_env();
        assert_eq!(env.get_poll(PollId::new(77)).unwrap(), None);
        assert!(matches!(
            env.end_poll(PollId::new(77)),
            Err(StoreError::NotFound(_))
        ));
    }
}
