//! LMDB implementation of VoteStore.
//!
//! Key format: `poll_id (u64 BE) ++ voter.as_str().as_bytes()`. Addresses
//! have a fixed length, so a prefix scan on the poll id yields exactly that
//! poll's votes. The key doubles as the `(poll, voter)` uniqueness constraint.

use ballot_store::vote::{RecordOutcome, VoteStore};
use ballot_store::StoreError;
use ballot_types::{AccountAddress, PollId, TxRef, Vote};

use crate::{LmdbEnvironment, LmdbError};

pub(crate) fn vote_key(poll: PollId, voter: &AccountAddress) -> Vec<u8> {
    let voter = voter.as_str().as_bytes();
    let mut key = Vec::with_capacity(8 + voter.len());
    key.extend_from_slice(&poll.to_key());
    key.extend_from_slice(voter);
    key
}

impl VoteStore for LmdbEnvironment {
    fn get_vote(&self, poll: PollId, voter: &AccountAddress) -> Result<Option<Vote>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        match self
            .votes_db
            .get(&rtxn, &vote_key(poll, voter))
            .map_err(LmdbError::from)?
        {
            Some(bytes) => Ok(Some(bincode::deserialize(bytes).map_err(LmdbError::from)?)),
            None => Ok(None),
        }
    }

    fn votes_for_poll(&self, poll: PollId) -> Result<Vec<Vote>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let prefix = poll.to_key();
        let mut votes = Vec::new();
        for entry in self
            .votes_db
            .prefix_iter(&rtxn, &prefix)
            .map_err(LmdbError::from)?
        {
            let (_key, val) = entry.map_err(LmdbError::from)?;
            votes.push(bincode::deserialize(val).map_err(LmdbError::from)?);
        }
        Ok(votes)
    }

    fn find_vote_by_tx(&self, tx_ref: &TxRef) -> Result<Option<Vote>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let Some(key) = self
            .tx_votes_db
            .get(&rtxn, tx_ref.as_bytes())
            .map_err(LmdbError::from)?
        else {
            return Ok(None);
        };
        let bytes = self
            .votes_db
            .get(&rtxn, key)
            .map_err(LmdbError::from)?
            .ok_or_else(|| StoreError::Corruption(format!("dangling tx index for {tx_ref}")))?;
        Ok(Some(bincode::deserialize(bytes).map_err(LmdbError::from)?))
    }

    fn record_confirmed_vote(&self, vote: &Vote) -> Result<RecordOutcome, StoreError> {
        let key = vote_key(vote.poll_id, &vote.voter);
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;

        if self
            .votes_db
            .get(&wtxn, &key)
            .map_err(LmdbError::from)?
            .is_some()
        {
            // Dropping the transaction aborts it; no tally is touched.
            return Ok(RecordOutcome::AlreadyRecorded);
        }

        let mut poll = self
            .read_poll(&wtxn, vote.poll_id)?
            .ok_or_else(|| StoreError::NotFound(vote.poll_id.to_string()))?;
        let option = poll
            .options
            .get_mut(vote.option_index as usize)
            .ok_or_else(|| {
                StoreError::Conflict(format!(
                    "option {} out of range for {}",
                    vote.option_index, vote.poll_id
                ))
            })?;
        option.votes += 1;
        poll.total_votes += 1;

        let poll_bytes = bincode::serialize(&poll).map_err(LmdbError::from)?;
        let vote_bytes = bincode::serialize(vote).map_err(LmdbError::from)?;
        self.polls_db
            .put(&mut wtxn, &vote.poll_id.to_key(), &poll_bytes)
            .map_err(LmdbError::from)?;
        self.votes_db
            .put(&mut wtxn, &key, &vote_bytes)
            .map_err(LmdbError::from)?;
        self.tx_votes_db
            .put(&mut wtxn, vote.tx_ref.as_bytes(), &key)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;

        tracing::debug!(poll = %vote.poll_id, voter = %vote.voter, tx = %vote.tx_ref, "vote recorded");
        Ok(RecordOutcome::Recorded)
    }

    fn vote_count(&self) -> Result<u64, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        Ok(self.votes_db.len(&rtxn).map_err(LmdbError::from)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poll::tests::{sample_poll, temp_env};
    use ballot_store::PollStore;
    use ballot_types::{PollStatus, Timestamp};

    fn voter(c: char) -> AccountAddress {
        AccountAddress::new(format!("blt_{}", c.to_string().repeat(60)))
    }

    fn vote(poll: PollId, who: char, option: u32, tx: u8) -> Vote {
        Vote {
            poll_id: poll,
            voter: voter(who),
            option_index: option,
            tx_ref: TxRef::new([tx; 32]),
            recorded_at: Timestamp::new(50),
        }
    }

    #[test]
    fn record_increments_tallies_once() {
        let (_dir, env) = temp_env();
        let poll = sample_poll(&env, PollStatus::Active);

        assert_eq!(
            env.record_confirmed_vote(&vote(poll.id, 'a', 1, 1)).unwrap(),
            RecordOutcome::Recorded
        );
        assert_eq!(
            env.record_confirmed_vote(&vote(poll.id, 'a', 0, 2)).unwrap(),
            RecordOutcome::AlreadyRecorded
        );

        let stored = env.get_poll(poll.id).unwrap().unwrap();
        assert_eq!(stored.tallies(), vec![0, 1]);
        assert_eq!(stored.total_votes, 1);
        assert_eq!(env.vote_count().unwrap(), 1);
        assert_eq!(env.get_vote(poll.id, &voter('a')).unwrap().unwrap().option_index, 1);
    }

    #[test]
    fn same_voter_may_vote_on_different_polls() {
        let (_dir, env) = temp_env();
        let p1 = sample_poll(&env, PollStatus::Active);
        let p2 = sample_poll(&env, PollStatus::Active);
        env.record_confirmed_vote(&vote(p1.id, 'a', 0, 1)).unwrap();
        env.record_confirmed_vote(&vote(p2.id, 'a', 0, 2)).unwrap();
        assert_eq!(env.votes_for_poll(p1.id).unwrap().len(), 1);
        assert_eq!(env.votes_for_poll(p2.id).unwrap().len(), 1);
    }

    #[test]
    fn out_of_range_option_writes_nothing() {
        let (_dir, env) = temp_env();
        let poll = sample_poll(&env, PollStatus::Active);
        assert!(matches!(
            env.record_confirmed_vote(&vote(poll.id, 'a', 5, 1)),
            Err(StoreError::Conflict(_))
        ));
        assert_eq!(env.vote_count().unwrap(), 0);
        assert_eq!(env.get_poll(poll.id).unwrap().unwrap().total_votes, 0);
    }

    #[test]
    fn unknown_poll_is_not_found() {
        let (_dir, env) = temp_env();
        assert!(matches!(
            env.record_confirmed_vote(&vote(PollId::new(99), 'a', 0, 1)),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn lookup_by_tx_ref() {
        let (_dir, env) = temp_env();
        let poll = sample_poll(&env, PollStatus::Active);
        env.record_confirmed_vote(&vote(poll.id, 'b', 0, 7)).unwrap();
        let found = env.find_vote_by_tx(&TxRef::new([7; 32])).unwrap().unwrap();
        assert_eq!(found.voter, voter('b'));
        assert!(env.find_vote_by_tx(&TxRef::new([8; 32])).unwrap().is_none());
    }

    #[test]
    fn votes_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let poll_id = {
            let env = LmdbEnvironment::open(dir.path(), 16 * 1024 * 1024).unwrap();
            let poll = sample_poll(&env, PollStatus::Active);
            env.record_confirmed_vote(&vote(poll.id, 'c', 1, 3)).unwrap();
            poll.id
        };
        let env = LmdbEnvironment::open(dir.path(), 16 * 1024 * 1024).unwrap();
        assert_eq!(env.get_poll(poll_id).unwrap().unwrap().tallies(), vec![0, 1]);
        assert!(env.get_vote(poll_id, &voter('c')).unwrap().is_some());
    }
}
