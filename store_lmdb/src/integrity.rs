//! Mirror integrity checks.
//!
//! Run on startup (and from `ballot-relayd check-store`) to detect
//! corruption before the relay starts writing. Besides confirming every
//! database opens and reads, it checks the mirror's own invariants: option
//! tallies sum to the poll total, and each poll total equals the number of
//! vote records stored for it.

use std::path::Path;

use ballot_store::{PollStore, VoteStore};

use crate::environment::DATABASES;
use crate::{LmdbEnvironment, LmdbError};

/// Summary of an integrity check run.
#[derive(Debug, Default)]
pub struct IntegrityReport {
    pub databases_checked: u32,
    pub total_entries: u64,
    pub polls_checked: u32,
    pub errors: Vec<String>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Check database readability and tally invariants.
///
/// Read failures are recorded in the report rather than returned as a hard
/// error; only failing to open a read transaction is fatal.
pub fn check_integrity(store: &LmdbEnvironment) -> Result<IntegrityReport, LmdbError> {
    let mut report = IntegrityReport::default();
    {
        let rtxn = store.env.read_txn()?;
        for &name in DATABASES {
            match store
                .env
                .open_database::<heed::types::Bytes, heed::types::Bytes>(&rtxn, Some(name))
            {
                Ok(Some(db)) => {
                    report.databases_checked += 1;
                    match db.len(&rtxn) {
                        Ok(count) => report.total_entries += count,
                        Err(e) => report
                            .errors
                            .push(format!("failed to read database '{name}': {e}")),
                    }
                }
                Ok(None) => report.errors.push(format!("database '{name}' is missing")),
                Err(e) => report
                    .errors
                    .push(format!("failed to open database '{name}': {e}")),
            }
        }
    }

    let polls = match store.list_polls() {
        Ok(polls) => polls,
        Err(e) => {
            report.errors.push(format!("failed to decode polls: {e}"));
            return Ok(report);
        }
    };
    for poll in polls {
        report.polls_checked += 1;
        let option_sum: u64 = poll.options.iter().map(|o| o.votes).sum();
        if option_sum != poll.total_votes {
            report.errors.push(format!(
                "{}: option tallies sum to {option_sum} but total is {}",
                poll.id, poll.total_votes
            ));
        }
        match store.votes_for_poll(poll.id) {
            Ok(votes) if votes.len() as u64 != poll.total_votes => report.errors.push(format!(
                "{}: {} vote records but total is {}",
                poll.id,
                votes.len(),
                poll.total_votes
            )),
            Ok(_) => {}
            Err(e) => report
                .errors
                .push(format!("{}: failed to read votes: {e}", poll.id)),
        }
    }

    if report.is_healthy() {
        tracing::info!(
            databases = report.databases_checked,
            entries = report.total_entries,
            polls = report.polls_checked,
            "mirror integrity check passed"
        );
    } else {
        for err in &report.errors {
            tracing::error!(%err, "mirror integrity check failed");
        }
    }
    Ok(report)
}

/// Check if the data directory looks valid before opening.
///
/// A nonexistent directory is a fresh start. An existing directory without
/// `data.mdb` suggests corruption or a wrong path.
pub fn check_data_dir(path: &Path) -> Result<(), String> {
    if !path.exists() {
        return Ok(());
    }
    if !path.join("data.mdb").exists() {
        return Err(format!(
            "LMDB directory exists but data.mdb is missing at {}",
            path.display()
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poll::tests::{sample_poll, temp_env};
    use ballot_types::{AccountAddress, PollStatus, Timestamp, TxRef, Vote};

    #[test]
    fn fresh_store_is_healthy() {
        let (_dir, env) = temp_env();
        let report = check_integrity(&env).unwrap();
        assert!(report.is_healthy(), "{:?}", report.errors);
        assert_eq!(report.databases_checked, DATABASES.len() as u32);
    }

    #[test]
    fn recorded_votes_keep_store_healthy() {
        let (_dir, env) = temp_env();
        let poll = sample_poll(&env, PollStatus::Active);
        env.record_confirmed_vote(&Vote {
            poll_id: poll.id,
            voter: AccountAddress::new(format!("blt_{}", "5".repeat(60))),
            option_index: 0,
            tx_ref: TxRef::new([1; 32]),
            recorded_at: Timestamp::new(1),
        })
        .unwrap();
        let report = check_integrity(&env).unwrap();
        assert!(report.is_healthy(), "{:?}", report.errors);
        assert_eq!(report.polls_checked, 1);
    }

    #[test]
    fn tally_without_vote_record_is_flagged() {
        let (_dir, env) = temp_env();
        let mut poll = sample_poll(&env, PollStatus::Active);
        poll.id = env.next_poll_id().unwrap();
        poll.options[0].votes = 1;
        poll.total_votes = 1;
        env.insert_poll(&poll).unwrap();
        let report = check_integrity(&env).unwrap();
        assert!(!report.is_healthy());
    }

    #[test]
    fn check_data_dir_fresh_path() {
        let dir = tempfile::tempdir().unwrap();
        assert!(check_data_dir(&dir.path().join("missing")).is_ok());
    }

    #[test]
    fn check_data_dir_without_data_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(check_data_dir(dir.path()).is_err());
    }
}
