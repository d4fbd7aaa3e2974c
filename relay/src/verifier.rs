//! Pre-submission checks on a vote intent.
//!
//! Cheapest first; nothing touches the ledger. Signature validity and the
//! final replay check are left to the contract. The only write this path
//! can cause is lazy poll deactivation.

use std::sync::Arc;

use ballot_store::MirrorStore;
use ballot_types::{
    AccountAddress, LedgerPollId, Poll, PollStatus, Signature, VoteIntent, VoterNonce,
};

use crate::lifecycle::PollLifecycle;
use crate::{RelayError, ValidationError};

/// An intent that passed every local check, with its signature decoded.
#[derive(Clone, Debug)]
pub struct VerifiedIntent {
    pub poll: Poll,
    pub ledger_poll_id: LedgerPollId,
    pub option_index: u32,
    pub voter: AccountAddress,
    pub voter_nonce: VoterNonce,
    pub signature: Signature,
}

pub struct IntentVerifier<S> {
    store: Arc<S>,
    lifecycle: PollLifecycle<S>,
    contract: AccountAddress,
}

impl<S: MirrorStore> IntentVerifier<S> {
    pub fn new(store: Arc<S>, lifecycle: PollLifecycle<S>, contract: AccountAddress) -> Self {
        Self {
            store,
            lifecycle,
            contract,
        }
    }

    pub fn verify(&self, intent: &VoteIntent) -> Result<VerifiedIntent, RelayError> {
        let poll = self.lifecycle.load(intent.poll_id)?;
        match poll.status {
            PollStatus::Active => {}
            PollStatus::Created => return Err(ValidationError::PollNotActive(poll.id).into()),
            PollStatus::Ended => return Err(ValidationError::PollEnded(poll.id).into()),
        }
        let ledger_poll_id = poll
            .ledger_poll_id
            .ok_or(ValidationError::PollNotOnLedger(poll.id))?;

        let count = poll.option_count() as u32;
        if intent.option_index >= count {
            return Err(ValidationError::OptionOutOfRange {
                index: intent.option_index,
                count,
            }
            .into());
        }

        if self.store.get_vote(poll.id, &intent.voter)?.is_some() {
            return Err(ValidationError::AlreadyRecorded {
                poll: poll.id,
                voter: intent.voter.clone(),
            }
            .into());
        }

        if intent.relay_target != self.contract {
            return Err(ValidationError::WrongRelayTarget {
                expected: self.contract.clone(),
                provided: intent.relay_target.clone(),
            }
            .into());
        }

        let signature = Signature::from_hex(&intent.signature)
            .map_err(|e| ValidationError::MalformedSignature(e.to_string()))?;

        Ok(VerifiedIntent {
            poll,
            ledger_poll_id,
            option_index: intent.option_index,
            voter: intent.voter.clone(),
            voter_nonce: intent.voter_nonce,
            signature,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::RelayMetrics;
    use ballot_nullables::{NullClock, NullMirrorStore};
    use ballot_store::{PollStore, VoteStore};
    use ballot_types::{PollId, PollOption, Timestamp, TxRef, Vote};

    fn addr(c: char) -> AccountAddress {
        AccountAddress::new(format!("blt_{}", c.to_string().repeat(60)))
    }

    struct Fixture {
        store: Arc<NullMirrorStore>,
        clock: Arc<NullClock>,
        verifier: IntentVerifier<NullMirrorStore>,
        poll: Poll,
    }

    fn fixture(status: PollStatus) -> Fixture {
        let store = Arc::new(NullMirrorStore::new());
        let clock = Arc::new(NullClock::new(100));
        let lifecycle = PollLifecycle::new(
            Arc::clone(&store),
            clock.clone(),
            Arc::new(EventBus::new()),
            Arc::new(RelayMetrics::new().unwrap()),
        );
        let poll = store.seed_poll(Poll {
            id: PollId::new(0),
            question: "q".into(),
            options: vec![PollOption::new("a"), PollOption::new("b"), PollOption::new("c")],
            creator: addr('c'),
            created_at: Timestamp::new(0),
            end_time: Timestamp::new(1_000),
            status,
            ledger_poll_id: (status != PollStatus::Created).then(|| LedgerPollId::new(4)),
            total_votes: 0,
        });
        Fixture {
            verifier: IntentVerifier::new(Arc::clone(&store), lifecycle, addr('k')),
            store,
            clock,
            poll,
        }
    }

    fn intent(poll: PollId, option: u32) -> VoteIntent {
        VoteIntent {
            poll_id: poll,
            option_index: option,
            voter: addr('v'),
            voter_nonce: VoterNonce::new(0),
            relay_target: addr('k'),
            signature: "ab".repeat(64),
        }
    }

    fn rejection(f: &Fixture, intent: &VoteIntent) -> ValidationError {
        match f.verifier.verify(intent) {
            Err(RelayError::Validation(v)) => v,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn well_formed_intent_passes() {
        let f = fixture(PollStatus::Active);
        let verified = f.verifier.verify(&intent(f.poll.id, 2)).unwrap();
        assert_eq!(verified.ledger_poll_id, LedgerPollId::new(4));
        assert_eq!(verified.signature, Signature([0xab; 64]));
    }

    #[test]
    fn unknown_poll_rejected() {
        let f = fixture(PollStatus::Active);
        assert!(matches!(
            rejection(&f, &intent(PollId::new(42), 0)),
            ValidationError::PollNotFound(_)
        ));
    }

    #[test]
    fn created_poll_not_votable() {
        let f = fixture(PollStatus::Created);
        assert!(matches!(
            rejection(&f, &intent(f.poll.id, 0)),
            ValidationError::PollNotActive(_)
        ));
    }

    #[test]
    fn expired_poll_is_deactivated_and_rejected() {
        let f = fixture(PollStatus::Active);
        f.clock.set(1_001);
        assert!(matches!(
            rejection(&f, &intent(f.poll.id, 0)),
            ValidationError::PollEnded(_)
        ));
        assert_eq!(
            f.store.get_poll(f.poll.id).unwrap().unwrap().status,
            PollStatus::Ended
        );
    }

    #[test]
    fn option_out_of_range_rejected() {
        let f = fixture(PollStatus::Active);
        assert_eq!(
            rejection(&f, &intent(f.poll.id, 3)),
            ValidationError::OptionOutOfRange { index: 3, count: 3 }
        );
    }

    #[test]
    fn existing_vote_rejected() {
        let f = fixture(PollStatus::Active);
        f.store
            .record_confirmed_vote(&Vote {
                poll_id: f.poll.id,
                voter: addr('v'),
                option_index: 0,
                tx_ref: TxRef::new([1; 32]),
                recorded_at: Timestamp::new(50),
            })
            .unwrap();
        assert!(matches!(
            rejection(&f, &intent(f.poll.id, 1)),
            ValidationError::AlreadyRecorded { .. }
        ));
    }

    #[test]
    fn wrong_target_rejected() {
        let f = fixture(PollStatus::Active);
        let mut i = intent(f.poll.id, 0);
        i.relay_target = addr('x');
        assert!(matches!(
            rejection(&f, &i),
            ValidationError::WrongRelayTarget { .. }
        ));
    }

    #[test]
    fn empty_or_short_signature_rejected() {
        let f = fixture(PollStatus::Active);
        let mut i = intent(f.poll.id, 0);
        i.signature = String::new();
        assert!(matches!(rejection(&f, &i), ValidationError::MalformedSignature(_)));
        i.signature = "ab".repeat(10);
        assert!(matches!(rejection(&f, &i), ValidationError::MalformedSignature(_)));
    }

    #[test]
    fn rejection_writes_nothing() {
        let f = fixture(PollStatus::Active);
        let _ = f.verifier.verify(&intent(f.poll.id, 9));
        assert_eq!(f.store.vote_count().unwrap(), 0);
        assert_eq!(f.store.end_transitions(), 0);
    }
}
