use proptest::prelude::*;

use ballot_types::{PollId, RelayNonce, Signature, Timestamp, TxRef, VoterNonce};

proptest! {
    /// TxRef::is_zero is true only for all-zero bytes.
    #[test]
    fn tx_ref_is_zero_correct(bytes in prop::array::uniform32(0u8..)) {
        let r = TxRef::new(bytes);
        prop_assert_eq!(r.is_zero(), bytes == [0u8; 32]);
    }

    /// Display output parses back to the same reference.
    #[test]
    fn tx_ref_display_parses(bytes in prop::array::uniform32(0u8..)) {
        let r = TxRef::new(bytes);
        prop_assert_eq!(TxRef::from_hex(&r.to_string()).unwrap(), r);
    }

    /// Poll keys sort the same way as the ids they encode.
    #[test]
    fn poll_key_order_matches_id_order(a in any::<u64>(), b in any::<u64>()) {
        let (ka, kb) = (PollId::new(a).to_key(), PollId::new(b).to_key());
        prop_assert_eq!(ka.cmp(&kb), a.cmp(&b));
    }

    /// Nonce successors are strictly increasing.
    #[test]
    fn nonce_next_is_strictly_greater(n in 0u64..u64::MAX) {
        prop_assert!(VoterNonce::new(n).next() > VoterNonce::new(n));
        prop_assert!(RelayNonce::new(n).next() > RelayNonce::new(n));
    }

    /// Timestamp::is_after is a strict ordering.
    #[test]
    fn timestamp_is_after_strict(a in any::<u64>(), b in any::<u64>()) {
        let (ta, tb) = (Timestamp::new(a), Timestamp::new(b));
        prop_assert_eq!(ta.is_after(tb), a > b);
        prop_assert!(!ta.is_after(ta));
    }

    /// Timestamp::plus_secs saturates instead of overflowing.
    #[test]
    fn timestamp_plus_saturates(a in any::<u64>(), d in any::<u64>()) {
        prop_assert_eq!(Timestamp::new(a).plus_secs(d).as_secs(), a.saturating_add(d));
    }

    /// Signatures survive bincode encoding.
    #[test]
    fn signature_bincode_roundtrip(bytes in prop::collection::vec(any::<u8>(), 64)) {
        let mut arr = [0u8; 64];
        arr.copy_from_slice(&bytes);
        let sig = Signature(arr);
        let encoded = bincode::serialize(&sig).unwrap();
        let decoded: Signature = bincode::deserialize(&encoded).unwrap();
        prop_assert_eq!(decoded, sig);
    }
}
