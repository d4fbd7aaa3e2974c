use criterion::{black_box, criterion_group, criterion_main, Criterion};

use ballot_crypto::{derive_address, intent_digest, keypair_from_seed, IntentPayload};
use ballot_types::{LedgerPollId, VoterNonce};

fn payload() -> (IntentPayload, ballot_types::KeyPair) {
    let kp = keypair_from_seed(&[1u8; 32]);
    let target = derive_address(&keypair_from_seed(&[2u8; 32]).public);
    let p = IntentPayload {
        ledger_poll_id: LedgerPollId::new(42),
        option_index: 1,
        voter: derive_address(&kp.public),
        voter_nonce: VoterNonce::new(5),
        relay_target: target,
    };
    (p, kp)
}

fn intent_digest_bench(c: &mut Criterion) {
    let (p, _) = payload();
    c.bench_function("intent_digest", |b| b.iter(|| intent_digest(black_box(&p))));
}

fn intent_sign_bench(c: &mut Criterion) {
    let (p, kp) = payload();
    c.bench_function("intent_sign", |b| {
        b.iter(|| ballot_crypto::sign_intent(black_box(&p), &kp.private))
    });
}

fn intent_verify_bench(c: &mut Criterion) {
    let (p, kp) = payload();
    let sig = ballot_crypto::sign_intent(&p, &kp.private);
    c.bench_function("intent_verify", |b| {
        b.iter(|| ballot_crypto::verify_intent(black_box(&p), &sig))
    });
}

fn address_derive_bench(c: &mut Criterion) {
    let kp = keypair_from_seed(&[3u8; 32]);
    c.bench_function("derive_address", |b| {
        b.iter(|| derive_address(black_box(&kp.public)))
    });
}

criterion_group!(
    benches,
    intent_digest_bench,
    intent_sign_bench,
    intent_verify_bench,
    address_derive_bench
);
criterion_main!(benches);
