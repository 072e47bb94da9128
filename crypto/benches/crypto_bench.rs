use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn ed25519_sign_bench(c: &mut Criterion) {
    let kp = burst_crypto::generate_keypair();
    let msg = [42u8; 128];

    c.bench_function("ed25519_sign_128B", |b| {
        b.iter(|| burst_crypto::sign_message(black_box(&msg), &kp.private))
    });
}

fn ed25519_verify_bench(c: &mut Criterion) {
    let kp = burst_crypto::generate_keypair();
    let msg = [42u8; 128];
    let sig = burst_crypto::sign_message(&msg, &kp.private);

    c.bench_function("ed25519_verify_128B", |b| {
        b.iter(|| burst_crypto::verify_signature(black_box(&msg), &sig, &kp.public))
    });
}

fn random_32_bench(c: &mut Criterion) {
    c.bench_function("random_32", |b| b.iter(burst_crypto::random_32));
}

fn keypair_generation_bench(c: &mut Criterion) {
    c.bench_function("keypair_generate", |b| {
        b.iter(|| burst_crypto::generate_keypair())
    });
}

criterion_group!(
    benches,
    ed25519_sign_bench,
    ed25519_verify_bench,
    random_32_bench,
    keypair_generation_bench,
);
criterion_main!(benches);
