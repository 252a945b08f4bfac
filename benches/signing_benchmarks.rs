//! CPU benchmarks for the hot cryptographic paths.
//!
//! Request latency is dominated by Argon2 verification and payload
//! signing; these track both so regressions show up before deploys.

use std::hint::black_box;

use chrono::Utc;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use spb_api::{crypto, token};
use spb_core::sanitize;
use spb_delivery::sign_payload;

fn bench_payload_signing(c: &mut Criterion) {
    let mut group = c.benchmark_group("payload_signing");

    for size in [256usize, 4 * 1024, 64 * 1024] {
        let body = vec![b'x'; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &body, |b, body| {
            b.iter(|| sign_payload(black_box("webhook-secret"), black_box(body)).unwrap());
        });
    }

    group.finish();
}

fn bench_credential_hashing(c: &mut Criterion) {
    let mut group = c.benchmark_group("credential_hashing");
    // Argon2 is slow on purpose; keep the sample count down.
    group.sample_size(10);

    let key = crypto::generate_key();
    group.bench_function("hash", |b| {
        b.iter(|| crypto::hash_credential(black_box(&key)).unwrap());
    });

    let hash = crypto::hash_credential(&key).unwrap();
    group.bench_function("verify", |b| {
        b.iter(|| assert!(crypto::verify_credential(black_box(&key), black_box(&hash))));
    });

    group.finish();
}

fn bench_fingerprint(c: &mut Criterion) {
    let key = crypto::generate_key();

    c.bench_function("fingerprint", |b| b.iter(|| crypto::fingerprint(black_box(&key))));
}

fn bench_token_verification(c: &mut Criterion) {
    let now = Utc::now();
    let token = token::mint("fingerprint", "signing-secret", now, None).unwrap();

    c.bench_function("token_verify", |b| {
        b.iter(|| token::verify(black_box(&token), "signing-secret", now).unwrap());
    });
}

fn bench_title_sanitizing(c: &mut Criterion) {
    let title = "<h1>Launch <em>Day</em></h1> Notes for the <b>Big</b> Rollout";

    c.bench_function("strip_and_slug", |b| {
        b.iter(|| {
            let clean = sanitize::strip_markup(black_box(title));
            sanitize::slugify(black_box(&clean))
        });
    });
}

criterion_group!(
    benches,
    bench_payload_signing,
    bench_credential_hashing,
    bench_fingerprint,
    bench_token_verification,
    bench_title_sanitizing
);
criterion_main!(benches);
