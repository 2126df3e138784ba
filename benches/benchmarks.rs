//! Benchmarks for pubsync operations.

use std::time::Instant;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use pubsync::hash::murmur3_32;
use pubsync::wire::{parse_payload, PayloadBuilder};
use pubsync::{
    Blake3Signer, Command, Iblt, InEvent, Name, Publication, Signer, SyncBuilder, SyncPubsub,
};

fn bench_murmur3(c: &mut Criterion) {
    let mut group = c.benchmark_group("murmur3");

    for size in [4usize, 64, 1024, 8192] {
        let data = vec![42u8; size];

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("hash", size), &data, |b, data| {
            b.iter(|| murmur3_32(11, black_box(data)));
        });
    }

    group.finish();
}

fn bench_iblt_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("iblt");

    group.bench_function("insert_64", |b| {
        b.iter(|| {
            let mut iblt = Iblt::new(85);
            for key in 0..64u32 {
                iblt.insert(black_box(key).wrapping_mul(0x9e37_79b9));
            }
            iblt
        });
    });

    group.finish();
}

fn bench_iblt_peel(c: &mut Criterion) {
    let mut group = c.benchmark_group("iblt_peel");

    for entries in [8usize, 32, 64] {
        let mut ours = Iblt::new(85);
        for key in 0..entries {
            ours.insert((key as u32).wrapping_mul(0x9e37_79b9));
        }
        let theirs = Iblt::new(85);

        group.bench_with_input(
            BenchmarkId::new("difference_list", entries),
            &ours,
            |b, ours| {
                b.iter(|| ours.difference(black_box(&theirs)).list());
            },
        );
    }

    group.finish();
}

fn bench_iblt_wire(c: &mut Criterion) {
    let mut group = c.benchmark_group("iblt_wire");

    let mut iblt = Iblt::new(85);
    for key in 0..32u32 {
        iblt.insert(key.wrapping_mul(0x9e37_79b9));
    }
    let component = iblt.encode().unwrap();

    group.bench_function("encode", |b| {
        b.iter(|| black_box(&iblt).encode().unwrap());
    });
    group.bench_function("decode", |b| {
        b.iter(|| Iblt::decode(85, black_box(&component)).unwrap());
    });

    group.finish();
}

fn bench_payload(c: &mut Criterion) {
    let mut group = c.benchmark_group("payload");

    let publications: Vec<Publication> = (0..10u64)
        .map(|i| {
            let mut publication = Publication::new(
                Name::from("/bench/topic").appended_timestamp(1_700_000_000_000 + i),
                vec![0u8; 64],
            );
            Blake3Signer.sign(&mut publication);
            publication
        })
        .collect();

    group.bench_function("pack_10", |b| {
        b.iter(|| {
            let mut builder = PayloadBuilder::new(4096);
            for publication in &publications {
                builder.push(black_box(publication)).unwrap();
            }
            builder.finish()
        });
    });

    let mut builder = PayloadBuilder::new(4096);
    for publication in &publications {
        builder.push(publication).unwrap();
    }
    let payload = builder.finish();

    group.bench_function("parse_10", |b| {
        b.iter(|| parse_payload(black_box(&payload)).unwrap());
    });

    group.finish();
}

fn bench_engine_answer(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine");

    let config = SyncBuilder::new(Name::from("/bench/sync"))
        .expected_entries(85)
        .build();
    let mut engine = SyncPubsub::new(config);
    let now = Instant::now();
    engine.handle(InEvent::RegisterConfirmed, now).for_each(drop);
    for i in 0..10u64 {
        let publication = Publication::new(
            Name::from("/bench/topic").appended_timestamp(1_700_000_000_000 + i),
            vec![0u8; 64],
        );
        engine
            .handle(InEvent::Command(Command::Publish(publication)), now)
            .for_each(drop);
    }
    let empty_summary = Iblt::new(85).encode().unwrap();
    let request = Name::from("/bench/sync").appended(pubsync::Component::new(empty_summary));

    group.bench_function("answer_request", |b| {
        b.iter(|| {
            engine
                .handle(
                    InEvent::RecvRequest {
                        name: black_box(request.clone()),
                        nonce: 7,
                    },
                    now,
                )
                .for_each(drop);
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_murmur3,
    bench_iblt_insert,
    bench_iblt_peel,
    bench_iblt_wire,
    bench_payload,
    bench_engine_answer,
);

criterion_main!(benches);
