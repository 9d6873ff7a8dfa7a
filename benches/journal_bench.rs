//! Benchmarks for blockjournal operations

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use tempfile::TempDir;

use blockjournal::{Journal, JournalParameters};

fn bench_params() -> JournalParameters {
    JournalParameters::builder()
        .block_size(256)
        .blocks_per_page(64)
        .pages_per_set(8)
        .build()
}

fn journal_benchmarks(c: &mut Criterion) {
    let temp_dir = TempDir::new().unwrap();
    let mut journal = Journal::open(temp_dir.path().join("bench.jrnl"), bench_params()).unwrap();

    let small = vec![0xA5u8; 200];
    let large = vec![0x5Au8; 64 * 1024];

    // Steady-state write/remove/commit cycle: block counts stay constant
    // so the file does not grow across iterations.
    c.bench_function("write_remove_commit_200b", |b| {
        b.iter(|| {
            let handle = journal.write(&small[..]).unwrap();
            journal.remove(handle).unwrap();
            journal.commit().unwrap();
        })
    });

    c.bench_function("write_remove_commit_64k", |b| {
        b.iter(|| {
            let handle = journal.write(&large[..]).unwrap();
            journal.remove(handle).unwrap();
            journal.commit().unwrap();
        })
    });

    let small_handle = journal.write(&small[..]).unwrap();
    c.bench_function("read_200b", |b| {
        b.iter(|| {
            black_box(journal.read(small_handle).unwrap());
        })
    });

    let large_handle = journal.write(&large[..]).unwrap();
    c.bench_function("read_64k", |b| {
        b.iter(|| {
            black_box(journal.read(large_handle).unwrap());
        })
    });

    for i in 0..1000u32 {
        let handle = journal.write(&small[..]).unwrap();
        if i % 2 == 0 {
            journal.confirm(handle).unwrap();
        }
    }
    c.bench_function("iterate_confirmed_500", |b| {
        b.iter(|| {
            black_box(journal.iter_confirmed().count());
        })
    });
}

criterion_group!(benches, journal_benchmarks);
criterion_main!(benches);
