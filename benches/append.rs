//! Micro-benchmarks for the rolling journal's append and scan paths.
//!
//! # Running
//!
//! ```bash
//! cargo bench --bench append
//! ```
//!
//! Reports are generated in `target/criterion/report/index.html`.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rolling_journal::JournalFile;
use tempfile::TempDir;

const VALUE_128B: &[u8; 128] = &[0xAB; 128];
const VALUE_1K: &[u8; 1024] = &[0xCD; 1024];

/// Opens a fresh journal large enough to absorb a whole benchmark
/// iteration count without ever needing a rollover.
fn open_large(dir: &std::path::Path) -> JournalFile {
    JournalFile::open(dir.path().join("bench.journal"), 256 * 1024 * 1024).unwrap()
}

/// Pre-populates a journal with `count` sequential records of `value` and
/// returns it, still open, positioned after the last one.
fn prepopulate(dir: &std::path::Path, count: u64, value: &[u8]) -> JournalFile {
    let journal = open_large(dir);
    for _ in 0..count {
        let mut record = journal.create_empty_record(value.len()).unwrap();
        record.payload_mut().copy_from_slice(value);
        journal.write(&mut [record]).unwrap();
    }
    journal
}

// ================================================================================================
// Append benchmarks
// ================================================================================================

/// Benchmark group for `write` of a single record.
///
/// **Scenario:** Appends one record at a time into a journal pre-sized so
/// no rollover is ever triggered during measurement.
///
/// **What it measures:** The cost of encode + single contiguous write
/// syscall per record, without fsync (callers batch `force()` separately).
fn bench_append_single(c: &mut Criterion) {
    let mut group = c.benchmark_group("append_single");

    for &(label, value) in &[("128B", VALUE_128B.as_slice()), ("1K", VALUE_1K.as_slice())] {
        group.throughput(Throughput::Bytes(value.len() as u64));
        group.bench_function(BenchmarkId::new("payload", label), |b| {
            let dir = TempDir::new().unwrap();
            let journal = open_large(dir.path());

            b.iter(|| {
                let mut record = journal.create_empty_record(value.len()).unwrap();
                record.payload_mut().copy_from_slice(black_box(value));
                journal.write(black_box(&mut [record])).unwrap();
            });

            journal.close().unwrap();
        });
    }

    group.finish();
}

/// Benchmark for writing a batch of records in one call.
///
/// **Scenario:** Submits a batch of 64 records of 128 B each per
/// iteration.
///
/// **What it measures:** Whether batching amortizes the per-write syscall
/// cost relative to `append_single`, since a batch is serialized into one
/// contiguous buffer and issued as a single `write`.
fn bench_append_batch(c: &mut Criterion) {
    const BATCH: usize = 64;
    let mut group = c.benchmark_group("append_batch");
    group.throughput(Throughput::Elements(BATCH as u64));

    group.bench_function("128B_x64", |b| {
        let dir = TempDir::new().unwrap();
        let journal = open_large(dir.path());

        b.iter(|| {
            let mut batch: Vec<_> = (0..BATCH)
                .map(|_| {
                    let mut record = journal
                        .create_empty_record(VALUE_128B.len())
                        .unwrap();
                    record.payload_mut().copy_from_slice(VALUE_128B.as_slice());
                    record
                })
                .collect();
            journal.write(black_box(&mut batch)).unwrap();
        });

        journal.close().unwrap();
    });

    group.finish();
}

/// Benchmark for `force()` durability barrier cost.
///
/// **Scenario:** One record written, then `force()` called, repeated.
///
/// **What it measures:** The fsync latency dominating a durable write
/// path; `force()`'s own no-op fast path is not exercised here since
/// every iteration writes first.
fn bench_force(c: &mut Criterion) {
    c.bench_function("force_after_write", |b| {
        let dir = TempDir::new().unwrap();
        let journal = open_large(dir.path());

        b.iter(|| {
            let mut record = journal.create_empty_record(VALUE_128B.len()).unwrap();
            record.payload_mut().copy_from_slice(VALUE_128B.as_slice());
            journal.write(&mut [record]).unwrap();
            journal.force().unwrap();
        });

        journal.close().unwrap();
    });
}

// ================================================================================================
// Scan benchmarks
// ================================================================================================

/// Benchmark for `read_all` over a fully populated journal.
///
/// **Scenario:** Scans every record of a journal pre-populated with 10,000
/// 128 B records, once per iteration.
///
/// **What it measures:** Sustained scan throughput of the corruption-
/// tolerant scanner over clean data — the cost floor recovery pays even
/// when nothing is actually damaged.
fn bench_scan_all(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan_all");
    let n = 10_000u64;
    group.throughput(Throughput::Elements(n));

    group.bench_function("10k_records_128B", |b| {
        let dir = TempDir::new().unwrap();
        let journal = prepopulate(dir.path(), n, VALUE_128B.as_slice());

        b.iter(|| {
            let count = journal.read_all(false).unwrap().count();
            black_box(count);
        });

        journal.close().unwrap();
    });

    group.finish();
}

/// Benchmark for reopening a journal and discovering the append point.
///
/// **Scenario:** Closes a journal pre-populated with 10,000 records, then
/// reopens it.
///
/// **What it measures:** Recovery-time cost: the scan
/// `find_position_after_last_record` performs on every `open` of a
/// non-empty journal.
fn bench_reopen(c: &mut Criterion) {
    c.bench_function("reopen_after_10k_records", |b| {
        let dir = TempDir::new().unwrap();
        {
            let journal = prepopulate(dir.path(), 10_000, VALUE_128B.as_slice());
            journal.force().unwrap();
            journal.close().unwrap();
        }

        b.iter(|| {
            let journal = JournalFile::open(dir.path().join("bench.journal"), 256 * 1024 * 1024)
                .unwrap();
            journal.close().unwrap();
        });
    });
}

criterion_group!(
    benches,
    bench_append_single,
    bench_append_batch,
    bench_force,
    bench_scan_all,
    bench_reopen,
);

criterion_main!(benches);
