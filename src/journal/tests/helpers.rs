use crate::buffer::Buffer;
use crate::journal::JournalFile;
use crate::record::Record;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

/// Initializes a `tracing` subscriber controlled by `RUST_LOG`. Safe to
/// call repeatedly — only the first call takes effect.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Opens a fresh journal in a scratch directory that lives as long as the
/// returned `TempDir` does; dropping the guard removes the file.
pub fn open_fresh(size: u64) -> (TempDir, JournalFile) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("txn.journal");
    let journal = JournalFile::open(&path, size).unwrap();
    (dir, journal)
}

/// Builds a record tagged with `gen` carrying `payload`, bypassing
/// `JournalFile::create_empty_record` for tests that need to stamp a
/// specific, possibly stale, generation id.
pub fn record_with_payload(gen: crate::record::GenerationId, payload: &[u8]) -> Record {
    Record::new(gen, Buffer::from_vec(payload.to_vec()))
}

/// Writes one record with `payload` through `journal` and returns it.
pub fn write_one(journal: &JournalFile, payload: &[u8]) {
    let mut record = journal.create_empty_record(payload.len()).unwrap();
    record.payload_mut().copy_from_slice(payload);
    journal.write(&mut [record]).unwrap();
}

/// Collects every record's payload from `read_all(false)`, in order.
pub fn collect_payloads(journal: &JournalFile) -> Vec<Vec<u8>> {
    journal
        .read_all(false)
        .unwrap()
        .map(|r| r.payload().to_vec())
        .collect()
}
