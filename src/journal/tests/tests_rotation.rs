use super::helpers::*;
use crate::error::JournalError;
use crate::record::RECORD_OVERHEAD;

// Rollover does not relocate the previous generation's bytes: the next
// generation is written starting from the same `FIXED_HEADER_SIZE`
// offset the previous one used, so a post-rollover write always
// overwrites the *front* of the previous generation's data as it goes.
// Only the tail the post-rollover writes haven't reached yet survives —
// exactly the "not yet eclipsed by new data" previous pass described for
// `read_all`. These tests write enough pre-rollover records that at
// least one full record lies beyond the post-rollover writes' reach.

#[test]
fn rollover_preserves_the_uneclipsed_previous_tail_and_all_current_records() {
    init_tracing();
    let (_dir, journal) = open_fresh(64 * 1024);

    write_one(&journal, b"AAAA");
    write_one(&journal, b"BBBB");
    let gen_before = journal.current_generation().unwrap();
    journal.rollover().unwrap();
    let gen_after = journal.current_generation().unwrap();
    assert_ne!(gen_before, gen_after);
    write_one(&journal, b"C");

    // "AAAA" sat at the very front of the record area and is overwritten
    // by "C"; "BBBB" sat further in and is untouched.
    assert_eq!(
        collect_payloads(&journal),
        vec![b"BBBB".to_vec(), b"C".to_vec()]
    );
}

#[test]
fn rollover_after_n_and_m_writes_yields_the_surviving_tail_plus_m_records_in_order() {
    init_tracing();
    let (_dir, journal) = open_fresh(256 * 1024);

    let pre: Vec<Vec<u8>> = (0..5).map(|i| format!("pre-{i}").into_bytes()).collect();
    for payload in &pre {
        write_one(&journal, payload);
    }

    journal.rollover().unwrap();

    let post: Vec<Vec<u8>> = (0..3).map(|i| format!("post-{i}").into_bytes()).collect();
    for payload in &post {
        write_one(&journal, payload);
    }

    // Every pre-rollover record has an identical encoded length. The 3
    // post-rollover writes fully overwrite pre-0..pre-2 and clip the
    // front of pre-3 (destroying its header), leaving only pre-4 wholly
    // intact beyond where the post-rollover writes reached.
    let all = collect_payloads(&journal);
    let expected: Vec<Vec<u8>> = pre[4..].iter().cloned().chain(post).collect();
    assert_eq!(all, expected);
}

#[test]
fn capacity_refusal_then_rollover_then_success() {
    init_tracing();
    let payload = vec![b'x'; 16];
    let one_record = RECORD_OVERHEAD + payload.len();
    let size = crate::journal::FIXED_HEADER_SIZE + one_record as u64;

    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("txn.journal");
    let journal = crate::journal::JournalFile::open(&path, size).unwrap();

    write_one(&journal, &payload);

    let mut second = journal.create_empty_record(payload.len()).unwrap();
    second.payload_mut().copy_from_slice(&payload);
    match journal.write(&mut [second]) {
        Err(JournalError::NeedsRollover { remaining, required }) => {
            assert_eq!(remaining, 0);
            assert_eq!(required, one_record as u64);
        }
        other => panic!("expected NeedsRollover, got {other:?}"),
    }

    journal.rollover().unwrap();

    let mut third = journal.create_empty_record(payload.len()).unwrap();
    third.payload_mut().copy_from_slice(&payload);
    journal.write(&mut [third]).unwrap();

    // The journal holds exactly one record's worth of space, so the
    // retry occupies the same bytes the first write did; the first
    // record is eclipsed rather than preserved.
    assert_eq!(collect_payloads(&journal), vec![payload]);
}

#[test]
fn needs_rollover_writes_nothing() {
    init_tracing();
    let payload = vec![b'y'; 8];
    let one_record = RECORD_OVERHEAD + payload.len();
    let size = crate::journal::FIXED_HEADER_SIZE + one_record as u64;
    let dir = tempfile::TempDir::new().unwrap();
    let journal = crate::journal::JournalFile::open(dir.path().join("txn.journal"), size).unwrap();

    write_one(&journal, &payload);
    let before = collect_payloads(&journal);

    let mut rejected = journal.create_empty_record(payload.len()).unwrap();
    rejected.payload_mut().copy_from_slice(&payload);
    let err = journal.write(&mut [rejected]);
    assert!(matches!(err, Err(JournalError::NeedsRollover { .. })));

    assert_eq!(collect_payloads(&journal), before);
}

#[test]
fn grow_never_shrinks() {
    init_tracing();
    let (_dir, journal) = open_fresh(64 * 1024);
    let original = journal.journal_size().unwrap();

    journal.grow(4 * 1024).unwrap();
    assert_eq!(journal.journal_size().unwrap(), original);

    journal.grow(original * 2).unwrap();
    assert_eq!(journal.journal_size().unwrap(), original * 2);
}

#[test]
fn opening_larger_than_requested_keeps_the_larger_size() {
    init_tracing();
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("txn.journal");

    {
        let journal = crate::journal::JournalFile::open(&path, 256 * 1024).unwrap();
        journal.close().unwrap();
    }

    let journal = crate::journal::JournalFile::open(&path, 16 * 1024).unwrap();
    assert_eq!(journal.journal_size().unwrap(), 256 * 1024);
}

#[test]
fn opening_smaller_than_existing_grows_it() {
    init_tracing();
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("txn.journal");

    {
        let journal = crate::journal::JournalFile::open(&path, 16 * 1024).unwrap();
        journal.close().unwrap();
    }

    let journal = crate::journal::JournalFile::open(&path, 256 * 1024).unwrap();
    assert_eq!(journal.journal_size().unwrap(), 256 * 1024);
}
