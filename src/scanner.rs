//! Lazy, corruption-tolerant record scanning.
//!
//! A [`Scanner`] produces the sequence of records written under one
//! generation id within a bounded file region. It never raises an error for
//! data corruption — a torn trailer, a bad CRC, or marker bytes that
//! happened to occur inside payload data are all silently skipped (logged
//! at `trace`/`warn`). This asymmetry with [`crate::JournalFile`]'s other
//! operations is deliberate: a recovery scan must be able to run to
//! completion past any amount of damage, while a writer needs to know the
//! moment durability might be compromised.

use crate::buffer::{Buffer, BufferProvider};
use crate::journal::JournalInner;
use crate::record::{self, FindResult, GenerationId, Record, RECORD_OVERHEAD};
use std::sync::{Arc, Mutex};
use tracing::{trace, warn};

/// Minimum working-buffer size the scanner asks the provider for, before
/// accounting for the configured maximum record size.
const MIN_SCAN_CHUNK: usize = 64 * 1024;

/// A lazy iterator over the records of one generation within
/// `[start, end)` of a journal file.
///
/// The scanner snapshots `end` at construction time (see
/// [`crate::JournalFile::read_all`]) so it cannot run past data a
/// concurrent append is still writing; per-refill reads still take the
/// journal's shared lock briefly, interleaving safely with writer
/// activity.
pub struct Scanner<P: BufferProvider> {
    inner: Arc<Mutex<JournalInner>>,
    provider: Arc<P>,
    generation: GenerationId,
    max_record_size: u32,
    include_invalid: bool,

    /// Absolute file offset of the next byte not yet read into `buf`.
    read_pos: u64,
    /// Absolute file offset marking the end of the scan region.
    end: u64,

    buf: Buffer,
    /// Number of valid bytes at the front of `buf`.
    filled: usize,
    /// Read cursor within the valid prefix of `buf`.
    cursor: usize,
    eof: bool,
}

impl<P: BufferProvider> Scanner<P> {
    pub(crate) fn new(
        inner: Arc<Mutex<JournalInner>>,
        provider: Arc<P>,
        generation: GenerationId,
        max_record_size: u32,
        include_invalid: bool,
        start: u64,
        end: u64,
    ) -> Self {
        let chunk = MIN_SCAN_CHUNK.max(RECORD_OVERHEAD + max_record_size as usize);
        let buf = provider.poll(chunk);
        Self {
            inner,
            provider,
            generation,
            max_record_size,
            include_invalid,
            read_pos: start,
            end,
            buf,
            filled: 0,
            cursor: 0,
            eof: start >= end,
        }
    }

    /// Moves unread bytes to the front of the working buffer, then reads
    /// more data from the file up to `end`.
    /// Absolute file offset corresponding to the current read cursor.
    fn current_offset(&self) -> u64 {
        self.read_pos - self.filled as u64 + self.cursor as u64
    }

    fn refill(&mut self) -> bool {
        if self.cursor > 0 {
            self.buf.as_mut_slice().copy_within(self.cursor..self.filled, 0);
            self.filled -= self.cursor;
            self.cursor = 0;
        }

        if self.eof || self.read_pos >= self.end {
            self.eof = true;
            return false;
        }

        let capacity = self.buf.len();
        if self.filled >= capacity {
            // Working buffer full of an unresolved candidate larger than
            // our chunk size; nothing more to do without growing, which
            // would only happen for a record bigger than
            // `max_record_size`, already impossible by construction.
            self.eof = true;
            return false;
        }

        let want = ((self.end - self.read_pos) as usize).min(capacity - self.filled);
        let mut guard = self.inner.lock().expect("journal mutex poisoned");
        let read = match guard.read_at(self.read_pos, &mut self.buf.as_mut_slice()[self.filled..self.filled + want]) {
            Ok(n) => n,
            Err(_) => 0,
        };
        drop(guard);

        if read == 0 {
            self.eof = true;
            return false;
        }
        self.filled += read;
        self.read_pos += read as u64;
        true
    }
}

impl<P: BufferProvider> Iterator for Scanner<P> {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        loop {
            if self.cursor >= self.filled {
                if !self.refill() {
                    return None;
                }
                continue;
            }

            let window = &self.buf.as_slice()[self.cursor..self.filled];
            match record::scan_next(window, self.generation, self.max_record_size) {
                FindResult::Found { record, consumed } => {
                    self.cursor += consumed;
                    if record.valid() || self.include_invalid {
                        if !record.valid() {
                            warn!(generation = %self.generation, "yielding CRC-invalid record (include_invalid)");
                        }
                        return Some(record);
                    }
                    warn!(generation = %self.generation, "skipping CRC-invalid record");
                    continue;
                }
                FindResult::OtherGeneration { consumed } => {
                    trace!(generation = %self.generation, "skipped foreign-generation record");
                    self.cursor += consumed;
                    continue;
                }
                FindResult::NoHeaderHere { consumed } => {
                    self.cursor += consumed;
                    continue;
                }
                FindResult::PartialRecord { consumed } => {
                    self.cursor += consumed;
                    if !self.refill() {
                        return None;
                    }
                    continue;
                }
                FindResult::NoHeaderInBuffer { consumed } => {
                    self.cursor += consumed;
                    if !self.refill() {
                        return None;
                    }
                    continue;
                }
            }
        }
    }
}

impl<P: BufferProvider> Drop for Scanner<P> {
    fn drop(&mut self) {
        let buf = std::mem::replace(&mut self.buf, Buffer::zeroed(0));
        self.provider.recycle(buf);
    }
}

/// Scans the record area of `[start, end)` for the current generation and
/// returns the offset just past the last successfully parsed record.
///
/// Returns `start` (the beginning of the record area) if no record of the
/// current generation is found — the append point for an empty or
/// header-only journal.
pub(crate) fn find_position_after_last_record<P: BufferProvider>(
    inner: &Arc<Mutex<JournalInner>>,
    provider: &Arc<P>,
    generation: GenerationId,
    max_record_size: u32,
    start: u64,
    end: u64,
) -> u64 {
    let mut scanner = Scanner::new(
        Arc::clone(inner),
        Arc::clone(provider),
        generation,
        max_record_size,
        true,
        start,
        end,
    );

    let mut position = start;
    while scanner.next().is_some() {
        position = scanner.current_offset();
    }
    position
}
