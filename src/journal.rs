//! Journal file lifecycle: open, lock, grow, append, rollover, fsync, close.
//!
//! A `JournalFile` owns one pre-allocated, exclusively-locked file reused
//! cyclically. Every mutating operation (`write`, `rollover`, `grow`,
//! `force`, `close`) takes the same mutex for its duration — the simplest
//! realization of "single writer, fully serialized" — and readers take the
//! same mutex briefly per refill, so a `read_all` iterator never races a
//! concurrent append on the underlying file cursor.

use crate::buffer::{Buffer, BufferProvider, HeapBufferProvider};
use crate::error::JournalError;
use crate::record::{self, GenerationId, Record, DEFAULT_MAX_RECORD_SIZE, GEN_ID_SIZE};
use crate::scanner::{self, Scanner};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info, warn};

#[cfg(test)]
mod tests;

/// Size in bytes of the file header region. The record area begins here.
pub const FIXED_HEADER_SIZE: u64 = 1024;

/// Human-readable banner identifying a journal file. A byte-for-byte
/// compatible reader must expect this prefix.
pub const MAGIC: &[u8] = b"BTM-NTJ-[Version 1.0]";

/// Fixed slot reserved for the magic banner within the header, padded with
/// zero bytes.
const MAGIC_SLOT: usize = 64;
const PREV_GEN_OFFSET: usize = MAGIC_SLOT;
const CURR_GEN_OFFSET: usize = MAGIC_SLOT + GEN_ID_SIZE;

/// Neutral fill byte written over the tail of the record area on rollover
/// so stale framing can never confuse a scanner.
const ROLLOVER_FILL_BYTE: u8 = b' ';

/// Shared, lock-guarded journal state: the file handle and every piece of
/// bookkeeping that must stay consistent with it.
pub(crate) struct JournalInner {
    file: File,
    journal_size: u64,
    previous_generation: GenerationId,
    current_generation: GenerationId,
    append_pos: u64,
    last_modified: Instant,
    last_forced: Instant,
}

impl JournalInner {
    /// Reads up to `buf.len()` bytes starting at absolute file `offset`.
    pub(crate) fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read(buf)
    }
}

/// A crash-safe, append-only, single-writer rolling journal over one
/// pre-allocated file.
///
/// See the crate-level documentation for the on-disk format and recovery
/// model. `P` is the [`BufferProvider`] used for record payload storage;
/// it defaults to [`HeapBufferProvider`], a trivial allocate-and-drop
/// implementation that needs no configuration.
pub struct JournalFile<P: BufferProvider = HeapBufferProvider> {
    inner: Arc<Mutex<JournalInner>>,
    provider: Arc<P>,
    path: PathBuf,
    max_record_size: u32,
}

impl JournalFile<HeapBufferProvider> {
    /// Opens or creates a journal file at `path` with the default buffer
    /// provider and the default maximum record size.
    pub fn open<Path_: AsRef<Path>>(path: Path_, initial_size: u64) -> Result<Self, JournalError> {
        Self::open_with(path, initial_size, DEFAULT_MAX_RECORD_SIZE, Arc::new(HeapBufferProvider))
    }
}

impl<P: BufferProvider> JournalFile<P> {
    /// Opens or creates a journal file at `path`, using a caller-supplied
    /// buffer provider and maximum record size.
    ///
    /// Behavior:
    /// - Acquires an exclusive OS-level file lock; fails with
    ///   [`JournalError::Busy`] if another handle already holds it.
    /// - If the file is empty, both generation ids are freshly randomized,
    ///   the header is written, and the append point is set to
    ///   [`FIXED_HEADER_SIZE`].
    /// - Otherwise, the header is parsed and validated
    ///   ([`JournalError::BadMagic`] on mismatch), and the record area is
    ///   scanned to find the position just past the last record of the
    ///   current generation.
    /// - The file is grown, never shrunk, to `max(initial_size,
    ///   current_length)`.
    pub fn open_with<Path_: AsRef<Path>>(
        path: Path_,
        initial_size: u64,
        max_record_size: u32,
        provider: Arc<P>,
    ) -> Result<Self, JournalError> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)?;

        if let Err(e) = file.try_lock_exclusive() {
            if e.kind() == io::ErrorKind::WouldBlock {
                return Err(JournalError::Busy);
            }
            return Err(JournalError::Io(e));
        }

        match Self::open_locked(file, &path, initial_size, max_record_size, &provider) {
            Ok(inner) => {
                info!(path = %path.display(), journal_size = inner.journal_size, "journal opened");
                Ok(Self {
                    inner: Arc::new(Mutex::new(inner)),
                    provider,
                    path,
                    max_record_size,
                })
            }
            Err((file, e)) => {
                // Roll back: release the lock and drop the handle before
                // surfacing the error, per the open contract.
                let _ = FileExt::unlock(&file);
                Err(e)
            }
        }
    }

    /// Returns the original `file` alongside the error on failure, so the
    /// caller can release the lock before dropping it.
    fn open_locked(
        mut file: File,
        path: &Path,
        initial_size: u64,
        max_record_size: u32,
        provider: &Arc<P>,
    ) -> Result<JournalInner, (File, JournalError)> {
        let current_length = match file.metadata() {
            Ok(m) => m.len(),
            Err(e) => return Err((file, JournalError::Io(e))),
        };

        let (previous_generation, current_generation) = if current_length == 0 {
            let previous = GenerationId::random();
            let current = GenerationId::random();
            if let Err(e) = write_header(&mut file, previous, current) {
                return Err((file, JournalError::Io(e)));
            }
            if let Err(e) = file.sync_all() {
                return Err((file, JournalError::Io(e)));
            }
            debug!(path = %path.display(), "wrote fresh journal header");
            (previous, current)
        } else {
            match read_header(&mut file) {
                Ok((true, previous, current)) => (previous, current),
                Ok((false, _, _)) => return Err((file, JournalError::BadMagic)),
                Err(e) => return Err((file, JournalError::Io(e))),
            }
        };

        let journal_size = current_length.max(initial_size).max(FIXED_HEADER_SIZE);
        if journal_size > current_length {
            if let Err(e) = file.set_len(journal_size) {
                return Err((file, JournalError::Io(e)));
            }
        }

        let now = Instant::now();
        let inner = Arc::new(Mutex::new(JournalInner {
            file,
            journal_size,
            previous_generation,
            current_generation,
            append_pos: FIXED_HEADER_SIZE,
            last_modified: now,
            last_forced: now,
        }));

        let append_pos = scanner::find_position_after_last_record(
            &inner,
            provider,
            current_generation,
            max_record_size,
            FIXED_HEADER_SIZE,
            journal_size,
        )
        .max(FIXED_HEADER_SIZE);

        let mut inner = Arc::try_unwrap(inner)
            .unwrap_or_else(|_| unreachable!("scanner does not outlive this scope"))
            .into_inner()
            .unwrap_or_else(|e| e.into_inner());
        inner.append_pos = append_pos;
        Ok(inner)
    }

    /// Creates a fresh, empty record tagged with the journal's current
    /// generation, with a payload buffer of `payload_len` bytes for the
    /// caller to fill.
    pub fn create_empty_record(&self, payload_len: usize) -> Result<Record, JournalError> {
        if payload_len > self.max_record_size as usize {
            return Err(JournalError::RecordTooLarge(payload_len));
        }
        let generation = {
            let guard = self.inner.lock().map_err(poison)?;
            guard.current_generation
        };
        let buffer = self.provider.poll(payload_len);
        let mut buffer = buffer;
        // `poll` may over-allocate; records are always encoded at their
        // logical payload length.
        if buffer.len() != payload_len {
            buffer = Buffer::from_vec(buffer.into_vec()[..payload_len].to_vec());
        }
        Ok(Record::new(generation, buffer))
    }

    /// Writes a batch of records in one contiguous I/O call.
    ///
    /// Records appear on disk in the order given. If the batch's total
    /// encoded size exceeds [`JournalFile::remaining_capacity`], nothing
    /// is written and [`JournalError::NeedsRollover`] is returned — the
    /// caller must explicitly call [`JournalFile::rollover`] and retry.
    /// If any record's payload exceeds the journal's configured maximum
    /// record size, nothing is written and [`JournalError::RecordTooLarge`]
    /// is returned; this is checked here too, not just in
    /// [`JournalFile::create_empty_record`], since `Record::new` is public
    /// and a caller can otherwise build an oversized record directly.
    pub fn write(&self, records: &mut [Record]) -> Result<u64, JournalError> {
        if records.is_empty() {
            return Ok(0);
        }

        let required = record::required_bytes(records);
        let mut guard = self.inner.lock().map_err(poison)?;

        let remaining = guard.journal_size - guard.append_pos;
        if required > remaining {
            return Err(JournalError::NeedsRollover { remaining, required });
        }

        for record in records.iter() {
            let len = record.payload().len();
            if len > self.max_record_size as usize {
                return Err(JournalError::RecordTooLarge(len));
            }
        }

        let target_generation = guard.current_generation;
        let mut out = Vec::with_capacity(required as usize);
        for record in records.iter_mut() {
            record::encode(record, target_generation, &mut out)?;
        }

        guard.file.seek(SeekFrom::Start(guard.append_pos))?;
        guard.file.write_all(&out)?;
        guard.append_pos += out.len() as u64;
        guard.last_modified = Instant::now();

        debug!(bytes = out.len(), count = records.len(), "journal batch written");
        Ok(out.len() as u64)
    }

    /// Erases the tail of the record area and begins a new generation.
    ///
    /// `previous_generation` becomes the current generation, a fresh
    /// random id becomes current, the header is rewritten, and the append
    /// point resets to [`FIXED_HEADER_SIZE`].
    pub fn rollover(&self) -> Result<(), JournalError> {
        let mut guard = self.inner.lock().map_err(poison)?;

        let fill_len = guard.journal_size - guard.append_pos;
        if fill_len > 0 {
            guard.file.seek(SeekFrom::Start(guard.append_pos))?;
            write_fill(&mut guard.file, fill_len, ROLLOVER_FILL_BYTE)?;
        }

        let next_generation = GenerationId::random();
        guard.previous_generation = guard.current_generation;
        guard.current_generation = next_generation;

        guard.file.seek(SeekFrom::Start(0))?;
        write_header(&mut guard.file, guard.previous_generation, guard.current_generation)?;
        guard.file.seek(SeekFrom::Start(FIXED_HEADER_SIZE))?;
        guard.append_pos = FIXED_HEADER_SIZE;
        guard.last_modified = Instant::now();

        info!(previous = %guard.previous_generation, current = %guard.current_generation, "journal rolled over");
        Ok(())
    }

    /// Extends the journal to `new_size` if larger than its current
    /// declared size. Never shrinks.
    pub fn grow(&self, new_size: u64) -> Result<(), JournalError> {
        let mut guard = self.inner.lock().map_err(poison)?;
        if new_size > guard.journal_size {
            guard.file.set_len(new_size)?;
            guard.journal_size = new_size;
            debug!(new_size, "journal grown");
        }
        Ok(())
    }

    /// Issues `fsync` if anything has been written since the last
    /// successful force; otherwise a no-op, to avoid syscall spam.
    pub fn force(&self) -> Result<(), JournalError> {
        let mut guard = self.inner.lock().map_err(poison)?;
        if guard.last_forced != guard.last_modified {
            guard.file.sync_all()?;
            guard.last_forced = guard.last_modified;
        }
        Ok(())
    }

    /// Bytes remaining in the record area before the next
    /// [`JournalFile::rollover`] is required.
    pub fn remaining_capacity(&self) -> Result<u64, JournalError> {
        let guard = self.inner.lock().map_err(poison)?;
        Ok(guard.journal_size - guard.append_pos)
    }

    /// Returns a lazy iterator over every recoverable record: those
    /// written under the previous generation followed by those written
    /// under the current one.
    ///
    /// The current generation occupies `[FIXED_HEADER_SIZE, append_pos)`,
    /// the region it has overwritten so far; anything the previous
    /// generation left beyond that point, `[append_pos, journal_size)`,
    /// has not yet been eclipsed by new writes and is still recoverable.
    /// Both bounds are snapshotted at call time, so this iterator cannot
    /// race a concurrent append into running past data still being
    /// written.
    pub fn read_all(&self, include_invalid: bool) -> Result<JournalReader<P>, JournalError> {
        let (previous_generation, current_generation, append_pos, journal_size) = {
            let guard = self.inner.lock().map_err(poison)?;
            (
                guard.previous_generation,
                guard.current_generation,
                guard.append_pos,
                guard.journal_size,
            )
        };

        let previous = Scanner::new(
            Arc::clone(&self.inner),
            Arc::clone(&self.provider),
            previous_generation,
            self.max_record_size,
            include_invalid,
            append_pos,
            journal_size,
        );
        let current = Scanner::new(
            Arc::clone(&self.inner),
            Arc::clone(&self.provider),
            current_generation,
            self.max_record_size,
            include_invalid,
            FIXED_HEADER_SIZE,
            append_pos,
        );

        Ok(JournalReader {
            inner: previous.chain(current),
        })
    }

    /// Flushes and releases the exclusive lock. Idempotent after the
    /// first call.
    pub fn close(&self) -> Result<(), JournalError> {
        self.force()?;
        let guard = self.inner.lock().map_err(poison)?;
        let _ = FileExt::unlock(&guard.file);
        Ok(())
    }

    /// Path of the underlying journal file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The journal's declared size in bytes.
    pub fn journal_size(&self) -> Result<u64, JournalError> {
        let guard = self.inner.lock().map_err(poison)?;
        Ok(guard.journal_size)
    }

    /// The current generation id, for diagnostics and tests.
    pub fn current_generation(&self) -> Result<GenerationId, JournalError> {
        let guard = self.inner.lock().map_err(poison)?;
        Ok(guard.current_generation)
    }
}

impl<P: BufferProvider> Drop for JournalFile<P> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(path = %self.path.display(), error = %e, "journal close failed on drop");
        }
    }
}

/// Chained, lazy iterator over the previous and current generation's
/// records, in that order.
pub struct JournalReader<P: BufferProvider> {
    inner: std::iter::Chain<Scanner<P>, Scanner<P>>,
}

impl<P: BufferProvider> Iterator for JournalReader<P> {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        self.inner.next()
    }
}

fn poison<T>(_: std::sync::PoisonError<T>) -> JournalError {
    JournalError::Internal("journal mutex poisoned".into())
}

// ------------------------------------------------------------------------------------------------
// Header I/O helpers
// ------------------------------------------------------------------------------------------------

fn write_header(file: &mut File, previous: GenerationId, current: GenerationId) -> io::Result<()> {
    let mut header = vec![0u8; FIXED_HEADER_SIZE as usize];
    header[..MAGIC.len()].copy_from_slice(MAGIC);
    header[PREV_GEN_OFFSET..PREV_GEN_OFFSET + GEN_ID_SIZE].copy_from_slice(previous.as_bytes());
    header[CURR_GEN_OFFSET..CURR_GEN_OFFSET + GEN_ID_SIZE].copy_from_slice(current.as_bytes());

    file.seek(SeekFrom::Start(0))?;
    file.write_all(&header)
}

/// Reads and parses the file header at the current file position (which
/// must be 0). Returns whether the magic matched, plus the two generation
/// ids (meaningless if magic didn't match).
fn read_header(file: &mut File) -> io::Result<(bool, GenerationId, GenerationId)> {
    file.seek(SeekFrom::Start(0))?;
    let mut header = vec![0u8; FIXED_HEADER_SIZE as usize];
    file.read_exact(&mut header)?;

    let magic_ok = header.starts_with(MAGIC);

    let mut previous = [0u8; GEN_ID_SIZE];
    previous.copy_from_slice(&header[PREV_GEN_OFFSET..PREV_GEN_OFFSET + GEN_ID_SIZE]);
    let mut current = [0u8; GEN_ID_SIZE];
    current.copy_from_slice(&header[CURR_GEN_OFFSET..CURR_GEN_OFFSET + GEN_ID_SIZE]);

    Ok((
        magic_ok,
        GenerationId::from_bytes(previous),
        GenerationId::from_bytes(current),
    ))
}

fn write_fill(file: &mut File, len: u64, byte: u8) -> io::Result<()> {
    const CHUNK: usize = 64 * 1024;
    let chunk = vec![byte; CHUNK.min(len as usize).max(1)];
    let mut remaining = len;
    while remaining > 0 {
        let n = (remaining as usize).min(chunk.len());
        file.write_all(&chunk[..n])?;
        remaining -= n as u64;
    }
    Ok(())
}
