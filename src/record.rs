//! Record framing and the record codec.
//!
//! A record is self-delimiting: it opens and closes with a copy of the same
//! 128-bit generation id, bracketed by literal marker bytes, so a scanner
//! can resynchronize from any byte offset in the record area — not just
//! from a record boundary — and tell a torn write from a foreign-generation
//! record from silent payload corruption.
//!
//! # On-disk layout
//!
//! ```text
//! PREFIX | GEN_ID | LENGTH | CRC32 | SUFFIX | PAYLOAD (LENGTH bytes) | TRAILER_MARK | GEN_ID
//! 5 B    | 16 B   | 4 B    | 4 B   | 2 B    |   LENGTH bytes         |   2 B        | 16 B
//! ```
//!
//! `LENGTH` and `CRC32` are 32-bit big-endian integers. `CRC32` covers only
//! the payload bytes, never the framing.

use crate::buffer::Buffer;
use crate::error::JournalError;
use crc32fast::Hasher as Crc32;
use rand::RngCore;
use std::fmt;

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Framing constants
// ------------------------------------------------------------------------------------------------

/// Literal bytes opening every record. Five bytes, not four — a `\r\n`
/// line break followed by `LR[`.
pub const PREFIX: &[u8] = b"\r\nLR[";
/// Literal bytes separating the CRC32 field from the payload.
pub const SUFFIX: &[u8] = b"][";
/// Literal bytes opening the trailer, immediately before the closing
/// generation id.
pub const TRAILER_MARK: &[u8] = b"]-";

/// Size in bytes of a generation id.
pub const GEN_ID_SIZE: usize = 16;
const LENGTH_SIZE: usize = 4;
const CRC_SIZE: usize = 4;

/// Byte offset of the length field, relative to the start of a record.
pub const RECORD_LENGTH_OFFSET: usize = PREFIX.len() + GEN_ID_SIZE;
/// Byte offset of the CRC32 field, relative to the start of a record.
pub const RECORD_CRC32_OFFSET: usize = RECORD_LENGTH_OFFSET + LENGTH_SIZE;
const SUFFIX_OFFSET: usize = RECORD_CRC32_OFFSET + CRC_SIZE;

/// Total size of the fixed-width record header (everything before the
/// payload).
pub const HEADER_SIZE: usize = SUFFIX_OFFSET + SUFFIX.len();
/// Total size of the fixed-width record trailer (everything after the
/// payload).
pub const TRAILER_SIZE: usize = TRAILER_MARK.len() + GEN_ID_SIZE;
/// Combined framing overhead (header + trailer) for a zero-length payload.
pub const RECORD_OVERHEAD: usize = HEADER_SIZE + TRAILER_SIZE;

/// Default upper bound on a record's payload length.
pub const DEFAULT_MAX_RECORD_SIZE: u32 = 16 * 1024 * 1024;

// ------------------------------------------------------------------------------------------------
// Generation id
// ------------------------------------------------------------------------------------------------

/// A 128-bit identifier tagging every record written during one cycle of
/// the rolling journal.
///
/// Using a random id both as a framing delimiter and as a generation tag
/// is the central trick of this format: it makes a lucky collision with
/// payload bytes astronomically unlikely, and lets a scan classify a
/// record as live or stale in O(1) without consulting an index.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct GenerationId([u8; GEN_ID_SIZE]);

impl GenerationId {
    /// Generates a fresh, uniformly random generation id.
    pub fn random() -> Self {
        let mut bytes = [0u8; GEN_ID_SIZE];
        rand::rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Builds a generation id from raw bytes, e.g. when reading the file
    /// header.
    pub fn from_bytes(bytes: [u8; GEN_ID_SIZE]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes of this generation id.
    pub fn as_bytes(&self) -> &[u8; GEN_ID_SIZE] {
        &self.0
    }
}

impl fmt::Debug for GenerationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GenerationId(")?;
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for GenerationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ------------------------------------------------------------------------------------------------
// Record
// ------------------------------------------------------------------------------------------------

/// A single journal record: a generation id, an opaque payload, and a
/// derived validity flag.
///
/// Records produced by the writer (via
/// [`crate::JournalFile::create_empty_record`]) start out tagged with the
/// journal's current generation and with `valid` meaningless until
/// [`encode`] has run. Records produced by a [`crate::scanner::Scanner`]
/// have `valid` set to whether the payload's CRC32 matched what was
/// stored on disk.
pub struct Record {
    generation: GenerationId,
    payload: Buffer,
    crc32: u32,
    valid: bool,
}

impl Record {
    /// Creates a new, unencoded record tagged with `generation`, wrapping
    /// a payload buffer the caller will fill before handing it to
    /// [`crate::JournalFile::write`].
    pub fn new(generation: GenerationId, payload: Buffer) -> Self {
        Self {
            generation,
            payload,
            crc32: 0,
            valid: false,
        }
    }

    /// The generation id this record is currently tagged with.
    pub fn generation(&self) -> GenerationId {
        self.generation
    }

    /// Borrows the payload bytes.
    pub fn payload(&self) -> &[u8] {
        self.payload.as_slice()
    }

    /// Borrows the payload bytes mutably, for the writer to fill.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        self.payload.as_mut_slice()
    }

    /// Whether this record's CRC32 matched on decode. Meaningless (always
    /// `false`) for a record that hasn't been through [`encode`] or a
    /// scanner yet.
    pub fn valid(&self) -> bool {
        self.valid
    }

    /// Total on-disk size this record will occupy once encoded.
    pub fn encoded_len(&self) -> usize {
        RECORD_OVERHEAD + self.payload.len()
    }

    /// Consumes the record, returning its backing buffer for recycling.
    pub fn into_buffer(self) -> Buffer {
        self.payload
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("generation", &self.generation)
            .field("len", &self.payload.len())
            .field("valid", &self.valid)
            .finish()
    }
}

/// Sum of the on-disk sizes of every record in `batch`.
pub fn required_bytes(batch: &[Record]) -> u64 {
    batch.iter().map(|r| r.encoded_len() as u64).sum()
}

/// Serializes `record` into `out`, tagging it with `target_generation`
/// (which may differ from the generation the record was created under, if
/// the journal rolled over in between).
///
/// On success, `record`'s generation and `valid` flag are updated to
/// reflect the freshly computed framing.
pub fn encode(
    record: &mut Record,
    target_generation: GenerationId,
    out: &mut Vec<u8>,
) -> Result<(), JournalError> {
    let payload = record.payload.as_slice();
    let length = i32::try_from(payload.len())
        .map_err(|_| JournalError::RecordTooLarge(payload.len()))?;

    let start = out.len();
    out.extend_from_slice(PREFIX);
    out.extend_from_slice(target_generation.as_bytes());
    out.extend_from_slice(&length.to_be_bytes());
    out.extend_from_slice(&0u32.to_be_bytes()); // CRC32 placeholder, patched below
    out.extend_from_slice(SUFFIX);
    out.extend_from_slice(payload);
    out.extend_from_slice(TRAILER_MARK);
    out.extend_from_slice(target_generation.as_bytes());

    let crc32 = compute_crc32(payload);
    out[start + RECORD_CRC32_OFFSET..start + RECORD_CRC32_OFFSET + CRC_SIZE]
        .copy_from_slice(&crc32.to_be_bytes());

    record.generation = target_generation;
    record.crc32 = crc32;
    record.valid = true;
    Ok(())
}

fn compute_crc32(payload: &[u8]) -> u32 {
    let mut hasher = Crc32::new();
    hasher.update(payload);
    hasher.finalize()
}

// ------------------------------------------------------------------------------------------------
// Scanning
// ------------------------------------------------------------------------------------------------

/// Outcome of [`scan_next`] for one attempt at the current buffer position.
///
/// Every variant carries `consumed`: the number of leading bytes the
/// caller should advance its cursor by before calling `scan_next` again
/// (or, for [`FindResult::PartialRecord`] and
/// [`FindResult::NoHeaderInBuffer`], before refilling and retrying at the
/// new position).
#[derive(Debug)]
pub enum FindResult {
    /// A structurally valid record was found for the expected generation.
    /// `record.valid()` reflects whether its CRC32 matched.
    Found { record: Record, consumed: usize },
    /// A header matched but the buffer doesn't yet hold the full record;
    /// the caller should compact and refill from the start of the
    /// candidate (after discarding `consumed` leading bytes that are
    /// definitely not a header).
    PartialRecord { consumed: usize },
    /// A complete, CRC-valid record was found but belongs to a different
    /// generation. Safe to skip.
    OtherGeneration { consumed: usize },
    /// No header at the current position.
    NoHeaderHere { consumed: usize },
    /// The whole buffer was searched without finding a header byte.
    NoHeaderInBuffer { consumed: usize },
}

/// Scans `buf` for the next record, classifying it against
/// `expected_generation`.
///
/// This is a pure function: no I/O, callable directly against hand-built
/// byte arrays. [`crate::scanner::Scanner`] drives it in a loop over data
/// read from the journal file.
pub fn scan_next(
    buf: &[u8],
    expected_generation: GenerationId,
    max_record_size: u32,
) -> FindResult {
    let Some(p) = buf.iter().position(|&b| b == PREFIX[0]) else {
        return FindResult::NoHeaderInBuffer {
            consumed: buf.len(),
        };
    };

    let remaining = buf.len() - p;

    if remaining < PREFIX.len() {
        return FindResult::PartialRecord { consumed: p };
    }
    if &buf[p..p + PREFIX.len()] != PREFIX {
        return FindResult::NoHeaderHere { consumed: p + 1 };
    }
    if remaining < HEADER_SIZE {
        return FindResult::PartialRecord { consumed: p };
    }

    let opening_gen = read_gen_id(&buf[p + PREFIX.len()..]);

    let length = i32::from_be_bytes(
        buf[p + RECORD_LENGTH_OFFSET..p + RECORD_LENGTH_OFFSET + LENGTH_SIZE]
            .try_into()
            .expect("slice is exactly 4 bytes"),
    );
    if length < 0 || length as u32 > max_record_size {
        return FindResult::NoHeaderHere { consumed: p + 1 };
    }
    let length = length as usize;

    let total_len = HEADER_SIZE + length + TRAILER_SIZE;
    if remaining < total_len {
        return FindResult::PartialRecord { consumed: p };
    }

    if &buf[p + SUFFIX_OFFSET..p + SUFFIX_OFFSET + SUFFIX.len()] != SUFFIX {
        return FindResult::NoHeaderHere { consumed: p + 1 };
    }

    let trailer_mark_offset = p + HEADER_SIZE + length;
    if &buf[trailer_mark_offset..trailer_mark_offset + TRAILER_MARK.len()] != TRAILER_MARK {
        return FindResult::NoHeaderHere { consumed: p + 1 };
    }

    let closing_gen_offset = trailer_mark_offset + TRAILER_MARK.len();
    let closing_gen = read_gen_id(&buf[closing_gen_offset..]);
    if closing_gen != opening_gen {
        return FindResult::NoHeaderHere { consumed: p + 1 };
    }

    let payload = &buf[p + HEADER_SIZE..p + HEADER_SIZE + length];
    let stored_crc32 = u32::from_be_bytes(
        buf[p + RECORD_CRC32_OFFSET..p + RECORD_CRC32_OFFSET + CRC_SIZE]
            .try_into()
            .expect("slice is exactly 4 bytes"),
    );
    let actual_crc32 = compute_crc32(payload);

    if opening_gen == expected_generation {
        let record = Record {
            generation: opening_gen,
            payload: Buffer::from_vec(payload.to_vec()),
            crc32: actual_crc32,
            valid: actual_crc32 == stored_crc32,
        };
        FindResult::Found {
            record,
            consumed: p + total_len,
        }
    } else if actual_crc32 == stored_crc32 {
        FindResult::OtherGeneration {
            consumed: p + total_len,
        }
    } else {
        // Coincidental marker bytes inside payload data that isn't ours.
        // Resume right after the candidate's prefix, not past the whole
        // bogus record, so an overlapping real header isn't skipped.
        FindResult::NoHeaderHere {
            consumed: p + PREFIX.len(),
        }
    }
}

fn read_gen_id(buf: &[u8]) -> GenerationId {
    let mut bytes = [0u8; GEN_ID_SIZE];
    bytes.copy_from_slice(&buf[..GEN_ID_SIZE]);
    GenerationId::from_bytes(bytes)
}
