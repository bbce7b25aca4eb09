//! Error types for the rolling journal.
//!
//! One `thiserror`-derived, `#[non_exhaustive]` enum wrapping the
//! underlying cause, with no bare `String`-only variants except for
//! genuine internal invariant violations.

use std::io;
use thiserror::Error;

/// Errors returned by journal operations.
///
/// Scanner-level data corruption (partial records, CRC mismatches, foreign
/// generation ids) is never surfaced through this type — see the module
/// documentation on [`crate::scanner`] for why. `JournalError` is reserved
/// for open-time fatal conditions, runtime-recoverable conditions the
/// caller must act on, and caller misuse.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum JournalError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The journal file is locked by another process or handle.
    #[error("journal file is locked by another process")]
    Busy,

    /// The file header magic did not match the expected banner.
    #[error("journal header magic mismatch")]
    BadMagic,

    /// A write batch does not fit in the remaining record area; the caller
    /// must call [`crate::JournalFile::rollover`] before retrying.
    #[error("write needs {required} bytes but only {remaining} remain in the record area; call rollover()")]
    NeedsRollover {
        /// Bytes left before the end of the record area.
        remaining: u64,
        /// Bytes required to write the rejected batch.
        required: u64,
    },

    /// A record's total on-disk size exceeds the journal's configured
    /// maximum.
    #[error("record payload of {0} bytes exceeds the configured maximum")]
    RecordTooLarge(usize),

    /// Internal invariant violation (poisoned lock, unreachable state).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, JournalError>;
