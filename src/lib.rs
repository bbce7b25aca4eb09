//! # rolling-journal
//!
//! A crash-safe, append-only, single-writer transaction journal backed by a
//! single pre-allocated file that is reused cyclically (a *rolling*
//! journal, not a log-structured one — there is no index and no
//! compaction beyond the rolling scheme itself).
//!
//! It exists to let an external transaction manager persist opaque
//! transaction-state payloads durably enough to recover them after a crash
//! during commit or rollback. The journal itself knows nothing about
//! transactions: it only frames, stores, and scans back arbitrary byte
//! payloads.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      JournalFile                         │
//! │  ┌───────────────┐   write    ┌─────────────────────┐   │
//! │  │  create_empty  │──────────►│  record area         │   │
//! │  │  _record        │           │  (pre-allocated,     │   │
//! │  └───────────────┘           │   cyclically reused) │   │
//! │                                └──────────┬──────────┘   │
//! │   rollover: erase tail, new generation id │              │
//! │                                            │ read_all     │
//! │                                ┌───────────▼──────────┐   │
//! │                                │   Scanner(previous)   │   │
//! │                                │ chained with          │   │
//! │                                │   Scanner(current)    │   │
//! │                                └───────────────────────┘   │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`record`] | Self-delimiting binary record format: codec, CRC32, resync scan |
//! | [`scanner`] | Lazy, corruption-tolerant record iteration over a file region |
//! | [`journal`] | File lifecycle — open, lock, grow, append, rollover, fsync, close |
//! | [`buffer`] | `BufferProvider` trait lending/recycling record payload buffers |
//! | [`error`] | Crate-wide error taxonomy |
//!
//! ## Key properties
//!
//! - **Self-delimiting records.** Every record opens and closes with a copy
//!   of the same 128-bit generation id bracketed by literal marker bytes,
//!   so a scan can resynchronize from any byte offset, not just a record
//!   boundary.
//! - **Two-generation recovery.** The file header tracks a `previous` and
//!   a `current` generation id; [`JournalFile::read_all`] yields the union
//!   of records tagged with either, in that order, which is always a
//!   superset of what's still recoverable after a rollover.
//! - **Explicit rollover.** A write that doesn't fit returns
//!   [`error::JournalError::NeedsRollover`] rather than rolling over
//!   implicitly, so the caller can flush or commit other metadata first.
//! - **Single writer, OS-level exclusive lock.** One process may hold a
//!   journal file open at a time; a second `open` fails fast with
//!   [`error::JournalError::Busy`].
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use rolling_journal::JournalFile;
//!
//! let journal = JournalFile::open("/tmp/txn.journal", 64 * 1024).unwrap();
//!
//! let mut record = journal.create_empty_record(5).unwrap();
//! record.payload_mut().copy_from_slice(b"hello");
//! journal.write(&mut [record]).unwrap();
//! journal.force().unwrap();
//!
//! for record in journal.read_all(false).unwrap() {
//!     assert_eq!(record.payload(), b"hello");
//! }
//!
//! journal.close().unwrap();
//! ```

#![allow(dead_code)]

pub mod buffer;
pub mod error;
pub mod journal;
pub mod record;
pub mod scanner;

pub use buffer::{Buffer, BufferProvider, HeapBufferProvider};
pub use error::{JournalError, Result};
pub use journal::{JournalFile, JournalReader, FIXED_HEADER_SIZE};
pub use record::{GenerationId, Record, DEFAULT_MAX_RECORD_SIZE};
