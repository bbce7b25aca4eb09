//! Buffer provider contract.
//!
//! The journal never allocates payload storage directly; it always asks a
//! [`BufferProvider`] to lend a buffer and hands buffers back via
//! [`BufferProvider::recycle`] once a record is disposed. This keeps pooling
//! policy out of the core, per the module's non-goal of shipping a pooling
//! *implementation* — only the trait and a trivial default live here.

use std::fmt;
use std::sync::Arc;

/// A writable, owned byte buffer lent out by a [`BufferProvider`].
///
/// `Buffer` tracks both its allocated capacity and a logical length (the
/// number of meaningful bytes, e.g. a record's payload length). Callers
/// write through [`Buffer::as_mut_slice`] and read back through
/// [`Buffer::as_slice`].
pub struct Buffer {
    data: Vec<u8>,
}

impl Buffer {
    /// Creates a buffer of exactly `len` zeroed bytes.
    pub fn zeroed(len: usize) -> Self {
        Self {
            data: vec![0u8; len],
        }
    }

    /// Creates a buffer by taking ownership of an existing `Vec<u8>`.
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Number of meaningful bytes in this buffer.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether this buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Borrows the buffer's bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Borrows the buffer's bytes mutably.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Consumes the buffer, returning the backing `Vec<u8>`.
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer").field("len", &self.len()).finish()
    }
}

impl Clone for Buffer {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
        }
    }
}

/// Lends and recycles byte buffers for record payloads.
///
/// Implementations may pool buffers for throughput; the journal's
/// correctness never depends on recycling actually happening — a provider
/// that always allocates fresh and drops on recycle (see
/// [`HeapBufferProvider`]) is a fully valid implementation.
pub trait BufferProvider: Send + Sync {
    /// Lends a writable buffer of at least `min_capacity` bytes.
    fn poll(&self, min_capacity: usize) -> Buffer;

    /// Returns a buffer for reuse. Implementations that don't pool may
    /// simply drop it.
    fn recycle(&self, buffer: Buffer) {
        drop(buffer);
    }
}

/// Trivial allocate-and-drop buffer provider.
///
/// Makes the journal fully functional with zero configuration; a pooled
/// provider layered on top is purely a throughput optimization and is
/// intentionally left to the embedder, as this module's external contract.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapBufferProvider;

impl BufferProvider for HeapBufferProvider {
    fn poll(&self, min_capacity: usize) -> Buffer {
        Buffer::zeroed(min_capacity)
    }

    fn recycle(&self, buffer: Buffer) {
        drop(buffer);
    }
}

/// Blanket impl so `Arc<P>` can stand in for `P` at call sites that hold a
/// shared provider.
impl<P: BufferProvider + ?Sized> BufferProvider for Arc<P> {
    fn poll(&self, min_capacity: usize) -> Buffer {
        (**self).poll(min_capacity)
    }

    fn recycle(&self, buffer: Buffer) {
        (**self).recycle(buffer)
    }
}
