//! Fixed-capacity circular byte store
//!
//! The buffer keeps two monotonically increasing cursors. Their difference is
//! the number of buffered bytes; the backing index of a cursor is
//! `cursor % capacity`. Bulk reads and writes move the largest contiguous run
//! before the end of the backing array, then wrap at most once.
//!
//! Not thread-safe: a `RingBuffer` is owned by exactly one producer/consumer
//! pair living on the same thread.


use crate::error::{PipeError, Result};

/// Circular byte buffer with separate read and write cursors
///
/// # Example
///
/// ```rust
/// use datapub_pipe::RingBuffer;
///
/// let mut ring = RingBuffer::new(4);
/// assert_eq!(ring.write(b"hello"), 4);
///
/// let mut out = [0u8; 8];
/// assert_eq!(ring.read(&mut out), 4);
/// assert_eq!(&out[..4], b"hell");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingBuffer {
    buf: Box<[u8]>,
    read_pos: u64,
    write_pos: u64,
}

impl RingBuffer {
    /// Create an empty buffer holding at most `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            read_pos: 0,
            write_pos: 0,
        }
    }

    /// Maximum number of bytes the buffer can hold
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Number of bytes currently buffered
    pub fn len(&self) -> usize {
        (self.write_pos - self.read_pos) as usize
    }

    /// Number of bytes that can be written before the buffer is full
    pub fn free(&self) -> usize {
        self.capacity() - self.len()
    }

    pub fn is_empty(&self) -> bool {
        self.write_pos == self.read_pos
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    /// Write as many bytes of `data` as fit, returning the count written
    ///
    /// Returns 0 when the buffer is full. Never grows the buffer.
    pub fn write(&mut self, data: &[u8]) -> usize {
        if data.is_empty() || self.is_full() {
            return 0;
        }

        let start = self.index(self.write_pos);
        let run = self.bytes_writable_to_end().min(data.len());
        self.buf[start..start + run].copy_from_slice(&data[..run]);
        self.write_pos += run as u64;

        if run < data.len() {
            // The write cursor is now at index 0 or the buffer is full
            run + self.write(&data[run..])
        } else {
            run
        }
    }

    /// Read up to `out.len()` bytes, returning the count read
    ///
    /// Returns fewer bytes than requested if the buffer empties mid-read,
    /// and 0 if it was empty.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        if out.is_empty() || self.is_empty() {
            return 0;
        }

        let start = self.index(self.read_pos);
        let run = self.bytes_readable_to_end().min(out.len());
        out[..run].copy_from_slice(&self.buf[start..start + run]);
        self.read_pos += run as u64;

        if run < out.len() {
            run + self.read(&mut out[run..])
        } else {
            run
        }
    }

    /// Read a single byte
    ///
    /// # Errors
    ///
    /// Returns `PipeError::BufferEmpty` if nothing is buffered.
    pub fn read_byte(&mut self) -> Result<u8> {
        if self.is_empty() {
            return Err(PipeError::BufferEmpty);
        }
        let byte = self.buf[self.index(self.read_pos)];
        self.read_pos += 1;
        Ok(byte)
    }

    /// Write a single byte
    ///
    /// # Errors
    ///
    /// Returns `PipeError::BufferFull` if there is no free space.
    pub fn write_byte(&mut self, byte: u8) -> Result<()> {
        if self.is_full() {
            return Err(PipeError::BufferFull);
        }
        let idx = self.index(self.write_pos);
        self.buf[idx] = byte;
        self.write_pos += 1;
        Ok(())
    }

    /// Move the unread bytes into a new backing array of `new_capacity` bytes
    ///
    /// Cursors are renormalized: afterwards the read cursor is 0 and the write
    /// cursor equals the number of buffered bytes. Only `len()` is stable
    /// across a resize.
    ///
    /// # Errors
    ///
    /// Returns `PipeError::ShrinkBelowContent` if `new_capacity < len()`.
    /// The buffer is left untouched in that case.
    pub fn resize(&mut self, new_capacity: usize) -> Result<()> {
        let buffered = self.len();
        if new_capacity < buffered {
            return Err(PipeError::shrink_below_content(new_capacity, buffered));
        }

        let mut next = vec![0u8; new_capacity].into_boxed_slice();
        let copied = self.read(&mut next[..buffered]);
        debug_assert_eq!(copied, buffered);

        self.buf = next;
        self.read_pos = 0;
        self.write_pos = buffered as u64;
        Ok(())
    }

    /// Deep copy of the backing array and cursors
    ///
    /// The copy is consumed independently of the original, e.g. to inspect
    /// buffered output without draining it.
    pub fn copy(&self) -> Self {
        self.clone()
    }

    fn index(&self, cursor: u64) -> usize {
        (cursor % self.capacity() as u64) as usize
    }

    /// Largest span writable without wrapping
    fn bytes_writable_to_end(&self) -> usize {
        let to_end = self.capacity() - self.index(self.write_pos);
        self.free().min(to_end)
    }

    /// Largest span readable without wrapping
    fn bytes_readable_to_end(&self) -> usize {
        let to_end = self.capacity() - self.index(self.read_pos);
        self.len().min(to_end)
    }
}
