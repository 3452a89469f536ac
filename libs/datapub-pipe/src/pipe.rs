//! Push-to-pull adapter over a [`RingBuffer`]
//!
//! A producer pushes bytes through a [`PipeWriter`] while a consumer on the
//! same thread pulls them with [`Pipe::read`]. A thread cannot block on its own
//! pipe, so a full buffer grows instead of applying backpressure.

use std::io;

use tracing::debug;

use crate::error::{PipeError, Result};
use crate::ring::RingBuffer;

/// Initial capacity used by [`Pipe::default`]
pub const DEFAULT_CAPACITY: usize = 8 * 1024;

/// Result of a non-blocking read from the pipe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeRead {
    /// This many bytes were copied into the caller's buffer
    Data(usize),
    /// Nothing buffered yet, but the producer may still write
    Pending,
    /// Write side closed and every buffered byte consumed
    EndOfStream,
}

/// Single-threaded pipe with a growable ring buffer
#[derive(Debug, Clone)]
pub struct Pipe {
    ring: RingBuffer,
    write_closed: bool,
    read_closed: bool,
}

impl Pipe {
    /// Create a pipe whose buffer starts at `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: RingBuffer::new(capacity),
            write_closed: false,
            read_closed: false,
        }
    }

    /// Push bytes from the producer side
    ///
    /// Grows the buffer by 1.5x, or to fit the incoming chunk if that is
    /// larger, whenever the chunk does not fit. Always accepts the whole chunk.
    ///
    /// # Errors
    ///
    /// Returns `PipeError::WriteClosed` once the write side is closed.
    pub fn receive(&mut self, data: &[u8]) -> Result<()> {
        if self.write_closed {
            return Err(PipeError::WriteClosed);
        }

        if data.len() > self.ring.free() {
            let grown = self.ring.capacity() + self.ring.capacity() / 2;
            let needed = self.ring.len() + data.len();
            let new_capacity = grown.max(needed);
            debug!(
                from = self.ring.capacity(),
                to = new_capacity,
                "Growing pipe buffer"
            );
            self.ring.resize(new_capacity)?;
        }

        let written = self.ring.write(data);
        debug_assert_eq!(written, data.len());
        Ok(())
    }

    /// Pull up to `out.len()` bytes from the consumer side
    ///
    /// Never blocks. Returns `PipeRead::EndOfStream` only when the write side
    /// is closed and the buffer is drained.
    ///
    /// # Errors
    ///
    /// Returns `PipeError::ReadClosed` once the read side is closed.
    pub fn read(&mut self, out: &mut [u8]) -> Result<PipeRead> {
        if self.read_closed {
            return Err(PipeError::ReadClosed);
        }

        if self.ring.is_empty() {
            return Ok(if self.write_closed {
                PipeRead::EndOfStream
            } else {
                PipeRead::Pending
            });
        }

        Ok(PipeRead::Data(self.ring.read(out)))
    }

    /// Bytes buffered and not yet read
    pub fn available(&self) -> usize {
        self.ring.len()
    }

    /// Current capacity of the backing ring buffer
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Producer-facing handle implementing `std::io::Write`
    pub fn writer(&mut self) -> PipeWriter<'_> {
        PipeWriter { pipe: self }
    }

    /// Mark the producer as finished; buffered bytes stay readable
    pub fn close_write(&mut self) {
        self.write_closed = true;
    }

    /// Stop the consumer; later reads fail
    pub fn close_read(&mut self) {
        self.read_closed = true;
    }

    pub fn is_write_closed(&self) -> bool {
        self.write_closed
    }

    pub fn is_read_closed(&self) -> bool {
        self.read_closed
    }
}

impl Default for Pipe {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Borrowed producer side of a [`Pipe`]
///
/// Handed to loaders for the duration of a single `load_next` call.
#[derive(Debug)]
pub struct PipeWriter<'a> {
    pipe: &'a mut Pipe,
}

impl PipeWriter<'_> {
    /// Push a chunk into the pipe
    pub fn receive(&mut self, data: &[u8]) -> Result<()> {
        self.pipe.receive(data)
    }

    /// Bytes currently buffered in the underlying pipe
    pub fn buffered(&self) -> usize {
        self.pipe.available()
    }
}

impl io::Write for PipeWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pipe.receive(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
