//! Demand-driven byte source
//!
//! [`LazyTransformStream`] exposes `std::io::Read` over a [`Pipe`] whose bytes
//! are produced on demand by a [`LoadNext`] implementation. The loader only
//! runs when a read cannot be satisfied from what is already buffered, so a
//! large (e.g. compressed) request body is never materialized up front.

use std::io::{self, Read, Write};

use flate2::{write::GzEncoder, Compression};
use tracing::{debug, warn};

use crate::error::PipeError;
use crate::pipe::{Pipe, PipeRead, PipeWriter, DEFAULT_CAPACITY};

/// Default number of source bytes a stock loader pulls per `load_next` call
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

/// Producer hook driving a [`LazyTransformStream`]
///
/// Each call pushes zero or more bytes into `sink` and reports whether more
/// data may follow. Returning `Ok(false)` closes the write side for good.
pub trait LoadNext {
    fn load_next(&mut self, sink: &mut PipeWriter<'_>) -> io::Result<bool>;
}

impl<F> LoadNext for F
where
    F: FnMut(&mut PipeWriter<'_>) -> io::Result<bool>,
{
    fn load_next(&mut self, sink: &mut PipeWriter<'_>) -> io::Result<bool> {
        self(sink)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Producing,
    Exhausted,
    Failed(String),
}

/// Pull-style byte source filled lazily by a [`LoadNext`] producer
///
/// Finite and not restartable: once the loader reports exhaustion, or the
/// stream is closed, no further bytes are produced. An error from the loader
/// is returned to the reader and leaves the stream unusable.
///
/// # Example
///
/// ```rust
/// use std::io::Read;
/// use datapub_pipe::LazyTransformStream;
///
/// let source: &[u8] = b"row1\nrow2\n";
/// let mut stream = LazyTransformStream::identity(source, 4);
///
/// let mut body = String::new();
/// stream.read_to_string(&mut body).unwrap();
/// assert_eq!(body, "row1\nrow2\n");
/// ```
#[derive(Debug)]
pub struct LazyTransformStream<L> {
    pipe: Pipe,
    loader: L,
    state: State,
}

impl<L: LoadNext> LazyTransformStream<L> {
    /// Wrap `loader` with a pipe of [`DEFAULT_CAPACITY`] bytes
    pub fn new(loader: L) -> Self {
        Self::with_capacity(loader, DEFAULT_CAPACITY)
    }

    /// Wrap `loader` with a pipe starting at `capacity` bytes
    pub fn with_capacity(loader: L, capacity: usize) -> Self {
        Self {
            pipe: Pipe::new(capacity),
            loader,
            state: State::Producing,
        }
    }

    /// Bytes readable without blocking, producing at least one if possible
    ///
    /// Returns 0 only once the stream is exhausted and drained.
    pub fn available(&mut self) -> io::Result<usize> {
        self.fill(1)?;
        Ok(self.pipe.available())
    }

    /// Whether the loader has reported that no more data follows
    pub fn is_exhausted(&self) -> bool {
        self.state == State::Exhausted
    }

    /// Close the read side; later reads fail with `BrokenPipe`
    pub fn close(&mut self) {
        self.pipe.close_write();
        self.pipe.close_read();
        if self.state == State::Producing {
            self.state = State::Exhausted;
        }
    }

    /// Invoke the loader until `wanted` bytes are buffered or it is exhausted
    fn fill(&mut self, wanted: usize) -> io::Result<()> {
        if let State::Failed(reason) = &self.state {
            return Err(PipeError::Poisoned(reason.clone()).into());
        }
        if self.pipe.is_read_closed() {
            return Err(PipeError::ReadClosed.into());
        }

        while self.state == State::Producing && self.pipe.available() < wanted {
            match self.loader.load_next(&mut self.pipe.writer()) {
                Ok(true) => {}
                Ok(false) => {
                    debug!(buffered = self.pipe.available(), "Loader exhausted");
                    self.pipe.close_write();
                    self.state = State::Exhausted;
                }
                Err(err) => {
                    warn!(error = %err, "Loader failed, stream is no longer usable");
                    self.state = State::Failed(err.to_string());
                    return Err(err);
                }
            }
        }
        Ok(())
    }
}

impl<L: LoadNext> Read for LazyTransformStream<L> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.fill(buf.len())?;

        match self.pipe.read(buf)? {
            PipeRead::Data(n) => Ok(n),
            PipeRead::EndOfStream => Ok(0),
            // fill() only stops early once the loader is exhausted, which
            // closes the write side
            PipeRead::Pending => Ok(0),
        }
    }
}

/// Identity loader: copies up to `chunk_size` bytes per call from a source
#[derive(Debug)]
pub struct CopyLoader<R> {
    source: R,
    chunk: Vec<u8>,
}

impl<R: Read> CopyLoader<R> {
    pub fn new(source: R, chunk_size: usize) -> Self {
        Self {
            source,
            chunk: vec![0u8; chunk_size.max(1)],
        }
    }

    /// Read the next chunk from the source, `None` at its end
    fn pull_chunk(&mut self) -> io::Result<Option<&[u8]>> {
        loop {
            match self.source.read(&mut self.chunk) {
                Ok(0) => return Ok(None),
                Ok(n) => return Ok(Some(&self.chunk[..n])),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
    }
}

impl<R: Read> LoadNext for CopyLoader<R> {
    fn load_next(&mut self, sink: &mut PipeWriter<'_>) -> io::Result<bool> {
        match self.pull_chunk()? {
            Some(data) => {
                sink.write_all(data)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Compressing loader: gzips the source bytes as they pass through
///
/// Wraps a [`CopyLoader`]; compressed output is drained into the pipe after
/// every chunk so memory stays bounded by the compressor's window.
pub struct GzipLoader<R> {
    inner: CopyLoader<R>,
    encoder: Option<GzEncoder<Vec<u8>>>,
}

impl<R: Read> GzipLoader<R> {
    pub fn new(source: R, chunk_size: usize, level: Compression) -> Self {
        Self {
            inner: CopyLoader::new(source, chunk_size),
            encoder: Some(GzEncoder::new(Vec::new(), level)),
        }
    }
}

impl<R: Read> LoadNext for GzipLoader<R> {
    fn load_next(&mut self, sink: &mut PipeWriter<'_>) -> io::Result<bool> {
        let Some(encoder) = self.encoder.as_mut() else {
            return Ok(false);
        };

        match self.inner.pull_chunk()? {
            Some(data) => {
                encoder.write_all(data)?;
                let compressed = encoder.get_mut();
                sink.write_all(compressed)?;
                compressed.clear();
                Ok(true)
            }
            None => {
                if let Some(encoder) = self.encoder.take() {
                    let tail = encoder.finish()?;
                    sink.write_all(&tail)?;
                }
                Ok(false)
            }
        }
    }
}

impl<R> std::fmt::Debug for GzipLoader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GzipLoader")
            .field("finished", &self.encoder.is_none())
            .finish()
    }
}

impl<R: Read> LazyTransformStream<CopyLoader<R>> {
    /// Stream the bytes of `source` unchanged
    pub fn identity(source: R, chunk_size: usize) -> Self {
        Self::new(CopyLoader::new(source, chunk_size))
    }
}

impl<R: Read> LazyTransformStream<GzipLoader<R>> {
    /// Stream the bytes of `source` gzip-compressed
    pub fn gzip(source: R, chunk_size: usize, level: Compression) -> Self {
        Self::new(GzipLoader::new(source, chunk_size, level))
    }
}
