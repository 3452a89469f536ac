//! # DataPub Byte Pipe
//!
//! Single-threaded, non-blocking plumbing for streaming request bodies whose
//! bytes are computed on demand (e.g. compressed on the fly):
//!
//! - [`RingBuffer`]: fixed-capacity circular byte store
//! - [`Pipe`]: push-to-pull adapter that grows instead of blocking
//! - [`LazyTransformStream`]: `std::io::Read` source filled by a [`LoadNext`] hook
//!
//! None of these types are meant to be shared between threads. A stream may be
//! moved to another thread (e.g. handed to an HTTP client as a body) as long
//! as its loader is `Send`, but producer and consumer always run on the
//! thread that currently owns it.
//!
//! ## Example
//!
//! ```rust
//! use std::io::Read;
//! use datapub_pipe::{Compression, LazyTransformStream, DEFAULT_CHUNK_SIZE};
//!
//! let csv = b"id,value\n1,42\n".repeat(100);
//! let mut body = LazyTransformStream::gzip(csv.as_slice(), DEFAULT_CHUNK_SIZE, Compression::default());
//!
//! let mut compressed = Vec::new();
//! body.read_to_end(&mut compressed).unwrap();
//! assert!(compressed.len() < csv.len());
//! ```

mod error;
mod pipe;
mod ring;
mod stream;

pub use error::{PipeError, Result};
pub use flate2::Compression;
pub use pipe::{Pipe, PipeRead, PipeWriter, DEFAULT_CAPACITY};
pub use ring::RingBuffer;
pub use stream::{CopyLoader, GzipLoader, LazyTransformStream, LoadNext, DEFAULT_CHUNK_SIZE};
