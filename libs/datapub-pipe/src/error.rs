//! Error types for the byte pipe

use std::io;
use thiserror::Error;

/// Result type alias for pipe operations
pub type Result<T> = std::result::Result<T, PipeError>;

/// Errors raised by the ring buffer, the pipe and the lazy stream
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipeError {
    /// Single-byte read from a buffer holding no bytes
    #[error("Ring buffer is empty")]
    BufferEmpty,

    /// Single-byte write into a buffer with no free space
    #[error("Ring buffer is full")]
    BufferFull,

    /// Resize would drop unread bytes
    #[error("Cannot resize ring buffer to {requested} bytes while {buffered} bytes are buffered")]
    ShrinkBelowContent { requested: usize, buffered: usize },

    /// Producer wrote after the write side was closed
    #[error("Pipe write side is closed")]
    WriteClosed,

    /// Consumer read after the read side was closed
    #[error("Pipe read side is closed")]
    ReadClosed,

    /// A previous `load_next` failed; the stream cannot be resumed
    #[error("Stream is unusable after a failed load: {0}")]
    Poisoned(String),
}

impl PipeError {
    /// Create a shrink-below-content error
    pub fn shrink_below_content(requested: usize, buffered: usize) -> Self {
        Self::ShrinkBelowContent {
            requested,
            buffered,
        }
    }
}

impl From<PipeError> for io::Error {
    fn from(err: PipeError) -> Self {
        let kind = match err {
            PipeError::WriteClosed | PipeError::ReadClosed => io::ErrorKind::BrokenPipe,
            PipeError::ShrinkBelowContent { .. } => io::ErrorKind::InvalidInput,
            PipeError::BufferEmpty | PipeError::BufferFull | PipeError::Poisoned(_) => {
                io::ErrorKind::Other
            }
        };
        io::Error::new(kind, err)
    }
}
