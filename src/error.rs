//! Error types for the cellfile storage layer.

use std::io;
use std::sync::Arc;
use thiserror::Error;

/// The result type used throughout cellfile.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for cellfile operations.
///
/// Every variant is fatal to the single operation that produced it (one
/// encode, one decode, one block fetch) and is returned to the immediate
/// caller. Retry policy belongs to higher layers.
#[derive(Debug, Error)]
pub enum Error {
    /// An I/O error occurred outside of a block fetch (open, create, sync).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Reading a block from a storage file failed.
    #[error("IO error reading block at offset {offset} of {file}: {source}")]
    BlockRead {
        /// Name of the storage file being read.
        file: Arc<str>,
        /// File offset of the block.
        offset: u64,
        /// The underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// An invalid argument was provided, such as a null value for a
    /// non-nullable codec.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A decode or skip asked for more bytes than the buffer has left.
    #[error("Buffer underflow: requested {requested} bytes, {remaining} remaining")]
    BufferUnderflow {
        /// Number of bytes the operation needed.
        requested: usize,
        /// Number of bytes left in the buffer.
        remaining: usize,
    },

    /// An encode asked for more room than the buffer has left.
    #[error("Buffer overflow: requested {requested} bytes, {remaining} remaining")]
    BufferOverflow {
        /// Number of bytes the operation needed.
        requested: usize,
        /// Number of bytes left in the buffer.
        remaining: usize,
    },

    /// No deserializer is registered under the id a cached block carries.
    #[error("No cacheable deserializer registered for id {0}")]
    DeserializerNotFound(i32),

    /// Data corruption was detected.
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// A checksum mismatch was detected.
    #[error("Checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        /// The expected checksum value.
        expected: u32,
        /// The actual checksum value.
        actual: u32,
    },

    /// The object is in a state that does not permit the operation.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Creates a new corruption error.
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    /// Creates a new invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Creates a new invalid state error.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }

    /// Creates a block read error carrying the file identity and offset.
    pub fn block_read(file: &Arc<str>, offset: u64, source: io::Error) -> Self {
        Error::BlockRead { file: Arc::clone(file), offset, source }
    }

    /// Returns true if this error means the bytes being decoded are not
    /// trustworthy, as opposed to a caller mistake or an I/O failure.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Error::Corruption(_) | Error::ChecksumMismatch { .. } | Error::BufferUnderflow { .. }
        )
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
