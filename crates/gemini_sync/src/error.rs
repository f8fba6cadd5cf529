//! # Pipeline Error Types
//!
//! All errors that can occur in the synchronization pipeline.

use thiserror::Error;

/// Errors that can occur in the synchronization pipeline.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Transport-level I/O failure. Terminates the owning connection's
    /// handler; for the relay's single producer/consumer pair it is
    /// terminal for the whole relay.
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    /// The stream closed after a frame had started but before its declared
    /// length was satisfied. Always fatal for the connection.
    #[error("stream closed mid-frame: got {got} of {expected} bytes")]
    ShortRead {
        /// Bytes actually received.
        got: usize,
        /// Bytes the frame header declared.
        expected: usize,
    },

    /// Payload bytes that do not deserialize into a known frame shape.
    /// The record is dropped and the connection continues.
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The relay could not reach its downstream consumer. Fatal at
    /// startup; the process exits without entering the serve loop.
    #[error("downstream consumer unreachable at {addr}: {source}")]
    Unreachable {
        /// Address that was dialed.
        addr: String,
        /// Underlying connect failure.
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration file.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result type for pipeline operations.
pub type SyncResult<T> = Result<T, SyncError>;
