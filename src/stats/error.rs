//! Error types for stats collection.
//!
//! Stream faults ([`Error::Read`], [`Error::UnexpectedEof`], [`Error::Decode`]) carry the
//! zero-based index of the record that failed. Configuration faults are reported before
//! the stream is touched.

use crate::container;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read stats record {index}: {source}")]
    Read {
        index: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("stream ended before stats record {index} was complete")]
    UnexpectedEof { index: usize },

    #[error("failed to decode stats record {index}: {source}")]
    Decode {
        index: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid sample count: {0}, must be at least 1")]
    InvalidSampleCount(usize),

    #[error(transparent)]
    InvalidContainerID(#[from] container::Error),
}

impl Error {
    /// Returns true if the error was caused by the caller's request rather than the stream.
    pub fn is_configuration_fault(&self) -> bool {
        matches!(
            self,
            Error::InvalidSampleCount(_) | Error::InvalidContainerID(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
