//! Error types for sratim-media.

use thiserror::Error;

/// Result type for sratim-media operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for sratim-media operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid MP4 box structure.
    #[error("Invalid MP4: {0}")]
    InvalidMp4(String),

    /// A box that must precede the current one has not been seen.
    #[error("Missing required atom: {0}")]
    MissingAtom(&'static str),

    /// Unsupported feature or codec.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Buffer too small for operation.
    #[error("Buffer underflow: need {need} bytes, have {have}")]
    BufferUnderflow { need: usize, have: usize },
}

impl Error {
    /// Create an invalid MP4 error.
    pub fn invalid_mp4(msg: impl Into<String>) -> Self {
        Self::InvalidMp4(msg.into())
    }

    /// Create an unsupported error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }
}

impl From<Error> for sratim_common::Error {
    fn from(err: Error) -> Self {
        sratim_common::Error::sink(err.to_string())
    }
}
