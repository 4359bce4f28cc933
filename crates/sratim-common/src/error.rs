//! Error taxonomy for the playback engine.
//!
//! Every failure a playback session can run into maps onto one variant of
//! [`Error`]. [`Error::is_fatal`] tells the session controller whether the
//! condition ends the session or is absorbed locally.

use crate::types::TrackKind;

/// Common error type for sratim.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The media descriptor could not be fetched.
    #[error("Metadata unavailable: {0}")]
    MetadataUnavailable(String),

    /// A fetch was cancelled because its session was superseded.
    #[error("Fetch aborted")]
    FetchAborted,

    /// The stream transfer failed for a reason other than cancellation.
    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    /// The sink refused an append and trimming could not make room.
    #[error("Sink capacity exceeded")]
    SinkCapacityExceeded,

    /// The playback surface reported a decode failure.
    #[error("Decode fault: {0}")]
    DecodeFault(String),

    /// Decode faults recurred faster than the recovery cool-down.
    #[error("Playback unrecoverable: {0}")]
    PlaybackUnrecoverable(String),

    /// The playback surface reported a fault that is not a decode failure.
    #[error("Playback fault: {0}")]
    PlaybackFault(String),

    /// The viewing environment cannot play the media's codec family.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A sink operation did not complete within its deadline.
    #[error("Sink busy: {operation} did not complete within {waited_ms} ms")]
    SinkBusyTimeout {
        operation: &'static str,
        waited_ms: u64,
    },

    /// Any other sink failure.
    #[error("Sink error: {0}")]
    Sink(String),

    /// A track index that the media descriptor does not list.
    #[error("Invalid {kind} track index: {index}")]
    InvalidTrack { kind: TrackKind, index: usize },

    /// The operation is not allowed in the current session state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Invalid input was provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new MetadataUnavailable error.
    pub fn metadata_unavailable<S: Into<String>>(msg: S) -> Self {
        Self::MetadataUnavailable(msg.into())
    }

    /// Create a new FetchFailed error.
    pub fn fetch_failed<S: Into<String>>(msg: S) -> Self {
        Self::FetchFailed(msg.into())
    }

    /// Create a new DecodeFault error.
    pub fn decode_fault<S: Into<String>>(msg: S) -> Self {
        Self::DecodeFault(msg.into())
    }

    /// Create a new PlaybackUnrecoverable error.
    pub fn unrecoverable<S: Into<String>>(msg: S) -> Self {
        Self::PlaybackUnrecoverable(msg.into())
    }

    /// Create a new UnsupportedFormat error.
    pub fn unsupported_format<S: Into<String>>(msg: S) -> Self {
        Self::UnsupportedFormat(msg.into())
    }

    /// Create a new Sink error.
    pub fn sink<S: Into<String>>(msg: S) -> Self {
        Self::Sink(msg.into())
    }

    /// Create a new InvalidState error.
    pub fn invalid_state<S: Into<String>>(msg: S) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Create a new InvalidInput error.
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new Internal error.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error ends the current playback session.
    ///
    /// Cancellation, capacity pressure and single decode faults are handled
    /// locally; caller mistakes (bad track index, bad input, wrong state) are
    /// rejected without touching the session.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::FetchAborted
                | Self::SinkCapacityExceeded
                | Self::DecodeFault(_)
                | Self::InvalidTrack { .. }
                | Self::InvalidState(_)
                | Self::InvalidInput(_)
        )
    }

    /// Short machine-readable name of the variant, used in events and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MetadataUnavailable(_) => "metadata_unavailable",
            Self::FetchAborted => "fetch_aborted",
            Self::FetchFailed(_) => "fetch_failed",
            Self::SinkCapacityExceeded => "sink_capacity_exceeded",
            Self::DecodeFault(_) => "decode_fault",
            Self::PlaybackUnrecoverable(_) => "playback_unrecoverable",
            Self::PlaybackFault(_) => "playback_fault",
            Self::UnsupportedFormat(_) => "unsupported_format",
            Self::SinkBusyTimeout { .. } => "sink_busy_timeout",
            Self::Sink(_) => "sink",
            Self::InvalidTrack { .. } => "invalid_track",
            Self::InvalidState(_) => "invalid_state",
            Self::InvalidInput(_) => "invalid_input",
            Self::Io(_) => "io",
            Self::Internal(_) => "internal",
        }
    }
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;
