//! Media sink abstraction.
//!
//! A sink is the decoder-facing buffer the playback surface reads from. It
//! accepts opaque fMP4 chunks in order, reports which presentation times it
//! holds and can drop ranges of them. Operations may complete asynchronously;
//! while one is running [`MediaSink::is_updating`] is `true`.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use sratim_common::{MediaDescriptor, TimeRange, VideoCodecFamily};

/// Format a sink is configured with before the first append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkFormat {
    pub video: VideoCodecFamily,
    pub has_audio: bool,
    /// Full MIME type with codecs parameter.
    pub mime_type: String,
}

impl SinkFormat {
    /// Derive the sink format for a descriptor, `None` when the codec
    /// family has no playable representation.
    pub fn for_descriptor(descriptor: &MediaDescriptor) -> Option<Self> {
        let has_audio = descriptor.has_audio();
        let mime_type = sratim_media::mime_type(descriptor.video_codec_family, has_audio)?;
        Some(Self {
            video: descriptor.video_codec_family,
            has_audio,
            mime_type,
        })
    }
}

/// Failure reported by a sink operation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SinkError {
    /// The sink is full; the append was not applied.
    #[error("quota exceeded")]
    QuotaExceeded,

    /// The sink cannot play this format.
    #[error("unsupported format: {0}")]
    Unsupported(String),

    /// The operation is not valid right now (not configured, already ended).
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The appended bytes could not be parsed.
    #[error("malformed media: {0}")]
    Malformed(String),
}

impl From<SinkError> for sratim_common::Error {
    fn from(err: SinkError) -> Self {
        match err {
            SinkError::QuotaExceeded => Self::SinkCapacityExceeded,
            SinkError::Unsupported(msg) => Self::UnsupportedFormat(msg),
            other => Self::sink(other.to_string()),
        }
    }
}

/// Decoder-facing buffer fed by the session controller.
///
/// The controller serializes all calls: no operation is issued while another
/// is outstanding.
#[async_trait]
pub trait MediaSink: Send {
    /// Prepare the sink for a stream format. Called after [`reset`](Self::reset).
    async fn configure(&mut self, format: &SinkFormat) -> Result<(), SinkError>;

    /// Append the next chunk of the stream.
    async fn append(&mut self, chunk: Bytes) -> Result<(), SinkError>;

    /// Account for a chunk that was dropped instead of appended.
    ///
    /// Sinks that parse the stream use this to stay aligned with box
    /// boundaries; media overlapping the chunk is never buffered.
    async fn discard(&mut self, chunk: Bytes) -> Result<(), SinkError> {
        let _ = chunk;
        Ok(())
    }

    /// Remove buffered media inside `range`. Reopens an ended stream.
    async fn remove(&mut self, range: TimeRange) -> Result<(), SinkError>;

    /// Offset added to the timestamps of subsequently appended media.
    async fn set_timestamp_offset(&mut self, offset_secs: f64) -> Result<(), SinkError>;

    /// Signal that no more media follows.
    async fn end_of_stream(&mut self) -> Result<(), SinkError>;

    /// Tear down all state, as if freshly created.
    async fn reset(&mut self) -> Result<(), SinkError>;

    /// Whether an operation is still being applied.
    fn is_updating(&self) -> bool;

    /// Buffered presentation ranges, ordered by start.
    fn buffered(&self) -> Vec<TimeRange>;
}
