//! Remote media endpoint.
//!
//! The playback engine reaches the media server only through
//! [`MediaEndpoint`]: descriptor lookup, stream opening and subtitle text.
//! [`HttpEndpoint`] is the production implementation; tests substitute
//! scripted endpoints.

mod http;

pub use http::HttpEndpoint;

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};

use sratim_common::{MediaDescriptor, MediaRef, Result};

/// Ordered body chunks of an open stream.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Parameters of one stream request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamRequest {
    pub media: MediaRef,
    /// Requested start time in seconds.
    pub start_secs: f64,
    /// Audio track to mux into the stream, `None` for the endpoint default.
    pub audio_track: Option<usize>,
}

/// An opened stream: what the endpoint actually did plus the body.
pub struct OpenedStream {
    /// Keyframe-aligned start chosen by the endpoint, when reported.
    pub actual_start: Option<f64>,
    pub body: ByteStream,
}

impl std::fmt::Debug for OpenedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedStream")
            .field("actual_start", &self.actual_start)
            .finish_non_exhaustive()
    }
}

/// Source of descriptors, streams and subtitles.
#[async_trait]
pub trait MediaEndpoint: Send + Sync {
    /// Fetch the descriptor of a media file.
    async fn describe(&self, media: &MediaRef) -> Result<MediaDescriptor>;

    /// Open a fragmented MP4 stream starting at (or just before) the
    /// requested time.
    async fn open_stream(&self, request: &StreamRequest) -> Result<OpenedStream>;

    /// Fetch a subtitle track as WebVTT text.
    async fn subtitles(&self, media: &MediaRef, index: usize) -> Result<String>;
}
