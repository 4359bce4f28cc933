use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::{header, Client, RequestBuilder, Response};
use serde::Deserialize;

use sratim_common::{
    AudioTrack, Error, MediaDescriptor, MediaRef, Result, SubtitleTrack, VideoCodecFamily,
};

use super::{MediaEndpoint, OpenedStream, StreamRequest};
use crate::config::EndpointConfig;

const ACTUAL_START_HEADER: &str = "x-actual-start";

/// Descriptor as served by the media server.
#[derive(Debug, Deserialize)]
struct RemoteMetadata {
    #[serde(default)]
    duration: f64,
    #[serde(default)]
    video_codec: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    audio_tracks: Vec<RemoteAudioTrack>,
    #[serde(default)]
    subtitle_tracks: Vec<RemoteSubtitleTrack>,
}

#[derive(Debug, Deserialize)]
struct RemoteAudioTrack {
    index: usize,
    language: Option<String>,
    label: Option<String>,
    #[serde(default)]
    codec: String,
    channels: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RemoteSubtitleTrack {
    index: usize,
    language: Option<String>,
    label: Option<String>,
    codec: Option<String>,
}

impl From<RemoteMetadata> for MediaDescriptor {
    fn from(remote: RemoteMetadata) -> Self {
        Self {
            // The server reports 0 when ffprobe could not determine a duration.
            duration_secs: (remote.duration.is_finite() && remote.duration > 0.0)
                .then_some(remote.duration),
            video_codec_family: VideoCodecFamily::from_codec_name(&remote.video_codec),
            title: remote.title,
            audio_tracks: remote
                .audio_tracks
                .into_iter()
                .map(|t| AudioTrack {
                    index: t.index,
                    language: t.language,
                    label: t.label,
                    codec_name: t.codec,
                    channels: t.channels,
                })
                .collect(),
            subtitle_tracks: remote
                .subtitle_tracks
                .into_iter()
                .map(|t| SubtitleTrack {
                    index: t.index,
                    language: t.language,
                    label: t.label,
                    codec_name: t.codec,
                })
                .collect(),
        }
    }
}

/// [`MediaEndpoint`] backed by the media server's HTTP API.
pub struct HttpEndpoint {
    client: Client,
    base_url: String,
    session_token: Option<String>,
    request_timeout: std::time::Duration,
}

impl HttpEndpoint {
    pub fn new(config: &EndpointConfig) -> Result<Self> {
        // No overall timeout on the client: streams stay open for the whole
        // playback. Short requests set their own.
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| Error::internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            session_token: config.session_token.clone(),
            request_timeout: config.request_timeout(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    fn get(&self, path: &str, media: &MediaRef) -> RequestBuilder {
        let mut request = self
            .client
            .get(self.url(path))
            .query(&[("path", media.path.as_str())]);
        if let Some(library_id) = &media.library_id {
            request = request.query(&[("library_id", library_id.as_str())]);
        }
        if let Some(token) = &self.session_token {
            request = request.header(header::COOKIE, format!("session={}", token));
        }
        request
    }
}

async fn check_status(response: Response, what: &str) -> std::result::Result<Response, String> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let body = body.trim();
    if body.is_empty() {
        Err(format!("{} returned {}", what, status))
    } else {
        Err(format!("{} returned {}: {}", what, status, body))
    }
}

#[async_trait]
impl MediaEndpoint for HttpEndpoint {
    async fn describe(&self, media: &MediaRef) -> Result<MediaDescriptor> {
        tracing::debug!(media = %media, "Requesting metadata");
        let response = self
            .get("/metadata", media)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| Error::metadata_unavailable(format!("metadata request failed: {}", e)))?;
        let response = check_status(response, "metadata")
            .await
            .map_err(Error::metadata_unavailable)?;

        let remote: RemoteMetadata = response
            .json()
            .await
            .map_err(|e| Error::metadata_unavailable(format!("malformed metadata: {}", e)))?;
        Ok(remote.into())
    }

    async fn open_stream(&self, request: &StreamRequest) -> Result<OpenedStream> {
        let mut builder = self
            .get("/stream", &request.media)
            .query(&[("start", format!("{:.3}", request.start_secs))]);
        if let Some(audio_track) = request.audio_track {
            builder = builder.query(&[("audio_track", audio_track)]);
        }

        tracing::debug!(
            media = %request.media,
            start = request.start_secs,
            audio_track = ?request.audio_track,
            "Opening stream"
        );
        let response = builder
            .send()
            .await
            .map_err(|e| Error::fetch_failed(format!("stream request failed: {}", e)))?;
        let response = check_status(response, "stream")
            .await
            .map_err(Error::fetch_failed)?;

        let actual_start = response
            .headers()
            .get(ACTUAL_START_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite());
        if actual_start.is_none() {
            tracing::debug!("Stream response carried no usable actual start");
        }

        let body = response
            .bytes_stream()
            .map_err(|e| Error::fetch_failed(format!("stream body: {}", e)));

        Ok(OpenedStream {
            actual_start,
            body: Box::pin(body),
        })
    }

    async fn subtitles(&self, media: &MediaRef, index: usize) -> Result<String> {
        let response = self
            .get("/subtitles", media)
            .query(&[("index", index)])
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| Error::fetch_failed(format!("subtitle request failed: {}", e)))?;
        let response = check_status(response, "subtitles")
            .await
            .map_err(Error::fetch_failed)?;
        response
            .text()
            .await
            .map_err(|e| Error::fetch_failed(format!("subtitle body: {}", e)))
    }
}
