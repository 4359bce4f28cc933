//! Shared test harness for integration tests.
//!
//! Provides a [`ScriptedEndpoint`] whose streams are fed by the test through
//! [`StreamFeed`]s, a [`RecordingSink`] that logs every sink operation, fMP4
//! fixtures and helpers to wait for player events and snapshots. The
//! [`FixtureServer`] starts Axum on a random port for HTTP-level testing.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::UnboundedReceiverStream;

use sratim::config::PlayerConfig;
use sratim::endpoint::{MediaEndpoint, OpenedStream, StreamRequest};
use sratim::playback::{
    Event, MediaSink, PlayerEvent, PlayerHandle, PlayerSnapshot, SessionController, SinkError,
    SinkFormat,
};
use sratim::sink::MemorySink;
use sratim_common::{
    AudioTrack, Error, MediaDescriptor, MediaRef, Result, SubtitleTrack, TimeRange,
    VideoCodecFamily,
};
use sratim_media::{FragmentBuilder, InitSegmentBuilder, SampleSpec};

/// How long helpers wait before failing a test.
pub const WAIT: Duration = Duration::from_secs(5);

pub const VIDEO_TIMESCALE: u32 = 1000;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn feature_film() -> MediaRef {
    MediaRef::new("Films/Spirited Away (2001)/Spirited Away.mkv").with_library("films")
}

/// 90 minute HEVC film with Japanese and English audio and two subtitle
/// tracks.
pub fn feature_descriptor() -> MediaDescriptor {
    MediaDescriptor {
        duration_secs: Some(5400.0),
        video_codec_family: VideoCodecFamily::Hevc,
        title: Some("Spirited Away".into()),
        audio_tracks: vec![
            AudioTrack {
                index: 0,
                language: Some("jpn".into()),
                label: None,
                codec_name: "aac".into(),
                channels: Some(2),
            },
            AudioTrack {
                index: 1,
                language: Some("eng".into()),
                label: Some("English".into()),
                codec_name: "ac3".into(),
                channels: Some(6),
            },
        ],
        subtitle_tracks: vec![
            SubtitleTrack {
                index: 0,
                language: Some("eng".into()),
                label: None,
                codec_name: Some("subrip".into()),
            },
            SubtitleTrack {
                index: 1,
                language: Some("fre".into()),
                label: Some("Français".into()),
                codec_name: Some("ass".into()),
            },
        ],
    }
}

pub fn descriptor_with_codec(family: VideoCodecFamily) -> MediaDescriptor {
    MediaDescriptor {
        video_codec_family: family,
        ..feature_descriptor()
    }
}

pub fn init_segment() -> Bytes {
    InitSegmentBuilder::new()
        .video(VIDEO_TIMESCALE, 1000)
        .audio(48_000, 1024)
        .build()
}

/// A fragment of `secs` one-second video samples starting `start` seconds
/// into the stream.
pub fn fragment(sequence_number: u32, start: u64, secs: usize) -> Bytes {
    FragmentBuilder::new(sequence_number)
        .track(
            1,
            start * VIDEO_TIMESCALE as u64,
            SampleSpec::uniform(secs, VIDEO_TIMESCALE, 2048),
        )
        .build()
}

pub fn webvtt(text: &str) -> String {
    format!("WEBVTT\n\n00:00:01.000 --> 00:00:03.000\n{}\n", text)
}

/// Player tuning with short sink deadlines.
pub fn test_config() -> PlayerConfig {
    PlayerConfig {
        sink_op_timeout_ms: 1000,
        quiesce_poll_interval_ms: 1,
        quiesce_max_polls: 100,
        ..PlayerConfig::default()
    }
}

pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-6,
        "expected {expected}, got {actual}"
    );
}

// ---------------------------------------------------------------------------
// ScriptedEndpoint
// ---------------------------------------------------------------------------

/// One stream opened by the player, driven by the test.
pub struct StreamFeed {
    pub request: StreamRequest,
    tx: mpsc::UnboundedSender<Result<Bytes>>,
    pulled: Arc<AtomicUsize>,
}

impl StreamFeed {
    /// Make `chunk` available to the player. Returns `false` once the player
    /// has dropped the stream.
    pub fn push(&self, chunk: Bytes) -> bool {
        self.tx.send(Ok(chunk)).is_ok()
    }

    /// End the body normally.
    pub fn finish(self) {}

    /// Fail the body with a transfer error.
    pub fn fail(self, message: &str) {
        let _ = self.tx.send(Err(Error::fetch_failed(message)));
    }

    /// Whether the player dropped the body (fetch cancelled).
    pub fn is_cancelled(&self) -> bool {
        self.tx.is_closed()
    }

    /// Chunks the player has pulled from the body so far.
    pub fn pulled(&self) -> usize {
        self.pulled.load(Ordering::SeqCst)
    }
}

type Keyframes = Box<dyn Fn(f64) -> Option<f64> + Send + Sync>;

/// [`MediaEndpoint`] whose answers are scripted by the test.
pub struct ScriptedEndpoint {
    descriptors: Mutex<HashMap<MediaRef, MediaDescriptor>>,
    subtitles: Mutex<HashMap<usize, (String, Duration)>>,
    keyframes: Mutex<Keyframes>,
    open_failure: Mutex<Option<String>>,
    describe_calls: AtomicUsize,
    requests: Mutex<Vec<StreamRequest>>,
    feeds: mpsc::UnboundedSender<StreamFeed>,
}

impl ScriptedEndpoint {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<StreamFeed>) {
        let (feeds, rx) = mpsc::unbounded_channel();
        let endpoint = Self {
            descriptors: Mutex::new(HashMap::new()),
            subtitles: Mutex::new(HashMap::new()),
            keyframes: Mutex::new(Box::new(|_| None)),
            open_failure: Mutex::new(None),
            describe_calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            feeds,
        };
        (Arc::new(endpoint), rx)
    }

    pub fn insert(&self, media: MediaRef, descriptor: MediaDescriptor) {
        self.descriptors.lock().insert(media, descriptor);
    }

    pub fn set_subtitle(&self, index: usize, text: String, delay: Duration) {
        self.subtitles.lock().insert(index, (text, delay));
    }

    /// Keyframe alignment: maps a requested start to the reported actual
    /// start.
    pub fn set_keyframes(&self, keyframes: impl Fn(f64) -> Option<f64> + Send + Sync + 'static) {
        *self.keyframes.lock() = Box::new(keyframes);
    }

    pub fn fail_open(&self, message: &str) {
        *self.open_failure.lock() = Some(message.to_string());
    }

    pub fn describe_calls(&self) -> usize {
        self.describe_calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<StreamRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl MediaEndpoint for ScriptedEndpoint {
    async fn describe(&self, media: &MediaRef) -> Result<MediaDescriptor> {
        self.describe_calls.fetch_add(1, Ordering::SeqCst);
        self.descriptors
            .lock()
            .get(media)
            .cloned()
            .ok_or_else(|| Error::metadata_unavailable(format!("metadata returned 404 for {}", media)))
    }

    async fn open_stream(&self, request: &StreamRequest) -> Result<OpenedStream> {
        self.requests.lock().push(request.clone());
        if let Some(message) = self.open_failure.lock().clone() {
            return Err(Error::fetch_failed(message));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = pulled.clone();
        let body = UnboundedReceiverStream::new(rx).inspect(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let actual_start = {
            let keyframes = self.keyframes.lock();
            (*keyframes)(request.start_secs)
        };

        let _ = self.feeds.send(StreamFeed {
            request: request.clone(),
            tx,
            pulled,
        });

        Ok(OpenedStream {
            actual_start,
            body: Box::pin(body),
        })
    }

    async fn subtitles(&self, media: &MediaRef, index: usize) -> Result<String> {
        let entry = self.subtitles.lock().get(&index).cloned();
        let Some((text, delay)) = entry else {
            return Err(Error::fetch_failed(format!(
                "subtitles returned 404 for {} track {}",
                media, index
            )));
        };
        tokio::time::sleep(delay).await;
        Ok(text)
    }
}

// ---------------------------------------------------------------------------
// RecordingSink
// ---------------------------------------------------------------------------

/// Sink operation as seen by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq)]
pub enum SinkOp {
    Configure(String),
    Append(Bytes),
    Discard(Bytes),
    Remove(TimeRange),
    SetOffset(f64),
    EndOfStream,
    Reset,
}

pub type SinkLog = Arc<Mutex<Vec<SinkOp>>>;

/// [`MemorySink`] that logs successful operations.
pub struct RecordingSink {
    inner: MemorySink,
    log: SinkLog,
}

impl RecordingSink {
    pub fn new(capacity_bytes: u64) -> (Self, SinkLog) {
        let log: SinkLog = Arc::new(Mutex::new(Vec::new()));
        let sink = Self {
            inner: MemorySink::new(capacity_bytes),
            log: log.clone(),
        };
        (sink, log)
    }

    fn record(&self, op: SinkOp) {
        self.log.lock().push(op);
    }
}

#[async_trait]
impl MediaSink for RecordingSink {
    async fn configure(&mut self, format: &SinkFormat) -> std::result::Result<(), SinkError> {
        self.inner.configure(format).await?;
        self.record(SinkOp::Configure(format.mime_type.clone()));
        Ok(())
    }

    async fn append(&mut self, chunk: Bytes) -> std::result::Result<(), SinkError> {
        self.inner.append(chunk.clone()).await?;
        self.record(SinkOp::Append(chunk));
        Ok(())
    }

    async fn discard(&mut self, chunk: Bytes) -> std::result::Result<(), SinkError> {
        self.inner.discard(chunk.clone()).await?;
        self.record(SinkOp::Discard(chunk));
        Ok(())
    }

    async fn remove(&mut self, range: TimeRange) -> std::result::Result<(), SinkError> {
        self.inner.remove(range).await?;
        self.record(SinkOp::Remove(range));
        Ok(())
    }

    async fn set_timestamp_offset(&mut self, offset_secs: f64) -> std::result::Result<(), SinkError> {
        self.inner.set_timestamp_offset(offset_secs).await?;
        self.record(SinkOp::SetOffset(offset_secs));
        Ok(())
    }

    async fn end_of_stream(&mut self) -> std::result::Result<(), SinkError> {
        self.inner.end_of_stream().await?;
        self.record(SinkOp::EndOfStream);
        Ok(())
    }

    async fn reset(&mut self) -> std::result::Result<(), SinkError> {
        self.inner.reset().await?;
        self.record(SinkOp::Reset);
        Ok(())
    }

    fn is_updating(&self) -> bool {
        self.inner.is_updating()
    }

    fn buffered(&self) -> Vec<TimeRange> {
        self.inner.buffered()
    }
}

// ---------------------------------------------------------------------------
// Player harness
// ---------------------------------------------------------------------------

/// A running player wired to a scripted endpoint and a recording sink.
pub struct TestPlayer {
    pub player: PlayerHandle,
    pub endpoint: Arc<ScriptedEndpoint>,
    pub feeds: mpsc::UnboundedReceiver<StreamFeed>,
    pub events: broadcast::Receiver<Event>,
    pub log: SinkLog,
}

impl TestPlayer {
    /// Player for [`feature_film`] with the default test configuration.
    pub fn new() -> Self {
        Self::with_config(test_config(), 64 * 1024 * 1024)
    }

    pub fn with_config(config: PlayerConfig, sink_capacity: u64) -> Self {
        let (endpoint, feeds) = ScriptedEndpoint::new();
        endpoint.insert(feature_film(), feature_descriptor());
        let (sink, log) = RecordingSink::new(sink_capacity);
        let player = SessionController::spawn(&config, endpoint.clone(), Box::new(sink));
        let events = player.subscribe();
        Self {
            player,
            endpoint,
            feeds,
            events,
            log,
        }
    }

    /// Next stream the player opened.
    pub async fn next_feed(&mut self) -> StreamFeed {
        tokio::time::timeout(WAIT, self.feeds.recv())
            .await
            .expect("timed out waiting for a stream to be opened")
            .expect("endpoint dropped")
    }

    /// Next event matching `pred`, skipping others.
    pub async fn wait_for_event(&mut self, pred: impl Fn(&PlayerEvent) -> bool) -> PlayerEvent {
        wait_for_event(&mut self.events, pred).await
    }

    pub async fn wait_for_snapshot(&self, pred: impl Fn(&PlayerSnapshot) -> bool) -> PlayerSnapshot {
        wait_for_snapshot(&self.player, pred).await
    }

    pub fn ops(&self) -> Vec<SinkOp> {
        self.log.lock().clone()
    }

    pub fn appended(&self) -> Vec<Bytes> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                SinkOp::Append(bytes) => Some(bytes),
                _ => None,
            })
            .collect()
    }
}

pub async fn wait_for_event(
    events: &mut broadcast::Receiver<Event>,
    pred: impl Fn(&PlayerEvent) -> bool,
) -> PlayerEvent {
    let wait = async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event.payload) => return event.payload,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event bus closed"),
            }
        }
    };
    tokio::time::timeout(WAIT, wait)
        .await
        .expect("timed out waiting for player event")
}

pub async fn wait_for_snapshot(
    player: &PlayerHandle,
    pred: impl Fn(&PlayerSnapshot) -> bool,
) -> PlayerSnapshot {
    let mut rx = player.watch_snapshot();
    let wait = async {
        loop {
            {
                let snapshot = rx.borrow_and_update();
                if pred(&snapshot) {
                    return snapshot.clone();
                }
            }
            if rx.changed().await.is_err() {
                panic!("player stopped");
            }
        }
    };
    match tokio::time::timeout(WAIT, wait).await {
        Ok(snapshot) => snapshot,
        Err(_) => panic!(
            "timed out waiting for snapshot, last: {:?}",
            player.snapshot()
        ),
    }
}

/// Poll `cond` until it holds.
pub async fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let wait = async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    if tokio::time::timeout(WAIT, wait).await.is_err() {
        panic!("timed out waiting until {what}");
    }
}

// ---------------------------------------------------------------------------
// FixtureServer
// ---------------------------------------------------------------------------

/// Requests seen by the fixture server.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub path: String,
    pub query: HashMap<String, String>,
    pub cookie: Option<String>,
}

/// Minimal media server speaking the metadata/stream/subtitles API.
pub struct FixtureServer {
    pub addr: SocketAddr,
    pub seen: Arc<Mutex<Vec<SeenRequest>>>,
}

impl FixtureServer {
    /// Start Axum on a random port.
    ///
    /// Streams start at the requested time rounded down to a multiple of
    /// 2 seconds (reported in `X-Actual-Start`) and consist of an init segment
    /// plus three fragments. Only `films` library paths exist.
    pub async fn start() -> Self {
        use axum::{
            body::Body,
            extract::{Query, State},
            http::{HeaderMap, StatusCode},
            response::{IntoResponse, Response},
            routing::get,
            Json, Router,
        };

        type Seen = Arc<Mutex<Vec<SeenRequest>>>;

        fn record(seen: &Seen, path: &str, query: &HashMap<String, String>, headers: &HeaderMap) {
            let cookie = headers
                .get("cookie")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            seen.lock().push(SeenRequest {
                path: path.to_string(),
                query: query.clone(),
                cookie,
            });
        }

        fn known(query: &HashMap<String, String>) -> bool {
            query.get("library_id").map(String::as_str) == Some("films")
        }

        async fn metadata(
            State(seen): State<Seen>,
            Query(query): Query<HashMap<String, String>>,
            headers: HeaderMap,
        ) -> Response {
            record(&seen, "/api/metadata", &query, &headers);
            if !known(&query) {
                return (StatusCode::NOT_FOUND, "File not found").into_response();
            }
            Json(serde_json::json!({
                "duration": 5400.0,
                "video_codec": "hevc",
                "title": "Spirited Away",
                "audio_tracks": [
                    {"index": 0, "language": "jpn", "label": null, "codec": "aac", "channels": 2},
                    {"index": 1, "language": "eng", "label": "English", "codec": "ac3", "channels": 6}
                ],
                "subtitle_tracks": [
                    {"index": 0, "language": "eng", "label": null, "codec": "subrip"}
                ]
            }))
            .into_response()
        }

        async fn stream(
            State(seen): State<Seen>,
            Query(query): Query<HashMap<String, String>>,
            headers: HeaderMap,
        ) -> Response {
            record(&seen, "/api/stream", &query, &headers);
            if !known(&query) {
                return (StatusCode::NOT_FOUND, "File not found").into_response();
            }
            let start: f64 = query
                .get("start")
                .and_then(|s| s.parse().ok())
                .unwrap_or(0.0);
            let actual = (start / 2.0).floor() * 2.0;

            let chunks: Vec<std::result::Result<Bytes, std::io::Error>> = vec![
                Ok(init_segment()),
                Ok(fragment(1, 0, 2)),
                Ok(fragment(2, 2, 2)),
                Ok(fragment(3, 4, 2)),
            ];
            Response::builder()
                .header("content-type", "video/mp4")
                .header("x-actual-start", format!("{:.3}", actual))
                .header("x-video-codec", "hevc")
                .header("x-has-audio", "true")
                .body(Body::from_stream(futures::stream::iter(chunks)))
                .unwrap()
        }

        async fn subtitles(
            State(seen): State<Seen>,
            Query(query): Query<HashMap<String, String>>,
            headers: HeaderMap,
        ) -> Response {
            record(&seen, "/api/subtitles", &query, &headers);
            match query.get("index").map(String::as_str) {
                Some("0") if known(&query) => (
                    [("content-type", "text/vtt")],
                    webvtt("Welcome to the spirit world"),
                )
                    .into_response(),
                _ => (StatusCode::NOT_FOUND, "Subtitle track not found").into_response(),
            }
        }

        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route("/api/metadata", get(metadata))
            .route("/api/stream", get(stream))
            .route("/api/subtitles", get(subtitles))
            .with_state(seen.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Self { addr, seen }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn seen(&self, path: &str) -> Vec<SeenRequest> {
        self.seen
            .lock()
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }
}
