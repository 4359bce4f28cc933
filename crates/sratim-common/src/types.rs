//! Core type definitions for media references, descriptors and tracks.
//!
//! Enums are serialized in lowercase to match the remote endpoint's JSON.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque reference to a media file on the remote endpoint.
///
/// The endpoint addresses files by a path relative to a library root plus an
/// optional library identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaRef {
    /// Library the path is relative to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library_id: Option<String>,
    /// Path of the file inside the library.
    pub path: String,
}

impl MediaRef {
    /// Create a reference without a library.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            library_id: None,
            path: path.into(),
        }
    }

    /// Attach a library identifier.
    pub fn with_library(mut self, library_id: impl Into<String>) -> Self {
        self.library_id = Some(library_id.into());
        self
    }
}

impl fmt::Display for MediaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.library_id {
            Some(lib) => write!(f, "{}:{}", lib, self.path),
            None => write!(f, "{}", self.path),
        }
    }
}

/// Codec family of the primary video track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodecFamily {
    /// H.264 / AVC.
    H264,
    /// H.265 / HEVC.
    Hevc,
    /// Anything else (VP9, AV1, MPEG-2, ...).
    Other,
}

impl VideoCodecFamily {
    /// Classify a codec name as reported by the endpoint (ffprobe names or
    /// sample entry fourccs).
    pub fn from_codec_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "h264" | "avc" | "avc1" | "avc3" => Self::H264,
            "hevc" | "h265" | "hvc1" | "hev1" => Self::Hevc,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for VideoCodecFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::H264 => write!(f, "h264"),
            Self::Hevc => write!(f, "hevc"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Kind of selectable track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Subtitle,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Audio => write!(f, "audio"),
            Self::Subtitle => write!(f, "subtitle"),
        }
    }
}

/// An audio track listed by the media descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioTrack {
    /// Position among the file's audio streams (0-based).
    pub index: usize,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    pub codec_name: String,
    #[serde(default)]
    pub channels: Option<u32>,
}

/// A subtitle track listed by the media descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleTrack {
    /// Position among the file's subtitle streams (0-based).
    pub index: usize,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub codec_name: Option<String>,
}

impl AudioTrack {
    /// Human readable name for track pickers.
    pub fn display_name(&self) -> String {
        track_display_name(self.index, self.label.as_deref(), self.language.as_deref())
    }
}

impl SubtitleTrack {
    /// Human readable name for track pickers.
    pub fn display_name(&self) -> String {
        track_display_name(self.index, self.label.as_deref(), self.language.as_deref())
    }
}

fn track_display_name(index: usize, label: Option<&str>, language: Option<&str>) -> String {
    match (label, language) {
        (Some(label), Some(lang)) => format!("{} ({})", label, lang),
        (Some(label), None) => label.to_string(),
        (None, Some(lang)) => lang.to_string(),
        (None, None) => format!("Track {}", index + 1),
    }
}

/// Everything the player needs to know about a media file before streaming.
///
/// Immutable once fetched; cached per [`MediaRef`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaDescriptor {
    /// Total duration, when the endpoint knows it.
    pub duration_secs: Option<f64>,
    pub video_codec_family: VideoCodecFamily,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub audio_tracks: Vec<AudioTrack>,
    #[serde(default)]
    pub subtitle_tracks: Vec<SubtitleTrack>,
}

impl MediaDescriptor {
    /// Whether the media carries at least one audio track.
    pub fn has_audio(&self) -> bool {
        !self.audio_tracks.is_empty()
    }

    /// Look up an audio track by its index.
    pub fn audio_track(&self, index: usize) -> Option<&AudioTrack> {
        self.audio_tracks.iter().find(|t| t.index == index)
    }

    /// Look up a subtitle track by its index.
    pub fn subtitle_track(&self, index: usize) -> Option<&SubtitleTrack> {
        self.subtitle_tracks.iter().find(|t| t.index == index)
    }

    /// Clamp a requested playback time into the seekable window.
    ///
    /// With a known duration the upper bound sits `end_guard` seconds before
    /// the end so a restart always has something to stream.
    pub fn clamp_time(&self, time: f64, end_guard: f64) -> f64 {
        let time = time.max(0.0);
        match self.duration_secs {
            Some(duration) if duration > 0.0 => time.min((duration - end_guard).max(0.0)),
            _ => time,
        }
    }
}

/// Half-open interval of presentation time, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// The whole timeline, used to flush a sink.
    pub fn everything() -> Self {
        Self {
            start: 0.0,
            end: f64::INFINITY,
        }
    }

    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t < self.end
    }

    /// Whether `other` lies entirely inside this range.
    pub fn covers(&self, other: &TimeRange) -> bool {
        other.start >= self.start && other.end <= self.end
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:.3}, {:.3})", self.start, self.end)
    }
}

/// Furthest buffered edge across a set of ranges.
pub fn buffered_end(ranges: &[TimeRange]) -> Option<f64> {
    ranges
        .iter()
        .map(|r| r.end)
        .fold(None, |acc: Option<f64>, end| Some(acc.map_or(end, |a| a.max(end))))
}

/// Earliest buffered edge across a set of ranges.
pub fn buffered_start(ranges: &[TimeRange]) -> Option<f64> {
    ranges
        .iter()
        .map(|r| r.start)
        .fold(None, |acc: Option<f64>, start| {
            Some(acc.map_or(start, |a| a.min(start)))
        })
}
