//! In-memory media sink.

use async_trait::async_trait;
use bytes::Bytes;

use sratim_common::TimeRange;
use sratim_media::{FragmentScanner, ScanEvent};

use crate::config::SinkConfig;
use crate::playback::{MediaSink, SinkError, SinkFormat};

/// Ranges closer than this are reported as one.
const MERGE_TOLERANCE_SECS: f64 = 0.1;

#[derive(Debug, Clone)]
struct Segment {
    range: TimeRange,
    bytes: u64,
}

/// A [`MediaSink`] that keeps fragment timing in memory.
///
/// Appended bytes are scanned for `moof`/`mdat` pairs; each complete fragment
/// becomes a buffered segment at its decode time plus the timestamp offset.
/// Payloads are not retained, only their size counts against the capacity.
#[derive(Debug)]
pub struct MemorySink {
    capacity_bytes: u64,
    format: Option<SinkFormat>,
    scanner: FragmentScanner,
    segments: Vec<Segment>,
    timestamp_offset: f64,
    ended: bool,
    appended_bytes: u64,
    /// Discarded bytes still held by the scanner's unfinished atom.
    discarded_pending: u64,
}

impl MemorySink {
    pub fn new(capacity_bytes: u64) -> Self {
        Self {
            capacity_bytes,
            format: None,
            scanner: FragmentScanner::new(),
            segments: Vec::new(),
            timestamp_offset: 0.0,
            ended: false,
            appended_bytes: 0,
            discarded_pending: 0,
        }
    }

    pub fn from_config(config: &SinkConfig) -> Self {
        Self::new(config.capacity_bytes())
    }

    /// Bytes currently held.
    pub fn used_bytes(&self) -> u64 {
        let pending = self
            .scanner
            .unattributed_bytes()
            .saturating_sub(self.discarded_pending);
        self.segments.iter().map(|s| s.bytes).sum::<u64>() + pending
    }

    /// Bytes accepted since the last reset.
    pub fn appended_bytes(&self) -> u64 {
        self.appended_bytes
    }

    pub fn format(&self) -> Option<&SinkFormat> {
        self.format.as_ref()
    }

    pub fn timestamp_offset(&self) -> f64 {
        self.timestamp_offset
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    fn insert(&mut self, range: TimeRange, bytes: u64) {
        // Newer media replaces anything it overlaps.
        self.segments.retain(|s| {
            s.range.end <= range.start + f64::EPSILON || s.range.start >= range.end - f64::EPSILON
        });
        let at = self
            .segments
            .partition_point(|s| s.range.start < range.start);
        self.segments.insert(at, Segment { range, bytes });
    }

    fn apply(&mut self, events: Vec<ScanEvent>) {
        for event in events {
            match event {
                ScanEvent::Init { tracks, .. } => {
                    tracing::trace!(tracks = tracks.len(), "Init segment appended");
                }
                ScanEvent::Fragment(fragment) => {
                    let range = TimeRange::new(
                        fragment.start_secs + self.timestamp_offset,
                        fragment.end_secs + self.timestamp_offset,
                    );
                    self.insert(range, fragment.byte_size);
                }
                ScanEvent::Damaged(fragment) => {
                    tracing::debug!(
                        sequence_number = fragment.sequence_number,
                        start = fragment.start_secs + self.timestamp_offset,
                        "Fragment lost bytes to a dropped chunk; not buffered"
                    );
                }
            }
        }
        if !self.scanner.is_damaged() {
            self.discarded_pending = 0;
        }
    }
}

#[async_trait]
impl MediaSink for MemorySink {
    async fn configure(&mut self, format: &SinkFormat) -> Result<(), SinkError> {
        if format.mime_type.is_empty() {
            return Err(SinkError::Unsupported(format!("{} video", format.video)));
        }
        tracing::debug!(mime_type = %format.mime_type, "Memory sink configured");
        self.format = Some(format.clone());
        Ok(())
    }

    async fn append(&mut self, chunk: Bytes) -> Result<(), SinkError> {
        if self.format.is_none() {
            return Err(SinkError::InvalidState("sink is not configured".into()));
        }
        if self.ended {
            return Err(SinkError::InvalidState("stream already ended".into()));
        }
        if self.used_bytes() + chunk.len() as u64 > self.capacity_bytes {
            return Err(SinkError::QuotaExceeded);
        }

        let events = self
            .scanner
            .push(&chunk)
            .map_err(|e| SinkError::Malformed(e.to_string()))?;
        self.appended_bytes += chunk.len() as u64;
        self.apply(events);
        Ok(())
    }

    async fn discard(&mut self, chunk: Bytes) -> Result<(), SinkError> {
        if self.format.is_none() || self.ended {
            return Ok(());
        }
        let events = self
            .scanner
            .skip(&chunk)
            .map_err(|e| SinkError::Malformed(e.to_string()))?;
        self.apply(events);
        if self.scanner.is_damaged() {
            self.discarded_pending = (self.discarded_pending + chunk.len() as u64)
                .min(self.scanner.unattributed_bytes());
        }
        Ok(())
    }

    async fn remove(&mut self, range: TimeRange) -> Result<(), SinkError> {
        // Removing media reopens an ended stream for appends.
        self.ended = false;
        let before = self.segments.len();
        self.segments.retain(|s| !range.covers(&s.range));
        tracing::trace!(range = %range, removed = before - self.segments.len(), "Removed buffered media");
        Ok(())
    }

    async fn set_timestamp_offset(&mut self, offset_secs: f64) -> Result<(), SinkError> {
        if !offset_secs.is_finite() {
            return Err(SinkError::InvalidState(format!(
                "invalid timestamp offset {}",
                offset_secs
            )));
        }
        // A new offset starts a new stream; drop any half-parsed atom.
        self.scanner.reset();
        self.timestamp_offset = offset_secs;
        Ok(())
    }

    async fn end_of_stream(&mut self) -> Result<(), SinkError> {
        if self.format.is_none() {
            return Err(SinkError::InvalidState("sink is not configured".into()));
        }
        self.ended = true;
        Ok(())
    }

    async fn reset(&mut self) -> Result<(), SinkError> {
        *self = Self::new(self.capacity_bytes);
        Ok(())
    }

    fn is_updating(&self) -> bool {
        false
    }

    fn buffered(&self) -> Vec<TimeRange> {
        let mut merged: Vec<TimeRange> = Vec::new();
        for segment in &self.segments {
            match merged.last_mut() {
                Some(last) if segment.range.start <= last.end + MERGE_TOLERANCE_SECS => {
                    last.end = last.end.max(segment.range.end);
                }
                _ => merged.push(segment.range),
            }
        }
        merged
    }
}
